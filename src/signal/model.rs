//! Signal model contract.
//!
//! The evaluator never simulates spin physics itself. It asks a `SignalModel`
//! for two primitive things:
//!
//! - the complex magnetization per repetition at a tissue point
//! - finite-difference derivatives of that magnetization w.r.t. T1, T2 and B1
//!
//! and turns them into per-repetition weight rows here.

use num_complex::Complex64;

use crate::domain::{NoiseConfig, PRIMARY_PARAMS, ProbePoint, SequenceInput};
use crate::error::AppError;

/// Which derivatives a simulation call must return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DerivativeSet {
    pub t1: bool,
    pub t2: bool,
    pub b1: bool,
}

impl DerivativeSet {
    pub const NONE: DerivativeSet = DerivativeSet {
        t1: false,
        t2: false,
        b1: false,
    };

    pub fn primary(with_b1: bool) -> Self {
        Self {
            t1: true,
            t2: true,
            b1: with_b1,
        }
    }
}

/// Sequence parameters handed to the signal model.
#[derive(Debug, Clone, Copy)]
pub struct SignalRequest<'a> {
    /// Flip angles (degrees), one per repetition.
    pub rf_deg: &'a [f64],
    pub tr: f64,
    pub te: f64,
    pub max_order: usize,
    pub inversion: bool,
    pub timing: &'a [f64],
    pub derivatives: DerivativeSet,
}

impl<'a> SignalRequest<'a> {
    pub fn new(sequence: &'a SequenceInput, config: &NoiseConfig, derivatives: DerivativeSet) -> Self {
        Self {
            rf_deg: &sequence.rf_deg,
            tr: config.tr,
            te: sequence.te,
            max_order: config.max_epg_order,
            inversion: config.inversion,
            timing: &sequence.timing,
            derivatives,
        }
    }

    pub fn repetitions(&self) -> usize {
        self.rf_deg.len()
    }

    /// Same sequence, magnetization only.
    pub fn magnetization_only(self) -> Self {
        Self {
            derivatives: DerivativeSet::NONE,
            ..self
        }
    }
}

/// Simulated signal of one tissue point. Derivative vectors are empty unless
/// requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSeries {
    pub magnetization: Vec<Complex64>,
    pub d_t1: Vec<Complex64>,
    pub d_t2: Vec<Complex64>,
    pub d_b1: Vec<Complex64>,
}

/// External simulator of magnetization and its parameter derivatives.
pub trait SignalModel: Sync {
    /// Simulate every tissue point; the output is aligned with `tissues`.
    fn simulate(&self, request: &SignalRequest<'_>, tissues: &[ProbePoint]) -> Result<Vec<SignalSeries>, AppError>;
}

/// Simulate a single tissue point.
pub fn simulate_one(
    model: &dyn SignalModel,
    request: &SignalRequest<'_>,
    tissue: ProbePoint,
) -> Result<SignalSeries, AppError> {
    let mut out = model.simulate(request, std::slice::from_ref(&tissue))?;
    if out.len() != 1 {
        return Err(AppError::new(
            4,
            format!("Signal model returned {} series for one tissue point.", out.len()),
        ));
    }
    let series = out.remove(0);
    check_series(&series, request)?;
    Ok(series)
}

fn check_series(series: &SignalSeries, request: &SignalRequest<'_>) -> Result<(), AppError> {
    let n = request.repetitions();
    let check = |name: &str, v: &[Complex64], wanted: bool| -> Result<(), AppError> {
        if (wanted || name == "magnetization") && v.len() != n {
            return Err(AppError::new(
                2,
                format!("Signal model returned {} {name} samples for {n} repetitions.", v.len()),
            ));
        }
        Ok(())
    };
    check("magnetization", &series.magnetization, true)?;
    check("dT1", &series.d_t1, request.derivatives.t1)?;
    check("dT2", &series.d_t2, request.derivatives.t2)?;
    check("dB1", &series.d_b1, request.derivatives.b1)?;
    Ok(())
}

/// Build the per-repetition weight rows
/// `[M, T1·∂M/∂T1, T2·∂M/∂T2, (∂M/∂B1)]`.
pub fn weight_rows(series: &SignalSeries, tissue: ProbePoint, with_b1: bool) -> Vec<Vec<Complex64>> {
    let len = PRIMARY_PARAMS + usize::from(with_b1);
    (0..series.magnetization.len())
        .map(|n| {
            let mut row = Vec::with_capacity(len);
            row.push(series.magnetization[n]);
            row.push(series.d_t1[n] * tissue.t1);
            row.push(series.d_t2[n] * tissue.t2);
            if with_b1 {
                row.push(series.d_b1[n]);
            }
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::testing::AnalyticSignal;

    fn sequence(n: usize) -> SequenceInput {
        SequenceInput {
            rf_deg: (0..n).map(|i| 10.0 + i as f64).collect(),
            te: 0.004,
            ..SequenceInput::default()
        }
    }

    #[test]
    fn weight_rows_scale_relaxation_derivatives() {
        let seq = sequence(5);
        let cfg = crate::domain::config::test_config();
        let req = SignalRequest::new(&seq, &cfg, DerivativeSet::primary(true));
        let tissue = ProbePoint::new(0.8, 0.05);
        let series = simulate_one(&AnalyticSignal, &req, tissue).unwrap();
        let rows = weight_rows(&series, tissue, true);

        assert_eq!(rows.len(), 5);
        for (n, row) in rows.iter().enumerate() {
            assert_eq!(row.len(), 4);
            assert_eq!(row[0], series.magnetization[n]);
            assert!((row[1] - series.d_t1[n] * 0.8).norm() < 1e-15);
            assert!((row[2] - series.d_t2[n] * 0.05).norm() < 1e-15);
            assert_eq!(row[3], series.d_b1[n]);
        }
    }

    #[test]
    fn short_series_is_rejected() {
        struct Truncating;
        impl SignalModel for Truncating {
            fn simulate(&self, _: &SignalRequest<'_>, tissues: &[ProbePoint]) -> Result<Vec<SignalSeries>, AppError> {
                Ok(tissues
                    .iter()
                    .map(|_| SignalSeries {
                        magnetization: vec![Complex64::new(1.0, 0.0)],
                        ..SignalSeries::default()
                    })
                    .collect())
            }
        }

        let seq = sequence(3);
        let cfg = crate::domain::config::test_config();
        let req = SignalRequest::new(&seq, &cfg, DerivativeSet::NONE);
        let err = simulate_one(&Truncating, &req, ProbePoint::new(1.0, 0.1)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
