//! Coupling of an unmodeled B1 error into rho, T1 and T2.
//!
//! Both algorithms reduce to the same linearized form. With `W_p` the primary
//! columns of a set of weight rows and `w_b1` their B1 column:
//!
//! ```text
//! H0          = inverse(W_pᴴ W_p + R_p)
//! sensitivity = Re(H0 · W_pᴴ · w_b1)
//! ```
//!
//! `derivative_at_1` applies it once to the rows stored in the central cell.
//! `multi_point` sweeps B1 over `control_points()`, re-simulates at each
//! point and reports the RMS over the sweep.

use num_complex::Complex64;
use rayon::prelude::*;

use crate::domain::{PRIMARY_PARAMS, Param, ProbePoint, Trajectory};
use crate::error::AppError;
use crate::fisher::binner::{KSpaceGrid, fold};
use crate::math::{CMatrix, gram, regularized_inverse, rows_to_matrix};
use crate::signal::{DerivativeSet, SignalModel, SignalRequest, simulate_one, weight_rows};

/// Nominal (calibrated) relative B1.
pub const NOMINAL_B1: f64 = 1.0;

const SWEEP_START: f64 = 0.80;
const SWEEP_STEP: f64 = 0.02;
const SWEEP_POINTS: usize = 21;

/// B1 control points of the sweep: 0.80, 0.82, ..., 1.20.
pub fn control_points() -> impl ExactSizeIterator<Item = f64> {
    (0..SWEEP_POINTS).map(|i| SWEEP_START + SWEEP_STEP * i as f64)
}

/// Linearized coupling `Re(H0 · W_pᴴ · w_b1)` of the given rows.
///
/// Rows must carry the B1 column; a set without rows couples nothing.
pub fn coupling(rows: &[&[Complex64]], reg: &[f64; PRIMARY_PARAMS]) -> Result<[f64; PRIMARY_PARAMS], AppError> {
    let b1 = Param::B1.column();
    if let Some(short) = rows.iter().find(|r| r.len() <= b1) {
        return Err(AppError::new(
            2,
            format!("B1 coupling needs {} columns per row, got {}.", b1 + 1, short.len()),
        ));
    }

    let w_p = rows_to_matrix(rows.iter().copied(), PRIMARY_PARAMS);
    let w_b1 = CMatrix::from_fn(rows.len(), 1, |i, _| rows[i][b1]);
    let h0 = regularized_inverse(&gram(&w_p), reg)?;
    let s = h0 * (w_p.adjoint() * w_b1);

    let mut out = [0.0; PRIMARY_PARAMS];
    for (p, v) in out.iter_mut().enumerate() {
        *v = s[(p, 0)].re;
    }
    Ok(out)
}

/// Coupling at nominal B1 from the rows binned into the central cell.
///
/// Symmetry mirrors are skipped: they only exist to make the centre behave as
/// one real degree of freedom in the noise computation.
pub fn derivative_at_1(grid: &KSpaceGrid, reg: &[f64; PRIMARY_PARAMS]) -> Result<[f64; PRIMARY_PARAMS], AppError> {
    let rows: Vec<&[Complex64]> = grid.centre_cell().measured_rows().map(|r| r.values.as_slice()).collect();
    coupling(&rows, reg)
}

/// How the B1 column is built during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepColumn {
    /// `∂M/∂B1` at the control point.
    Derivative,
    /// `M(b) − M(1)`, with the Jacobian taken halfway between 1 and `b`.
    Difference,
}

impl SweepColumn {
    fn representative(self, control: f64) -> f64 {
        match self {
            SweepColumn::Derivative => control,
            SweepColumn::Difference => 0.5 * (NOMINAL_B1 + control),
        }
    }
}

/// RMS coupling over the B1 sweep.
///
/// Only samples whose (folded) coordinate lies in the unit cell
/// `0 <= ky < 1, 0 <= kz < 1` contribute, with their unscaled rows.
pub fn multi_point(
    model: &dyn SignalModel,
    request: &SignalRequest<'_>,
    trajectory: &Trajectory,
    probe: ProbePoint,
    symmetry: bool,
    reg: &[f64; PRIMARY_PARAMS],
    column: SweepColumn,
) -> Result<[f64; PRIMARY_PARAMS], AppError> {
    let samples = unit_cell_samples(trajectory, symmetry);

    let jacobian_request = SignalRequest {
        derivatives: DerivativeSet::primary(column == SweepColumn::Derivative),
        ..*request
    };
    let nominal = match column {
        SweepColumn::Difference => {
            Some(simulate_one(model, &request.magnetization_only(), probe.with_b1(NOMINAL_B1))?.magnetization)
        }
        SweepColumn::Derivative => None,
    };

    let per_point: Vec<[f64; PRIMARY_PARAMS]> = control_points()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|control| {
            let tissue = probe.with_b1(column.representative(control));
            let series = simulate_one(model, &jacobian_request, tissue)?;
            let mut rows = weight_rows(&series, tissue, column == SweepColumn::Derivative);

            if let Some(nominal) = &nominal {
                let shifted = simulate_one(model, &request.magnetization_only(), probe.with_b1(control))?;
                for (row, (m, m0)) in rows.iter_mut().zip(shifted.magnetization.iter().zip(nominal)) {
                    row.push(m - m0);
                }
            }

            let picked: Vec<Vec<Complex64>> = samples
                .iter()
                .map(|&(rep, conjugate)| {
                    if conjugate {
                        rows[rep].iter().map(|v| v.conj()).collect()
                    } else {
                        rows[rep].clone()
                    }
                })
                .collect();
            let refs: Vec<&[Complex64]> = picked.iter().map(Vec::as_slice).collect();
            coupling(&refs, reg)
        })
        .collect::<Result<_, _>>()?;

    let mut acc = [0.0; PRIMARY_PARAMS];
    for s in &per_point {
        for p in 0..PRIMARY_PARAMS {
            acc[p] += s[p] * s[p];
        }
    }
    Ok(acc.map(|a| (a / SWEEP_POINTS as f64).sqrt()))
}

/// `(repetition, conjugate)` of every sample in the unit cell at the origin.
fn unit_cell_samples(trajectory: &Trajectory, symmetry: bool) -> Vec<(usize, bool)> {
    let mut out = Vec::new();
    for (rep, samples) in trajectory.iter().enumerate() {
        for &sample in samples {
            let (point, conjugate) = fold(sample, symmetry);
            if (0.0..1.0).contains(&point.ky) && (0.0..1.0).contains(&point.kz) {
                out.push((rep, conjugate));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::test_config;
    use crate::domain::{KPoint, SequenceInput};
    use crate::fisher::binner::{GridGeometry, bin_trajectory};
    use crate::signal::SignalSeries;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn basis() -> [[Complex64; 4]; 3] {
        [
            [c(1.0, 0.1), c(0.2, 0.0), c(0.1, -0.3), c(0.4, 0.2)],
            [c(0.3, 0.0), c(1.0, 0.2), c(-0.2, 0.1), c(0.1, 0.0)],
            [c(0.1, -0.2), c(0.3, 0.0), c(1.0, 0.0), c(-0.5, 0.3)],
        ]
    }

    /// `M = B1·a`, `∂M/∂B1 = a`; the T1/T2 columns do not depend on B1.
    struct LinearB1;

    impl SignalModel for LinearB1 {
        fn simulate(&self, request: &SignalRequest<'_>, tissues: &[ProbePoint]) -> Result<Vec<SignalSeries>, AppError> {
            let [a, b, c] = basis();
            let n = request.repetitions();
            Ok(tissues
                .iter()
                .map(|t| SignalSeries {
                    magnetization: a[..n].iter().map(|&v| v * t.b1).collect(),
                    d_t1: if request.derivatives.t1 { b[..n].iter().map(|&v| v / t.t1).collect() } else { Vec::new() },
                    d_t2: if request.derivatives.t2 { c[..n].iter().map(|&v| v / t.t2).collect() } else { Vec::new() },
                    d_b1: if request.derivatives.b1 { a[..n].to_vec() } else { Vec::new() },
                })
                .collect())
        }
    }

    fn sequence(points: [KPoint; 4]) -> SequenceInput {
        SequenceInput {
            rf_deg: vec![10.0; 4],
            te: 0.002,
            timing: Vec::new(),
            trajectory: Trajectory::single_shot(points),
        }
    }

    #[test]
    fn sweep_covers_twenty_one_points() {
        let points: Vec<f64> = control_points().collect();
        assert_eq!(points.len(), 21);
        assert!((points[0] - 0.80).abs() < 1e-12);
        assert!((points[10] - 1.0).abs() < 1e-12);
        assert!((points[20] - 1.20).abs() < 1e-12);
    }

    #[test]
    fn coupling_recovers_aliased_column() {
        let [a, b, cc] = basis();
        // B1 column equal to 2·(T2 column).
        let rows: Vec<Vec<Complex64>> = (0..4).map(|n| vec![a[n], b[n], cc[n], cc[n] * 2.0]).collect();
        let refs: Vec<&[Complex64]> = rows.iter().map(Vec::as_slice).collect();
        let s = coupling(&refs, &[0.0; 3]).unwrap();
        assert!(s[0].abs() < 1e-10 && s[1].abs() < 1e-10);
        assert!((s[2] - 2.0).abs() < 1e-10);

        assert_eq!(coupling(&[], &[1.0; 3]).unwrap(), [0.0; 3]);
    }

    #[test]
    fn derivative_at_1_skips_symmetry_mirrors() {
        let mut cfg = test_config();
        cfg.symmetry = true;
        let geometry = GridGeometry::from_config(&cfg);
        let traj = Trajectory::single_shot([KPoint::new(0.0, 0.0), KPoint::new(0.0, 0.0)]);
        let rows = vec![
            vec![c(1.0, 0.5), c(0.2, 0.1), c(0.0, 0.3), c(0.4, -0.2)],
            vec![c(0.5, -0.5), c(0.1, 0.0), c(0.3, 0.3), c(0.1, 0.1)],
        ];
        let grid = bin_trajectory(&traj, &rows, geometry, 8).unwrap();
        assert_eq!(grid.centre_cell().occupancy(), 4);

        let reg = [1e-2; 3];
        let measured: Vec<&[Complex64]> = rows.iter().map(Vec::as_slice).collect();
        let expected = coupling(&measured, &reg).unwrap();
        assert_eq!(derivative_at_1(&grid, &reg).unwrap(), expected);

        let all: Vec<&[Complex64]> = grid.centre_cell().rows().iter().map(|r| r.values.as_slice()).collect();
        assert_ne!(coupling(&all, &reg).unwrap(), expected);
    }

    #[test]
    fn multi_point_is_rms_over_sweep() {
        let seq = sequence([KPoint::new(0.0, 0.0), KPoint::new(0.5, 0.0), KPoint::new(0.25, 0.0), KPoint::new(0.0, 0.0)]);
        let cfg = test_config();
        let req = SignalRequest::new(&seq, &cfg, DerivativeSet::primary(true));
        let probe = ProbePoint::new(0.9, 0.07);

        // rho column b·a, B1 column a: coupling 1/b into rho.
        let s = multi_point(&LinearB1, &req, &seq.trajectory, probe, false, &[0.0; 3], SweepColumn::Derivative).unwrap();
        let expected = (control_points().map(|b| 1.0 / (b * b)).sum::<f64>() / 21.0).sqrt();
        assert!((s[0] - expected).abs() < 1e-9);
        assert!(s[1].abs() < 1e-9 && s[2].abs() < 1e-9);

        // rho column ((1+b)/2)·a, B1 column (b−1)·a.
        let s = multi_point(&LinearB1, &req, &seq.trajectory, probe, false, &[0.0; 3], SweepColumn::Difference).unwrap();
        let expected = (control_points()
            .map(|b| {
                let k = 2.0 * (b - 1.0) / (1.0 + b);
                k * k
            })
            .sum::<f64>()
            / 21.0)
            .sqrt();
        assert!((s[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn multi_point_ignores_samples_outside_unit_cell() {
        let seq = sequence([KPoint::new(1.0, 0.0), KPoint::new(-0.5, 0.0), KPoint::new(0.0, 1.0), KPoint::new(2.0, 0.0)]);
        let cfg = test_config();
        let req = SignalRequest::new(&seq, &cfg, DerivativeSet::primary(true));
        let s = multi_point(
            &LinearB1,
            &req,
            &seq.trajectory,
            ProbePoint::new(0.9, 0.07),
            false,
            &[1.0; 3],
            SweepColumn::Derivative,
        )
        .unwrap();
        assert_eq!(s, [0.0; 3]);

        // Folding brings (-0.5, 0) to (0.5, 0).
        assert_eq!(unit_cell_samples(&seq.trajectory, true), vec![(1, true)]);
    }
}
