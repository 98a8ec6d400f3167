//! Signal model seam.
//!
//! The evaluator consumes magnetization and derivatives through the
//! `SignalModel` trait so the simulator stays an external collaborator.
//! `TabulatedSignal` serves precomputed tables for the CLI.

pub mod model;
pub mod tabulated;

pub use model::*;
pub use tabulated::*;

/// Closed-form signal used by unit tests in place of a simulator.
#[cfg(test)]
pub(crate) mod testing {
    use num_complex::Complex64;

    use super::{SignalModel, SignalRequest, SignalSeries};
    use crate::domain::ProbePoint;
    use crate::error::AppError;

    /// `M_n = sin(B1·α_n)·(1 − exp(−t_n/T1))·exp(−TE/T2)·e^{i·0.3n}` with
    /// `t_n = (n+1)·TR`, and its exact partial derivatives.
    pub struct AnalyticSignal;

    impl SignalModel for AnalyticSignal {
        fn simulate(&self, request: &SignalRequest<'_>, tissues: &[ProbePoint]) -> Result<Vec<SignalSeries>, AppError> {
            Ok(tissues.iter().map(|t| series(request, t)).collect())
        }
    }

    fn series(request: &SignalRequest<'_>, tissue: &ProbePoint) -> SignalSeries {
        let mut out = SignalSeries::default();
        let e2 = (-request.te / tissue.t2).exp();
        for (n, &deg) in request.rf_deg.iter().enumerate() {
            let alpha = deg.to_radians();
            let t = (n as f64 + 1.0) * request.tr;
            let e1 = (-t / tissue.t1).exp();
            let phase = Complex64::from_polar(1.0, 0.3 * n as f64);
            let s = (tissue.b1 * alpha).sin();

            out.magnetization.push(phase * (s * (1.0 - e1) * e2));
            if request.derivatives.t1 {
                out.d_t1.push(phase * (-s * e1 * t / (tissue.t1 * tissue.t1) * e2));
            }
            if request.derivatives.t2 {
                out.d_t2.push(phase * (s * (1.0 - e1) * e2 * request.te / (tissue.t2 * tissue.t2)));
            }
            if request.derivatives.b1 {
                out.d_b1.push(phase * (alpha * (tissue.b1 * alpha).cos() * (1.0 - e1) * e2));
            }
        }
        out
    }
}
