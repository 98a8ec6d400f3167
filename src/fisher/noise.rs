//! Noise levels and information content from a Fisher field.
//!
//! Both outputs share the `nes2` normalization
//!
//! ```text
//! nes2 = 2 · 4 · (N·TR + T1ref) · T2ref / (nky · nkz · (T1ref + T2ref)²)
//! ```
//!
//! which calibrates units so a rho-only reconstruction has noise close to 1.

use crate::domain::{InfoFocus, NoiseConfig, PRIMARY_PARAMS};
use crate::fisher::assembler::FisherField;
use crate::math::signal_power;

/// Normalized expected signal squared for `repetitions` repetitions.
pub fn nes2(config: &NoiseConfig, repetitions: usize) -> f64 {
    let t1 = config.t1_ref;
    let t2 = config.t2_ref;
    let sum = t1 + t2;
    2.0 * 4.0 * (repetitions as f64 * config.tr + t1) * t2 / ((config.nky * config.nkz) as f64 * sum * sum)
}

/// Noise standard deviation of rho, T1, T2.
pub fn noise_levels(field: &FisherField, nes2: f64) -> [f64; PRIMARY_PARAMS] {
    let geometry = field.geometry();
    let cells = (geometry.ky_cells() * geometry.nkz) as f64;
    let total = field.total();
    let mut out = [0.0; PRIMARY_PARAMS];
    for (p, v) in out.iter_mut().enumerate() {
        *v = (total[(p, p)].norm() / cells).sqrt() * nes2.sqrt();
    }
    out
}

/// Information content per cell and per primary parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct InformationMap {
    /// `ln(ps/pn + 1)` per cell (flat order) and parameter.
    pub per_cell: Vec<[f64; PRIMARY_PARAMS]>,
    /// Sum over cells per parameter.
    pub totals: [f64; PRIMARY_PARAMS],
}

impl InformationMap {
    /// Sum of the per-parameter totals.
    pub fn grand_total(&self) -> f64 {
        self.totals.iter().sum()
    }

    /// Reduce the totals to one scalar.
    pub fn focus(&self, focus: InfoFocus, weights: &[f64; PRIMARY_PARAMS]) -> f64 {
        match focus {
            InfoFocus::Rho => self.totals[0],
            InfoFocus::T1 => self.totals[1],
            InfoFocus::T2 => self.totals[2],
            InfoFocus::Sum => self.grand_total(),
            InfoFocus::Mean => self.totals.iter().sum::<f64>() / PRIMARY_PARAMS as f64,
            InfoFocus::Max => self.totals.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            InfoFocus::Weighted => self.totals.iter().zip(weights).map(|(t, w)| t * w).sum(),
        }
    }
}

/// Information content of a Fisher field.
///
/// Signal power follows the modeled radial falloff of `signal_power`; noise
/// power is `nes2 · sigma_ref² · |F_cell[p, p]|`. Cells whose noise power is
/// zero (no measurement and no regularization) carry no information.
pub fn information(field: &FisherField, nes2: f64, sigma_ref: f64) -> InformationMap {
    let geometry = field.geometry();
    let half_y = (geometry.nky / 2).max(1) as f64;
    let half_z = (geometry.nkz / 2).max(1) as f64;
    let three_d = geometry.nkz > 1;
    let noise_scale = nes2 * sigma_ref * sigma_ref;

    let mut per_cell = Vec::with_capacity(field.diagonals().len());
    let mut totals = [0.0; PRIMARY_PARAMS];
    for (flat, diag) in field.diagonals().iter().enumerate() {
        let (iy, iz) = geometry.cell_coords(flat);
        let (dy, dz) = geometry.offset_from_centre(iy, iz);
        let ps = signal_power(dy.abs() / half_y, dz.abs() / half_z, three_d);

        let mut cell = [0.0; PRIMARY_PARAMS];
        for p in 0..PRIMARY_PARAMS {
            let pn = noise_scale * diag[p];
            cell[p] = if pn > 0.0 { (ps / pn).ln_1p() } else { 0.0 };
            totals[p] += cell[p];
        }
        per_cell.push(cell);
    }

    InformationMap { per_cell, totals }
}
