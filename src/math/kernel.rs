//! Scalar weighting kernels on the k-space grid.
//!
//! - `split_weights`: raised-cosine split of a fractional coordinate between
//!   its floor cell and the next one. The two weights satisfy
//!   `w_floor² + w_ceil² = 1`, so the energy of a sample is preserved (this is
//!   not linear interpolation).
//! - `emphasis`: radial boost of central cells in the aggregated Fisher sum.
//! - `signal_power`: modeled image power at a cell for the information metric.

use std::f64::consts::FRAC_PI_2;

/// Width `a` of the low-frequency emphasis (cells).
pub const EMPHASIS_WIDTH: f64 = 3.0;

/// Peak gain `b` of the low-frequency emphasis.
pub const EMPHASIS_GAIN: f64 = 3.0;

/// Split a coordinate into `(floor, weight_floor, weight_ceil)`.
pub fn split_weights(coord: f64) -> (i64, f64, f64) {
    let base = coord.floor();
    let frac = coord - base;
    let (s, c) = (frac * FRAC_PI_2).sin_cos();
    (base as i64, c, s)
}

/// Multiplicative Fisher weight of a cell at signed distance
/// `(ky_norm, kz_norm)` (cells) from the grid centre.
pub fn emphasis(ky_norm: f64, kz_norm: f64) -> f64 {
    let ry = ky_norm / EMPHASIS_WIDTH;
    let rz = kz_norm / EMPHASIS_WIDTH;
    1.0 + EMPHASIS_GAIN / (ry * ry + rz * rz + 1.0)
}

/// Modeled signal power at normalized distances `d_y`, `d_z` from the centre.
///
/// A 3D grid uses `(d_y² + d_z² + 1)^(-3/2)`; a single-partition (2D) grid
/// uses `(d_y + 1)^(-1)`.
pub fn signal_power(d_y: f64, d_z: f64, three_d: bool) -> f64 {
    if three_d {
        (d_y * d_y + d_z * d_z + 1.0).powf(-1.5)
    } else {
        1.0 / (d_y.abs() + 1.0)
    }
}
