//! Shared domain types.
//!
//! These types are kept small and serializable so they can be:
//!
//! - read from problem files (trajectory, probe tissues)
//! - passed between the binner, assembler and aggregators
//! - exported to JSON after a run

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Number of primary (reconstructed) parameters: rho, T1, T2.
pub const PRIMARY_PARAMS: usize = 3;

/// Parameter axes of a weight row, in column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Param {
    Rho,
    T1,
    T2,
    B1,
}

impl Param {
    pub const PRIMARY: [Param; PRIMARY_PARAMS] = [Param::Rho, Param::T1, Param::T2];

    pub fn label(self) -> &'static str {
        match self {
            Param::Rho => "rho",
            Param::T1 => "T1",
            Param::T2 => "T2",
            Param::B1 => "B1",
        }
    }

    /// Column of this parameter inside a weight row.
    pub fn column(self) -> usize {
        match self {
            Param::Rho => 0,
            Param::T1 => 1,
            Param::T2 => 2,
            Param::B1 => 3,
        }
    }
}

/// A continuous-valued phase-encoding coordinate.
///
/// Coordinates are in grid units and may be fractional.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KPoint {
    pub ky: f64,
    #[serde(default)]
    pub kz: f64,
}

impl KPoint {
    pub fn new(ky: f64, kz: f64) -> Self {
        Self { ky, kz }
    }

    /// Hermitian mirror of this coordinate.
    pub fn mirrored(self) -> Self {
        Self {
            ky: -self.ky,
            kz: -self.kz,
        }
    }
}

/// Ordered repetitions, each an ordered list of samples (one per shot).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trajectory(pub Vec<Vec<KPoint>>);

impl Trajectory {
    /// Single-shot trajectory: one sample per repetition.
    pub fn single_shot(points: impl IntoIterator<Item = KPoint>) -> Self {
        Self(points.into_iter().map(|p| vec![p]).collect())
    }

    pub fn repetitions(&self) -> usize {
        self.0.len()
    }

    pub fn sample_count(&self) -> usize {
        self.0.iter().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vec<KPoint>> {
        self.0.iter()
    }
}

/// Assumed tissue operating point (seconds; B1 relative).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbePoint {
    pub t1: f64,
    pub t2: f64,
    #[serde(default = "nominal_b1")]
    pub b1: f64,
}

impl ProbePoint {
    pub fn new(t1: f64, t2: f64) -> Self {
        Self { t1, t2, b1: 1.0 }
    }

    pub fn with_b1(self, b1: f64) -> Self {
        Self { b1, ..self }
    }
}

fn nominal_b1() -> f64 {
    1.0
}

/// How the RF-scale (B1) nuisance is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum B1Mode {
    /// B1 is not modeled at all.
    #[default]
    None,
    /// B1 is reconstructed alongside rho/T1/T2 (adds a Fisher column).
    CoReconstruct,
    /// B1 is not reconstructed; only its coupling into rho/T1/T2 is reported.
    Sensitivity,
}

impl B1Mode {
    pub fn is_modeled(self) -> bool {
        !matches!(self, B1Mode::None)
    }

    /// Number of columns entering the per-cell Fisher matrices.
    pub fn active_params(self) -> usize {
        match self {
            B1Mode::CoReconstruct => PRIMARY_PARAMS + 1,
            B1Mode::None | B1Mode::Sensitivity => PRIMARY_PARAMS,
        }
    }
}

/// Algorithm used to estimate B1 sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum B1Metric {
    /// Linearized coupling at the central k-space cell, B1 = 1.
    #[serde(rename = "derivative_at_1")]
    DerivativeAt1,
    /// RMS of the coupling over a sweep of B1 control points.
    #[serde(rename = "multi_point")]
    MultiPoint,
    /// Like `MultiPoint`, but the B1 column is the signal difference to nominal
    /// and the Jacobian is taken halfway between nominal and the control point.
    #[serde(rename = "multi_point_values")]
    MultiPointValues,
}

/// Reduction used to turn per-parameter information totals into one scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InfoFocus {
    Rho,
    T1,
    T2,
    /// Sum over all cells and parameters.
    #[default]
    Sum,
    /// Mean of the rho/T1/T2 totals.
    Mean,
    /// Largest of the rho/T1/T2 totals.
    Max,
    /// `info_weights`-weighted sum of the rho/T1/T2 totals.
    Weighted,
}

/// Named visualization events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum PlotKind {
    First,
    Trajectories,
    Bars,
    Weighting,
    OriginalJacobian,
    NoiseSpectrum,
    InfoCon,
    Close,
}

/// Sequence under evaluation: RF train plus phase-encoding trajectory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SequenceInput {
    /// Flip angle per repetition (degrees).
    pub rf_deg: Vec<f64>,
    /// Echo time (seconds).
    #[serde(default)]
    pub te: f64,
    /// Supplementary timing handed through to the signal model.
    #[serde(default)]
    pub timing: Vec<f64>,
    #[serde(default)]
    pub trajectory: Trajectory,
}

/// The four figures of merit returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Evaluation {
    /// Expected noise standard deviation of rho, T1, T2.
    pub noise: [f64; PRIMARY_PARAMS],
    /// Information content selected by the configured focus.
    pub information: f64,
    /// Coupling of a B1 error into rho, T1, T2.
    pub b1_sensitivity: [f64; PRIMARY_PARAMS],
    pub contrast_penalty: f64,
}

/// Per-probe figures kept for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSummary {
    pub probe: ProbePoint,
    pub noise: [f64; PRIMARY_PARAMS],
    pub information: f64,
    /// Per-parameter information totals (rho, T1, T2).
    pub information_totals: [f64; PRIMARY_PARAMS],
    pub b1_sensitivity: [f64; PRIMARY_PARAMS],
    /// Rows deposited into the grid.
    pub rows_binned: usize,
    /// Rows dropped because their cell was saturated.
    pub rows_dropped: usize,
}
