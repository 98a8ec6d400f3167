//! Visualization hooks.
//!
//! The evaluator emits one event per `PlotKind` listed in the configuration.
//! Every method defaults to a no-op, so a renderer implements only the events
//! it cares about.

use num_complex::Complex64;

use crate::domain::{Evaluation, PRIMARY_PARAMS, ProbeSummary, SequenceInput, Trajectory};
use crate::fisher::{GridGeometry, InformationMap};

pub mod ascii;

pub use ascii::AsciiVisualizer;

pub trait Visualizer {
    /// RF train of the sequence, before any probe is evaluated.
    fn first(&mut self, _sequence: &SequenceInput) {}

    fn trajectories(&mut self, _trajectory: &Trajectory, _geometry: GridGeometry) {}

    /// Weight rows of one probe, per repetition, before binning.
    fn original_jacobian(&mut self, _probe: usize, _rows: &[Vec<Complex64>]) {}

    /// Cell occupancy of one probe, flat cell order.
    fn weighting(&mut self, _probe: usize, _geometry: GridGeometry, _occupancy: &[usize]) {}

    /// Per-cell Fisher diagonals of one probe.
    fn noise_spectrum(&mut self, _probe: usize, _geometry: GridGeometry, _diagonals: &[[f64; PRIMARY_PARAMS]]) {}

    fn info_content(&mut self, _probe: usize, _geometry: GridGeometry, _info: &InformationMap) {}

    /// Final figures of merit next to the per-probe ones.
    fn bars(&mut self, _evaluation: &Evaluation, _probes: &[ProbeSummary]) {}

    fn close(&mut self) {}
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopVisualizer;

impl Visualizer for NoopVisualizer {}
