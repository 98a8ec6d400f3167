//! Shared evaluation pipeline used by the CLI subcommands.
//!
//! problem (+ trajectory CSV) → signal table → evaluator → run outputs
//!
//! The subcommands then only decide what to print or export.

use std::path::Path;

use num_complex::Complex64;
use tracing::info;

use crate::domain::NoiseConfig;
use crate::error::AppError;
use crate::fisher::{EvaluationRun, Evaluator, GridGeometry, KSpaceGrid, bin_trajectory};
use crate::io::ingest::{ProblemFile, load_problem};
use crate::plot::Visualizer;
use crate::signal::TabulatedSignal;

/// All computed outputs of a single `qnoise eval` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub problem: ProblemFile,
    pub run: EvaluationRun,
}

/// Load inputs and evaluate the sequence.
pub fn run_eval(
    problem_path: &Path,
    signals_path: &Path,
    trajectory_csv: Option<&Path>,
    configure: impl FnOnce(&mut NoiseConfig),
    vis: &mut dyn Visualizer,
) -> Result<RunOutput, AppError> {
    let mut problem = load_problem(problem_path, trajectory_csv)?;
    configure(&mut problem.config);
    problem.config.validate()?;

    let model = TabulatedSignal::read_json(signals_path)?;
    info!(entries = model.len(), path = %signals_path.display(), "signal table loaded");

    let run = Evaluator::new(&problem.config, &problem.sequence, &model)?.run(vis, None)?;
    Ok(RunOutput { problem, run })
}

/// Bin the trajectory with unit placeholder rows.
pub fn run_bin(problem_path: &Path, trajectory_csv: Option<&Path>) -> Result<KSpaceGrid, AppError> {
    let problem = load_problem(problem_path, trajectory_csv)?;
    bin_occupancy(&problem)
}

pub fn bin_occupancy(problem: &ProblemFile) -> Result<KSpaceGrid, AppError> {
    let trajectory = &problem.sequence.trajectory;
    if trajectory.sample_count() == 0 {
        return Err(AppError::new(3, "Trajectory is empty; nothing to bin."));
    }
    let rows = vec![vec![Complex64::new(1.0, 0.0)]; trajectory.repetitions()];
    let geometry = GridGeometry::from_config(&problem.config);
    bin_trajectory(trajectory, &rows, geometry, problem.config.max_meas)
}
