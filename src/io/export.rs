//! Export evaluation results.
//!
//! - `write_results_json`: final figures of merit plus per-probe summaries
//! - `write_cells_csv`: one row per (probe, cell) for spreadsheets or scripts

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Evaluation, InfoFocus, NoiseConfig, ProbeSummary};
use crate::error::AppError;
use crate::fisher::EvaluationRun;

/// JSON document written by `write_results_json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsFile {
    pub generated_at: DateTime<Utc>,
    pub nky: usize,
    pub nkz: usize,
    pub symmetry: bool,
    pub info_focus: InfoFocus,
    pub evaluation: Evaluation,
    pub probes: Vec<ProbeSummary>,
}

impl ResultsFile {
    pub fn new(run: &EvaluationRun, config: &NoiseConfig, generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            nky: config.nky,
            nkz: config.nkz,
            symmetry: config.symmetry,
            info_focus: config.info_focus,
            evaluation: run.evaluation,
            probes: run.summaries(),
        }
    }
}

/// Write the evaluation and per-probe summaries to a JSON file.
pub fn write_results_json(path: &Path, run: &EvaluationRun, config: &NoiseConfig) -> Result<(), AppError> {
    let doc = ResultsFile::new(run, config, Utc::now());
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create results JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(&mut file, &doc)
        .map_err(|e| AppError::new(2, format!("Failed to write results JSON: {e}")))?;
    writeln!(file).map_err(|e| AppError::new(2, format!("Failed to write results JSON: {e}")))?;
    Ok(())
}

/// Write per-cell diagnostics of every probe to a CSV file.
pub fn write_cells_csv(path: &Path, run: &EvaluationRun) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create cells CSV '{}': {e}", path.display())))?;
    write_cells(file, run)
}

fn write_cells(out: impl Write, run: &EvaluationRun) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(out);
    let err = |e: csv::Error| AppError::new(2, format!("Failed to write cells CSV: {e}"));

    writer
        .write_record([
            "probe", "iy", "iz", "occupancy", "diag_rho", "diag_t1", "diag_t2", "info_rho", "info_t1", "info_t2",
        ])
        .map_err(err)?;

    for outcome in &run.probes {
        let geometry = outcome.field.geometry();
        let diagonals = outcome.field.diagonals();
        for flat in 0..geometry.cell_count() {
            let (iy, iz) = geometry.cell_coords(flat);
            let d = diagonals[flat];
            let info = outcome.information.per_cell[flat];
            writer
                .write_record([
                    outcome.index.to_string(),
                    iy.to_string(),
                    iz.to_string(),
                    outcome.occupancy[flat].to_string(),
                    format!("{:.10e}", d[0]),
                    format!("{:.10e}", d[1]),
                    format!("{:.10e}", d[2]),
                    format!("{:.10e}", info[0]),
                    format!("{:.10e}", info[1]),
                    format!("{:.10e}", info[2]),
                ])
                .map_err(err)?;
        }
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write cells CSV: {e}")))?;
    Ok(())
}
