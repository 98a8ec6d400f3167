//! Formatted terminal output.
//!
//! Formatting lives here so the numeric code stays free of presentation and
//! output changes stay local to one module.

use crate::domain::{B1Mode, NoiseConfig, Param, ProbeSummary, SequenceInput};
use crate::fisher::{EvaluationRun, KSpaceGrid};
use crate::plot::ascii::render_heatmap;

/// Configuration, sequence shape and figures of merit of a run.
pub fn format_run_summary(config: &NoiseConfig, sequence: &SequenceInput, run: &EvaluationRun) -> String {
    let mut out = String::new();

    out.push_str("=== qnoise - Fisher noise/information evaluation ===\n");
    out.push_str(&format!(
        "Grid: nky={} nkz={} | symmetry={} cyclic={} | max_meas={}\n",
        config.nky, config.nkz, config.symmetry, config.cyclic, config.max_meas
    ));
    out.push_str(&format!(
        "Sequence: reps={} samples={} | TR={:.4}s TE={:.4}s | inversion={}\n",
        sequence.trajectory.repetitions(),
        sequence.trajectory.sample_count(),
        config.tr,
        sequence.te,
        config.inversion
    ));
    out.push_str(&format!(
        "Regularization: {} | emphasis={} | B1: {}\n",
        fmt_vec(&config.regularization_diag()),
        config.emphasis,
        b1_label(config)
    ));

    let e = &run.evaluation;
    out.push_str("\nFigures of merit:\n");
    for param in Param::PRIMARY {
        out.push_str(&format!("- noise {:<4}: {:.6}\n", param.label(), e.noise[param.column()]));
    }
    out.push_str(&format!("- information ({:?}): {:.6}\n", config.info_focus, e.information).to_lowercase());
    out.push_str(&format!("- B1 sensitivity : {}\n", fmt_vec(&e.b1_sensitivity)));
    out.push_str(&format!("- contrast penalty: {:.6}\n", e.contrast_penalty));
    out.push('\n');

    out.push_str("Per probe:\n");
    out.push_str(&format_probe_table(&run.summaries()));
    out
}

fn b1_label(config: &NoiseConfig) -> String {
    match (config.b1_mode, config.b1_metric) {
        (B1Mode::None, _) => "not modeled".to_string(),
        (mode, Some(metric)) => format!("{mode:?} ({metric:?})"),
        (mode, None) => format!("{mode:?}"),
    }
}

/// One line per probe tissue.
pub fn format_probe_table(rows: &[ProbeSummary]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<4} {:>8} {:>8} {:>12} {:>12} {:>12} {:>12} {:>8} {:>8}\n",
            "#", "T1", "T2", "noise_rho", "noise_T1", "noise_T2", "info", "binned", "dropped"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<4} {:-<8} {:-<8} {:-<12} {:-<12} {:-<12} {:-<12} {:-<8} {:-<8}\n",
            "", "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for (i, r) in rows.iter().enumerate() {
        out.push_str(&format!(
            "{:<4} {:>8.4} {:>8.4} {:>12.5e} {:>12.5e} {:>12.5e} {:>12.4} {:>8} {:>8}\n",
            i, r.probe.t1, r.probe.t2, r.noise[0], r.noise[1], r.noise[2], r.information, r.rows_binned, r.rows_dropped
        ));
    }
    out
}

/// Occupancy map and binning counters of a grid.
pub fn format_occupancy(grid: &KSpaceGrid, width: usize, height: usize) -> String {
    let g = grid.geometry();
    let occupancy = grid.occupancy_map();
    let filled = occupancy.iter().filter(|&&n| n > 0).count();
    let full = occupancy.iter().filter(|&&n| n >= grid.max_meas()).count();

    let mut out = String::new();
    out.push_str(&format!(
        "Cells: {} ({}x{}) | filled={} saturated={} | centre occupancy={}\n",
        g.cell_count(),
        g.ky_cells(),
        g.kz_cells(),
        filled,
        full,
        grid.centre_cell().occupancy()
    ));
    out.push_str(&format!(
        "Rows: binned={} dropped_full={} dropped_outside={}\n",
        grid.rows_binned(),
        grid.rows_saturated(),
        grid.rows_outside()
    ));
    let values: Vec<f64> = occupancy.iter().map(|&n| n as f64).collect();
    out.push_str(&render_heatmap("Occupancy", g, &values, width, height));
    out
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.6}")).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{KPoint, ProbePoint, Trajectory};
    use crate::fisher::{GridGeometry, bin_trajectory};
    use num_complex::Complex64;

    #[test]
    fn probe_table_lines_up() {
        let row = ProbeSummary {
            probe: ProbePoint::new(0.8, 0.05),
            noise: [1.0, 2.5, 0.125],
            information: 12.5,
            information_totals: [4.0, 4.0, 4.5],
            b1_sensitivity: [0.0; 3],
            rows_binned: 10,
            rows_dropped: 2,
        };
        let txt = format_probe_table(&[row]);
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("#"));
        assert!(lines[0].ends_with("dropped"));
        assert_eq!(
            lines[2],
            "0      0.8000   0.0500    1.00000e0    2.50000e0   1.25000e-1      12.5000       10        2"
        );
    }

    #[test]
    fn occupancy_report_counts_rows() {
        let g = GridGeometry {
            nky: 4,
            nkz: 1,
            symmetry: false,
            cyclic: false,
        };
        let traj = Trajectory::single_shot([KPoint::new(0.0, 0.0), KPoint::new(0.0, 0.0), KPoint::new(5.0, 0.0)]);
        let rows = vec![vec![Complex64::new(1.0, 0.0)]; 3];
        let grid = bin_trajectory(&traj, &rows, g, 1).unwrap();
        let txt = format_occupancy(&grid, 40, 10);
        assert!(txt.starts_with("Cells: 4 (4x1) | filled=1 saturated=1 | centre occupancy=1\n"));
        assert!(txt.contains("Rows: binned=1 dropped_full=1 dropped_outside=1\n"));
        assert!(txt.ends_with("  @ \n"));
    }
}
