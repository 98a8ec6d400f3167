//! ASCII rendering of visualization events for terminal output.
//!
//! Output is a list of fixed-size text pages, deterministic for golden tests:
//! - per-cell maps: heatmaps with a ten-step intensity ramp
//! - per-repetition series: line plots, one character per series
//! - figures of merit: horizontal bars

use num_complex::Complex64;

use crate::domain::{Evaluation, PRIMARY_PARAMS, Param, ProbeSummary, SequenceInput, Trajectory};
use crate::fisher::{GridGeometry, InformationMap};
use crate::plot::Visualizer;

const RAMP: [char; 10] = [' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];
const SERIES_CHARS: [char; 4] = ['m', '1', '2', 'b'];

/// Collects one text page per event.
#[derive(Debug, Clone)]
pub struct AsciiVisualizer {
    width: usize,
    height: usize,
    pages: Vec<String>,
    closed: bool,
}

impl AsciiVisualizer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width: width.max(10),
            height: height.max(5),
            pages: Vec::new(),
            closed: false,
        }
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn into_pages(self) -> Vec<String> {
        self.pages
    }
}

impl Visualizer for AsciiVisualizer {
    fn first(&mut self, sequence: &SequenceInput) {
        let page = render_series("RF train (deg)", &[('-', sequence.rf_deg.clone())], self.width, self.height);
        self.pages.push(page);
    }

    fn trajectories(&mut self, trajectory: &Trajectory, geometry: GridGeometry) {
        let page = render_trajectory(trajectory, geometry, self.width, self.height);
        self.pages.push(page);
    }

    fn original_jacobian(&mut self, probe: usize, rows: &[Vec<Complex64>]) {
        let cols = rows.first().map_or(0, Vec::len);
        let series: Vec<(char, Vec<f64>)> = (0..cols.min(SERIES_CHARS.len()))
            .map(|j| (SERIES_CHARS[j], rows.iter().map(|r| r[j].norm()).collect()))
            .collect();
        let title = format!("Jacobian magnitude, probe {probe} (m=M 1=T1 2=T2 b=B1)");
        self.pages.push(render_series(&title, &series, self.width, self.height));
    }

    fn weighting(&mut self, probe: usize, geometry: GridGeometry, occupancy: &[usize]) {
        let values: Vec<f64> = occupancy.iter().map(|&n| n as f64).collect();
        let title = format!("Occupancy, probe {probe}");
        self.pages.push(render_heatmap(&title, geometry, &values, self.width, self.height));
    }

    fn noise_spectrum(&mut self, probe: usize, geometry: GridGeometry, diagonals: &[[f64; PRIMARY_PARAMS]]) {
        let page = per_param_heatmaps("Fisher diagonal", probe, geometry, diagonals, self.width, self.height);
        self.pages.push(page);
    }

    fn info_content(&mut self, probe: usize, geometry: GridGeometry, info: &InformationMap) {
        let page = per_param_heatmaps("Information", probe, geometry, &info.per_cell, self.width, self.height);
        self.pages.push(page);
    }

    fn bars(&mut self, evaluation: &Evaluation, probes: &[ProbeSummary]) {
        self.pages.push(render_noise_bars(evaluation, probes, self.width));
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

fn per_param_heatmaps(
    what: &str,
    probe: usize,
    geometry: GridGeometry,
    values: &[[f64; PRIMARY_PARAMS]],
    width: usize,
    height: usize,
) -> String {
    let mut out = String::new();
    for param in Param::PRIMARY {
        let column: Vec<f64> = values.iter().map(|v| v[param.column()]).collect();
        let title = format!("{what} {}, probe {probe}", param.label());
        out.push_str(&render_heatmap(&title, geometry, &column, width, height));
    }
    out
}

/// Render a per-cell map (flat cell order) with ky across and kz upwards.
///
/// Grids larger than the page are reduced by taking the maximum per block.
pub fn render_heatmap(title: &str, geometry: GridGeometry, values: &[f64], width: usize, height: usize) -> String {
    let cols = geometry.ky_cells();
    let rows = geometry.kz_cells();
    let out_w = cols.min(width.max(1));
    let out_h = rows.min(height.max(1));

    let vmax = values.iter().copied().filter(|v| v.is_finite()).fold(0.0_f64, f64::max);

    let mut out = format!("{title} | {cols}x{rows} cells | max={vmax:.3e}\n");
    for r in (0..out_h).rev() {
        let (z0, z1) = block(r, rows, out_h);
        let mut line = String::with_capacity(out_w);
        for c in 0..out_w {
            let (y0, y1) = block(c, cols, out_w);
            let mut v = 0.0_f64;
            for iy in y0..y1 {
                for iz in z0..z1 {
                    let x = values.get(geometry.flat_index(iy, iz)).copied().unwrap_or(0.0);
                    if x.is_finite() {
                        v = v.max(x);
                    }
                }
            }
            line.push(shade(v, vmax));
        }
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn block(i: usize, len: usize, parts: usize) -> (usize, usize) {
    (i * len / parts, ((i + 1) * len / parts).max(i * len / parts + 1))
}

fn shade(v: f64, vmax: f64) -> char {
    if vmax <= 0.0 || v <= 0.0 {
        return RAMP[0];
    }
    let top = (RAMP.len() - 1) as f64;
    let idx = ((v / vmax) * top).round().clamp(1.0, top) as usize;
    RAMP[idx]
}

/// Line plot of one or more series against repetition index.
pub fn render_series(title: &str, series: &[(char, Vec<f64>)], width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);
    let n = series.iter().map(|(_, s)| s.len()).max().unwrap_or(0);

    let (y_min, y_max) = y_range(series.iter().flat_map(|(_, s)| s.iter().copied())).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);
    let x_max = (n.max(2) - 1) as f64;

    let mut grid = vec![vec![' '; width]; height];
    for (ch, values) in series {
        let mut prev = None;
        for (i, &y) in values.iter().enumerate() {
            if !y.is_finite() {
                prev = None;
                continue;
            }
            let x = map_x(i as f64, 0.0, x_max, width);
            let yy = map_y(y, y_min, y_max, height);
            match prev {
                Some((x0, y0)) => draw_line(&mut grid, x0, y0, x, yy, *ch),
                None => grid[yy][x] = *ch,
            }
            prev = Some((x, yy));
        }
    }

    let mut out = format!("{title} | n={n} | y=[{y_min:.3}, {y_max:.3}]\n");
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn render_trajectory(trajectory: &Trajectory, geometry: GridGeometry, width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);
    let reps = trajectory.repetitions();
    let half_y = (geometry.nky / 2) as f64;
    let half_z = (geometry.nkz / 2) as f64;
    let span = half_y.max(half_z).max(1.0);
    let x_max = (reps.max(2) - 1) as f64;

    let mut grid = vec![vec![' '; width]; height];
    for (rep, samples) in trajectory.iter().enumerate() {
        let x = map_x(rep as f64, 0.0, x_max, width);
        for s in samples {
            if geometry.nkz > 1 {
                grid[map_y(s.kz, -span, span, height)][x] = 'z';
            }
            grid[map_y(s.ky, -span, span, height)][x] = 'y';
        }
    }

    let mut out = format!("Trajectory | reps={reps} samples={} | k=[{:.1}, {span:.1}]\n", trajectory.sample_count(), -span);
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn render_noise_bars(evaluation: &Evaluation, probes: &[ProbeSummary], width: usize) -> String {
    let label_w = 22;
    let bar_w = width.saturating_sub(label_w + 14).max(5);

    let mut out = String::from("Noise per probe\n");
    for param in Param::PRIMARY {
        let p = param.column();
        let mut rows: Vec<(String, f64)> = probes
            .iter()
            .map(|s| (format!("T1={:.3} T2={:.3}", s.probe.t1, s.probe.t2), s.noise[p]))
            .collect();
        rows.push(("mean".to_string(), evaluation.noise[p]));
        let vmax = rows.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);

        out.push_str(&format!("{}:\n", param.label()));
        for (label, v) in rows {
            let len = if vmax > 0.0 { ((v / vmax) * bar_w as f64).round() as usize } else { 0 };
            out.push_str(&format!("  {label:<label_w$} {:<bar_w$} {v:.4e}\n", "#".repeat(len.min(bar_w))));
        }
    }
    out
}

fn y_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for y in values.filter(|y| y.is_finite()) {
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }
    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else if min_y.is_finite() {
        Some((min_y - 0.5, min_y + 0.5))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // Row 0 is the top of the page.
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

/// Integer line drawing (Bresenham).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0 && (y0 as usize) < grid.len() && x0 >= 0 && (x0 as usize) < grid[0].len() {
            grid[y0 as usize][x0 as usize] = ch;
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
