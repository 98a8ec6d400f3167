//! Evaluation over the configured probe tissues.
//!
//! Per probe: simulate, bin, assemble, reduce to noise/information and
//! estimate B1 coupling. Probes are independent and run in parallel; the
//! results are reduced in probe order, and only that sequential reduction
//! touches the visualizer and the Fisher cache.

use std::collections::HashMap;

use num_complex::Complex64;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{
    B1Metric, Evaluation, NoiseConfig, PRIMARY_PARAMS, PlotKind, ProbePoint, ProbeSummary, SequenceInput,
};
use crate::error::AppError;
use crate::fisher::assembler::{FisherField, assemble};
use crate::fisher::b1::{SweepColumn, derivative_at_1, multi_point};
use crate::fisher::binner::{GridGeometry, bin_trajectory};
use crate::fisher::noise::{InformationMap, information, nes2, noise_levels};
use crate::math::CMatrix;
use crate::plot::Visualizer;
use crate::signal::{DerivativeSet, SignalModel, SignalRequest, simulate_one, weight_rows};

/// Write-only sink for per-probe Fisher matrices.
///
/// The evaluator writes at most once per probe per run and never reads back.
pub trait FisherCache {
    fn store(&mut self, probe: usize, tag: &str, cells: Vec<CMatrix>);
}

impl FisherCache for HashMap<(usize, String), Vec<CMatrix>> {
    fn store(&mut self, probe: usize, tag: &str, cells: Vec<CMatrix>) {
        self.insert((probe, tag.to_string()), cells);
    }
}

/// Everything computed for one probe tissue.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub index: usize,
    pub summary: ProbeSummary,
    pub field: FisherField,
    pub information: InformationMap,
    /// Occupancy per cell in flat order.
    pub occupancy: Vec<usize>,
    /// Weight rows per repetition, before binning.
    pub rows: Vec<Vec<Complex64>>,
    pub magnetization: Vec<Complex64>,
}

/// Result of a full evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationRun {
    pub evaluation: Evaluation,
    pub probes: Vec<ProbeOutcome>,
}

impl EvaluationRun {
    pub fn summaries(&self) -> Vec<ProbeSummary> {
        self.probes.iter().map(|p| p.summary.clone()).collect()
    }
}

/// Evaluates one candidate sequence under one configuration.
pub struct Evaluator<'a> {
    config: &'a NoiseConfig,
    sequence: &'a SequenceInput,
    model: &'a dyn SignalModel,
}

impl<'a> Evaluator<'a> {
    pub fn new(config: &'a NoiseConfig, sequence: &'a SequenceInput, model: &'a dyn SignalModel) -> Result<Self, AppError> {
        config.validate()?;
        let reps = sequence.trajectory.repetitions();
        if reps == 0 || sequence.trajectory.sample_count() == 0 {
            return Err(AppError::new(3, "Trajectory is empty; nothing to evaluate."));
        }
        if sequence.rf_deg.len() != reps {
            return Err(AppError::new(
                2,
                format!(
                    "RF train has {} flip angles but the trajectory has {reps} repetitions.",
                    sequence.rf_deg.len()
                ),
            ));
        }
        if sequence.rf_deg.iter().any(|a| !a.is_finite()) {
            return Err(AppError::new(2, "RF train contains non-finite flip angles."));
        }
        Ok(Self {
            config,
            sequence,
            model,
        })
    }

    pub fn config(&self) -> &NoiseConfig {
        self.config
    }

    pub fn geometry(&self) -> GridGeometry {
        GridGeometry::from_config(self.config)
    }

    /// Evaluate a single probe tissue.
    pub fn evaluate_probe(&self, index: usize, probe: ProbePoint) -> Result<ProbeOutcome, AppError> {
        let cfg = self.config;
        let with_b1 = cfg.b1_mode.is_modeled();
        let request = SignalRequest::new(self.sequence, cfg, DerivativeSet::primary(with_b1));
        let series = simulate_one(self.model, &request, probe)?;
        let rows = weight_rows(&series, probe, with_b1);

        let grid = bin_trajectory(&self.sequence.trajectory, &rows, self.geometry(), cfg.max_meas)?;
        if grid.rows_saturated() > 0 {
            warn!(
                probe = index,
                dropped = grid.rows_saturated(),
                max_meas = cfg.max_meas,
                "cells saturated; later samples dropped"
            );
        }

        let field = assemble(&grid, &cfg.regularization_diag(), cfg.emphasis)?;
        let n2 = nes2(cfg, request.repetitions());
        let noise = noise_levels(&field, n2);
        let info = information(&field, n2, cfg.sigma_ref);
        let focused = info.focus(cfg.info_focus, &cfg.info_weights);

        let b1_sensitivity = match (with_b1, cfg.b1_metric) {
            (true, Some(B1Metric::DerivativeAt1)) => derivative_at_1(&grid, &cfg.regularization)?,
            (true, Some(metric)) => {
                let column = if metric == B1Metric::MultiPointValues {
                    SweepColumn::Difference
                } else {
                    SweepColumn::Derivative
                };
                multi_point(
                    self.model,
                    &request,
                    &self.sequence.trajectory,
                    probe,
                    cfg.symmetry,
                    &cfg.regularization,
                    column,
                )?
            }
            _ => [0.0; PRIMARY_PARAMS],
        };

        if noise.iter().chain(&b1_sensitivity).any(|v| !v.is_finite()) || !focused.is_finite() {
            return Err(AppError::new(
                4,
                format!("Non-finite figures of merit for probe {index} (t1={}, t2={}).", probe.t1, probe.t2),
            ));
        }

        debug!(
            probe = index,
            t1 = probe.t1,
            t2 = probe.t2,
            ?noise,
            information = focused,
            ?b1_sensitivity,
            rows_binned = grid.rows_binned(),
            "probe evaluated"
        );

        Ok(ProbeOutcome {
            index,
            summary: ProbeSummary {
                probe,
                noise,
                information: focused,
                information_totals: info.totals,
                b1_sensitivity,
                rows_binned: grid.rows_binned(),
                rows_dropped: grid.rows_saturated() + grid.rows_outside(),
            },
            field,
            information: info,
            occupancy: grid.occupancy_map(),
            rows,
            magnetization: series.magnetization,
        })
    }

    /// Evaluate every probe and average the figures of merit.
    pub fn run(&self, vis: &mut dyn Visualizer, mut cache: Option<&mut dyn FisherCache>) -> Result<EvaluationRun, AppError> {
        let cfg = self.config;
        let geometry = self.geometry();

        if cfg.wants_plot(PlotKind::First) {
            vis.first(self.sequence);
        }
        if cfg.wants_plot(PlotKind::Trajectories) {
            vis.trajectories(&self.sequence.trajectory, geometry);
        }

        let outcomes: Vec<ProbeOutcome> = cfg
            .probes
            .par_iter()
            .enumerate()
            .map(|(index, &probe)| self.evaluate_probe(index, probe))
            .collect::<Result<_, _>>()?;

        let mut noise = [0.0; PRIMARY_PARAMS];
        let mut info = 0.0;
        let mut b1_squares = [0.0; PRIMARY_PARAMS];
        for outcome in &outcomes {
            if let (Some(tag), Some(cache)) = (cfg.cache_tag.as_deref(), cache.as_deref_mut()) {
                cache.store(outcome.index, tag, outcome.field.cells().to_vec());
            }
            if cfg.wants_plot(PlotKind::OriginalJacobian) {
                vis.original_jacobian(outcome.index, &outcome.rows);
            }
            if cfg.wants_plot(PlotKind::Weighting) {
                vis.weighting(outcome.index, geometry, &outcome.occupancy);
            }
            if cfg.wants_plot(PlotKind::NoiseSpectrum) {
                vis.noise_spectrum(outcome.index, geometry, outcome.field.diagonals());
            }
            if cfg.wants_plot(PlotKind::InfoCon) {
                vis.info_content(outcome.index, geometry, &outcome.information);
            }

            let s = &outcome.summary;
            for p in 0..PRIMARY_PARAMS {
                noise[p] += s.noise[p];
                b1_squares[p] += s.b1_sensitivity[p] * s.b1_sensitivity[p];
            }
            info += s.information;
        }

        let count = outcomes.len() as f64;
        let b1_sensitivity = match outcomes.as_slice() {
            [single] => single.summary.b1_sensitivity,
            _ => b1_squares.map(|sq| (sq / count).sqrt()),
        };

        let contrast_penalty = if cfg.contrast_penalty_weight > 0.0 {
            self.contrast_penalty(&outcomes)?
        } else {
            0.0
        };

        let evaluation = Evaluation {
            noise: noise.map(|n| n / count),
            information: info / count,
            b1_sensitivity,
            contrast_penalty,
        };

        info!(
            probes = outcomes.len(),
            noise = ?evaluation.noise,
            information = evaluation.information,
            b1_sensitivity = ?evaluation.b1_sensitivity,
            contrast_penalty = evaluation.contrast_penalty,
            "evaluation complete"
        );

        let run = EvaluationRun {
            evaluation,
            probes: outcomes,
        };
        if cfg.wants_plot(PlotKind::Bars) {
            vis.bars(&run.evaluation, &run.summaries());
        }
        if cfg.wants_plot(PlotKind::Close) {
            vis.close();
        }
        Ok(run)
    }

    /// `‖M(aux)‖ / ‖mean over probes of M(probe)‖`.
    fn contrast_penalty(&self, outcomes: &[ProbeOutcome]) -> Result<f64, AppError> {
        let request = SignalRequest::new(self.sequence, self.config, DerivativeSet::NONE);
        let aux = simulate_one(self.model, &request, self.config.contrast_tissue)?;

        let n = request.repetitions();
        let mut mean = vec![Complex64::new(0.0, 0.0); n];
        for outcome in outcomes {
            for (acc, m) in mean.iter_mut().zip(&outcome.magnetization) {
                *acc += m;
            }
        }
        let scale = Complex64::new(1.0 / outcomes.len() as f64, 0.0);

        let mean_norm = norm(mean.iter().map(|m| m * scale));
        if mean_norm == 0.0 {
            return Err(AppError::new(
                4,
                "Mean probe magnetization is zero; contrast penalty is undefined.",
            ));
        }
        Ok(norm(aux.magnetization.iter().copied()) / mean_norm)
    }
}

fn norm(values: impl Iterator<Item = Complex64>) -> f64 {
    values.map(|v| v.norm_sqr()).sum::<f64>().sqrt()
}

/// Evaluate `sequence` with no visualization and no cache.
pub fn evaluate(config: &NoiseConfig, sequence: &SequenceInput, model: &dyn SignalModel) -> Result<Evaluation, AppError> {
    let evaluator = Evaluator::new(config, sequence, model)?;
    let mut vis = crate::plot::NoopVisualizer;
    Ok(evaluator.run(&mut vis, None)?.evaluation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::test_config;
    use crate::domain::{B1Mode, KPoint, Trajectory};
    use crate::signal::testing::AnalyticSignal;

    fn sequence() -> SequenceInput {
        let ks = [0.0, -3.0, 2.0, -1.0, 1.0, -4.0, 3.0, -2.0, 0.0, 0.5, -0.5, 1.5];
        SequenceInput {
            rf_deg: (0..ks.len()).map(|n| 8.0 + 4.0 * n as f64).collect(),
            te: 0.003,
            timing: Vec::new(),
            trajectory: Trajectory::single_shot(ks.iter().map(|&ky| KPoint::new(ky, 0.0))),
        }
    }

    fn config() -> NoiseConfig {
        let mut cfg = test_config();
        cfg.nky = 8;
        cfg.nkz = 1;
        cfg.max_meas = 4;
        cfg.regularization = [1e-3, 1e-3, 1e-3];
        cfg.probes = vec![ProbePoint::new(0.8, 0.06)];
        cfg
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl Visualizer for Recorder {
        fn first(&mut self, _sequence: &SequenceInput) {
            self.events.push("first".into());
        }
        fn noise_spectrum(&mut self, probe: usize, _geometry: GridGeometry, _diagonals: &[[f64; 3]]) {
            self.events.push(format!("noisespectrum:{probe}"));
        }
        fn bars(&mut self, _evaluation: &Evaluation, probes: &[ProbeSummary]) {
            self.events.push(format!("bars:{}", probes.len()));
        }
        fn close(&mut self) {
            self.events.push("close".into());
        }
    }

    #[test]
    fn single_probe_returns_raw_sensitivity() {
        let mut cfg = config();
        cfg.b1_mode = B1Mode::Sensitivity;
        cfg.b1_metric = Some(B1Metric::DerivativeAt1);
        let seq = sequence();
        let evaluator = Evaluator::new(&cfg, &seq, &AnalyticSignal).unwrap();

        let probe = evaluator.evaluate_probe(0, cfg.probes[0]).unwrap();
        let run = evaluator.run(&mut crate::plot::NoopVisualizer, None).unwrap();
        assert_eq!(run.evaluation.b1_sensitivity, probe.summary.b1_sensitivity);
        assert!(probe.summary.b1_sensitivity.iter().any(|&s| s != 0.0));
        assert_eq!(run.evaluation.noise, probe.summary.noise);
    }

    #[test]
    fn probe_figures_are_averaged() {
        let mut cfg = config();
        cfg.b1_mode = B1Mode::Sensitivity;
        cfg.b1_metric = Some(B1Metric::DerivativeAt1);
        cfg.probes = vec![ProbePoint::new(0.8, 0.06), ProbePoint::new(1.4, 0.11), ProbePoint::new(0.3, 0.04)];
        let seq = sequence();
        let evaluator = Evaluator::new(&cfg, &seq, &AnalyticSignal).unwrap();
        let run = evaluator.run(&mut crate::plot::NoopVisualizer, None).unwrap();
        assert_eq!(run.probes.len(), 3);

        for p in 0..3 {
            let mean = run.probes.iter().map(|o| o.summary.noise[p]).sum::<f64>() / 3.0;
            assert!((run.evaluation.noise[p] - mean).abs() <= 1e-12 * mean.abs().max(1.0));
            let rms = (run.probes.iter().map(|o| o.summary.b1_sensitivity[p].powi(2)).sum::<f64>() / 3.0).sqrt();
            assert!((run.evaluation.b1_sensitivity[p] - rms).abs() <= 1e-12 * rms.max(1.0));
            assert!(run.evaluation.b1_sensitivity[p] >= 0.0);
        }
        let info = run.probes.iter().map(|o| o.summary.information).sum::<f64>() / 3.0;
        assert!((run.evaluation.information - info).abs() <= 1e-12 * info.abs().max(1.0));
    }

    #[test]
    fn parallel_run_matches_sequential_probes() {
        let mut cfg = config();
        cfg.probes = vec![ProbePoint::new(0.8, 0.06), ProbePoint::new(1.4, 0.11)];
        let seq = sequence();
        let evaluator = Evaluator::new(&cfg, &seq, &AnalyticSignal).unwrap();
        let run = evaluator.run(&mut crate::plot::NoopVisualizer, None).unwrap();
        for (i, &probe) in cfg.probes.iter().enumerate() {
            let alone = evaluator.evaluate_probe(i, probe).unwrap();
            assert_eq!(alone.summary, run.probes[i].summary);
        }
    }

    #[test]
    fn unmodeled_b1_reports_zero_sensitivity() {
        let cfg = config();
        let seq = sequence();
        let eval = evaluate(&cfg, &seq, &AnalyticSignal).unwrap();
        assert_eq!(eval.b1_sensitivity, [0.0; 3]);
        assert_eq!(eval.contrast_penalty, 0.0);
        assert!(eval.noise.iter().all(|&n| n > 0.0 && n.is_finite()));
        assert!(eval.information > 0.0);
    }

    #[test]
    fn cache_is_written_once_per_probe_when_tagged() {
        let mut cfg = config();
        cfg.probes = vec![ProbePoint::new(0.8, 0.06), ProbePoint::new(1.4, 0.11)];
        let seq = sequence();

        let mut cache: HashMap<(usize, String), Vec<CMatrix>> = HashMap::new();
        Evaluator::new(&cfg, &seq, &AnalyticSignal)
            .unwrap()
            .run(&mut crate::plot::NoopVisualizer, Some(&mut cache as &mut dyn FisherCache))
            .unwrap();
        assert!(cache.is_empty());

        cfg.cache_tag = Some("iter-7".into());
        let run = Evaluator::new(&cfg, &seq, &AnalyticSignal)
            .unwrap()
            .run(&mut crate::plot::NoopVisualizer, Some(&mut cache as &mut dyn FisherCache))
            .unwrap();
        assert_eq!(cache.len(), 2);
        let stored = &cache[&(1, "iter-7".to_string())];
        assert_eq!(stored.len(), GridGeometry::from_config(&cfg).cell_count());
        assert_eq!(stored.as_slice(), run.probes[1].field.cells());
    }

    #[test]
    fn visualizer_sees_only_requested_events() {
        let mut cfg = config();
        cfg.probes = vec![ProbePoint::new(0.8, 0.06), ProbePoint::new(1.4, 0.11)];
        cfg.plots = vec![PlotKind::Close, PlotKind::NoiseSpectrum, PlotKind::Bars];
        let seq = sequence();
        let mut rec = Recorder::default();
        Evaluator::new(&cfg, &seq, &AnalyticSignal).unwrap().run(&mut rec, None).unwrap();
        assert_eq!(rec.events, vec!["noisespectrum:0", "noisespectrum:1", "bars:2", "close"]);
    }

    #[test]
    fn contrast_penalty_is_norm_ratio() {
        let mut cfg = config();
        cfg.contrast_penalty_weight = 0.5;
        cfg.probes = vec![ProbePoint::new(0.8, 0.06), ProbePoint::new(1.4, 0.11)];
        let seq = sequence();
        let run = Evaluator::new(&cfg, &seq, &AnalyticSignal)
            .unwrap()
            .run(&mut crate::plot::NoopVisualizer, None)
            .unwrap();

        let req = SignalRequest::new(&seq, &cfg, DerivativeSet::NONE);
        let aux = simulate_one(&AnalyticSignal, &req, ProbePoint::new(4.0, 2.0)).unwrap();
        let a = simulate_one(&AnalyticSignal, &req, cfg.probes[0]).unwrap();
        let b = simulate_one(&AnalyticSignal, &req, cfg.probes[1]).unwrap();
        let mean_norm = a
            .magnetization
            .iter()
            .zip(&b.magnetization)
            .map(|(x, y)| ((x + y) * 0.5).norm_sqr())
            .sum::<f64>()
            .sqrt();
        let aux_norm = aux.magnetization.iter().map(|v| v.norm_sqr()).sum::<f64>().sqrt();
        let expected = aux_norm / mean_norm;
        assert!((run.evaluation.contrast_penalty - expected).abs() < 1e-12 * expected);
    }

    #[test]
    fn multi_point_metric_runs_through_evaluator() {
        let mut cfg = config();
        cfg.b1_mode = B1Mode::CoReconstruct;
        cfg.b1_regularization = 1e-3;
        cfg.b1_metric = Some(B1Metric::MultiPointValues);
        let seq = sequence();
        let eval = evaluate(&cfg, &seq, &AnalyticSignal).unwrap();
        assert!(eval.b1_sensitivity.iter().all(|s| s.is_finite()));
        assert!(eval.b1_sensitivity.iter().any(|&s| s > 0.0));
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        let cfg = config();
        let mut seq = sequence();
        seq.rf_deg.pop();
        assert_eq!(Evaluator::new(&cfg, &seq, &AnalyticSignal).err().map(|e| e.exit_code()), Some(2));

        let empty = SequenceInput::default();
        assert_eq!(Evaluator::new(&cfg, &empty, &AnalyticSignal).err().map(|e| e.exit_code()), Some(3));

        let mut cfg = config();
        cfg.surrogate = true;
        let seq = sequence();
        let err = Evaluator::new(&cfg, &seq, &AnalyticSignal).err().map(|e| e.exit_code());
        assert_eq!(err, Some(2));
    }
}
