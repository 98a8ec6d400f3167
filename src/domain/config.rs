//! Typed evaluation configuration.
//!
//! Every recognized option is a field here; unknown fields are rejected when a
//! configuration is deserialized, and `validate` enforces the value ranges that
//! the numeric core relies on.

use serde::{Deserialize, Serialize};

use crate::domain::{B1Metric, B1Mode, InfoFocus, PRIMARY_PARAMS, PlotKind, ProbePoint};
use crate::error::AppError;

/// A full evaluation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoiseConfig {
    /// Repetition time (seconds).
    pub tr: f64,
    /// Whether an inversion prepulse precedes the RF train.
    pub inversion: bool,
    /// Reference T1 used by the noise normalization (seconds).
    pub t1_ref: f64,
    /// Reference T2 used by the noise normalization (seconds).
    pub t2_ref: f64,
    /// Maximum configuration order simulated by the signal model.
    pub max_epg_order: usize,
    /// Polynomial surrogate signal path. Not implemented; must stay `false`.
    #[serde(default)]
    pub surrogate: bool,
    /// Tissue operating points the figures of merit are averaged over.
    pub probes: Vec<ProbePoint>,
    /// Wrap out-of-range cells around non-folded grid axes.
    #[serde(default)]
    pub cyclic: bool,
    #[serde(default)]
    pub b1_mode: B1Mode,
    /// Diagonal regularization for rho, T1, T2.
    pub regularization: [f64; PRIMARY_PARAMS],
    /// Diagonal regularization for B1 when it is co-reconstructed.
    #[serde(default)]
    pub b1_regularization: f64,
    pub nky: usize,
    pub nkz: usize,
    /// Fold negative ky onto positive ky assuming Hermitian symmetry.
    #[serde(default)]
    pub symmetry: bool,
    /// Maximum rows stored per k-space cell.
    pub max_meas: usize,
    /// Up-weight central k-space cells in the aggregated Fisher matrix.
    #[serde(default)]
    pub emphasis: bool,
    /// Reference noise level for the information metric.
    pub sigma_ref: f64,
    #[serde(default)]
    pub info_focus: InfoFocus,
    #[serde(default = "unit_weights")]
    pub info_weights: [f64; PRIMARY_PARAMS],
    #[serde(default)]
    pub contrast_penalty_weight: f64,
    /// Auxiliary long-T1/T2 tissue used by the contrast penalty.
    #[serde(default = "default_contrast_tissue")]
    pub contrast_tissue: ProbePoint,
    /// Required when `b1_mode` models B1.
    #[serde(default)]
    pub b1_metric: Option<B1Metric>,
    /// Visualization events to emit.
    #[serde(default)]
    pub plots: Vec<PlotKind>,
    /// Tag under which per-probe Fisher matrices are cached. No tag, no writes.
    #[serde(default)]
    pub cache_tag: Option<String>,
}

fn unit_weights() -> [f64; PRIMARY_PARAMS] {
    [1.0; PRIMARY_PARAMS]
}

fn default_contrast_tissue() -> ProbePoint {
    ProbePoint::new(4.0, 2.0)
}

impl NoiseConfig {
    /// Parse and validate a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, AppError> {
        let config: NoiseConfig = serde_json::from_str(text)
            .map_err(|e| AppError::new(2, format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the numeric core cannot evaluate meaningfully.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.surrogate {
            return Err(AppError::new(
                2,
                "The polynomial surrogate signal path is not implemented; set `surrogate` to false.",
            ));
        }
        if !(self.tr.is_finite() && self.tr > 0.0) {
            return Err(AppError::new(2, format!("Invalid tr={} (must be finite and > 0).", self.tr)));
        }
        if !(self.t1_ref.is_finite() && self.t1_ref > 0.0 && self.t2_ref.is_finite() && self.t2_ref > 0.0) {
            return Err(AppError::new(
                2,
                format!(
                    "Invalid reference relaxation t1_ref={}, t2_ref={} (must be finite and > 0).",
                    self.t1_ref, self.t2_ref
                ),
            ));
        }
        if self.max_epg_order == 0 {
            return Err(AppError::new(2, "max_epg_order must be >= 1."));
        }
        if self.probes.is_empty() {
            return Err(AppError::new(3, "Probe set is empty; at least one (T1, T2) point is required."));
        }
        for (idx, p) in self.probes.iter().enumerate() {
            validate_tissue(p, &format!("probes[{idx}]"))?;
        }
        if self.nky == 0 || self.nkz == 0 {
            return Err(AppError::new(
                2,
                format!("Invalid grid nky={}, nkz={} (both must be > 0).", self.nky, self.nkz),
            ));
        }
        if self.nky % 2 != 0 {
            return Err(AppError::new(2, format!("nky={} must be even.", self.nky)));
        }
        if self.max_meas == 0 {
            return Err(AppError::new(2, "max_meas must be >= 1."));
        }
        if self.regularization.iter().any(|r| r.is_nan() || *r < 0.0) {
            return Err(AppError::new(
                2,
                format!("Invalid regularization {:?} (entries must be >= 0).", self.regularization),
            ));
        }
        if self.b1_regularization.is_nan() || self.b1_regularization < 0.0 {
            return Err(AppError::new(2, "b1_regularization must be >= 0."));
        }
        if !(self.sigma_ref.is_finite() && self.sigma_ref > 0.0) {
            return Err(AppError::new(2, "sigma_ref must be finite and > 0."));
        }
        if self.info_weights.iter().any(|w| !w.is_finite()) {
            return Err(AppError::new(2, "info_weights must be finite."));
        }
        if !(self.contrast_penalty_weight.is_finite() && self.contrast_penalty_weight >= 0.0) {
            return Err(AppError::new(2, "contrast_penalty_weight must be finite and >= 0."));
        }
        validate_tissue(&self.contrast_tissue, "contrast_tissue")?;
        if self.b1_mode.is_modeled() && self.b1_metric.is_none() {
            return Err(AppError::new(
                2,
                "b1_metric is required when b1_mode is `co_reconstruct` or `sensitivity`.",
            ));
        }
        Ok(())
    }

    /// Diagonal of the regularization matrix over the active Fisher columns.
    pub fn regularization_diag(&self) -> Vec<f64> {
        let mut diag = self.regularization.to_vec();
        diag.resize(self.b1_mode.active_params(), self.b1_regularization);
        diag
    }

    pub fn wants_plot(&self, kind: PlotKind) -> bool {
        self.plots.contains(&kind)
    }
}

fn validate_tissue(p: &ProbePoint, what: &str) -> Result<(), AppError> {
    let ok = p.t1.is_finite() && p.t1 > 0.0 && p.t2.is_finite() && p.t2 > 0.0 && p.b1.is_finite() && p.b1 > 0.0;
    if ok {
        Ok(())
    } else {
        Err(AppError::new(
            2,
            format!("Invalid {what}: t1={}, t2={}, b1={} (must be finite and > 0).", p.t1, p.t2, p.b1),
        ))
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> NoiseConfig {
    NoiseConfig {
        tr: 0.01,
        inversion: false,
        t1_ref: 1.0,
        t2_ref: 0.1,
        max_epg_order: 10,
        surrogate: false,
        probes: vec![ProbePoint::new(1.0, 0.1)],
        cyclic: false,
        b1_mode: B1Mode::None,
        regularization: [0.0; PRIMARY_PARAMS],
        b1_regularization: 0.0,
        nky: 4,
        nkz: 4,
        symmetry: false,
        max_meas: 1,
        emphasis: false,
        sigma_ref: 1.0,
        info_focus: InfoFocus::Sum,
        info_weights: [1.0; PRIMARY_PARAMS],
        contrast_penalty_weight: 0.0,
        contrast_tissue: ProbePoint::new(4.0, 2.0),
        b1_metric: None,
        plots: Vec::new(),
        cache_tag: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "tr": 0.01, "inversion": true, "t1_ref": 1.0, "t2_ref": 0.1,
        "max_epg_order": 20, "probes": [{"t1": 0.8, "t2": 0.08}],
        "regularization": [1e-4, 1e-4, 1e-4], "nky": 224, "nkz": 1,
        "max_meas": 8, "sigma_ref": 0.5
    }"#;

    #[test]
    fn minimal_json_fills_defaults() {
        let cfg = NoiseConfig::from_json_str(MINIMAL).unwrap();
        assert_eq!(cfg.b1_mode, B1Mode::None);
        assert_eq!(cfg.info_focus, InfoFocus::Sum);
        assert_eq!(cfg.probes[0].b1, 1.0);
        assert_eq!(cfg.contrast_tissue, ProbePoint::new(4.0, 2.0));
        assert!(!cfg.symmetry && !cfg.emphasis && !cfg.cyclic);
        assert_eq!(cfg.regularization_diag(), vec![1e-4; 3]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let text = MINIMAL.replace("\"sigma_ref\"", "\"sigma_rev\": 1.0, \"sigma_ref\"");
        let err = NoiseConfig::from_json_str(&text).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("sigma_rev"));
    }

    #[test]
    fn surrogate_path_is_not_implemented() {
        let mut cfg = test_config();
        cfg.surrogate = true;
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("not implemented"));
    }

    #[test]
    fn unrecognized_b1_metric_is_a_config_error() {
        let text = MINIMAL.replace(
            "\"sigma_ref\"",
            "\"b1_mode\": \"sensitivity\", \"b1_metric\": \"three_point\", \"sigma_ref\"",
        );
        let err = NoiseConfig::from_json_str(&text).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn modeled_b1_requires_metric() {
        let mut cfg = test_config();
        cfg.b1_mode = B1Mode::Sensitivity;
        assert!(cfg.validate().is_err());
        cfg.b1_metric = Some(B1Metric::DerivativeAt1);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.regularization_diag().len(), 3);

        cfg.b1_mode = B1Mode::CoReconstruct;
        cfg.b1_regularization = 0.5;
        assert_eq!(cfg.regularization_diag(), vec![0.0, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn malformed_grid_and_probes_are_rejected() {
        let mut cfg = test_config();
        cfg.nkz = 0;
        assert_eq!(cfg.validate().unwrap_err().exit_code(), 2);

        let mut cfg = test_config();
        cfg.nky = 5;
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.max_meas = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.probes.clear();
        assert_eq!(cfg.validate().unwrap_err().exit_code(), 3);

        let mut cfg = test_config();
        cfg.regularization[1] = -1.0;
        assert!(cfg.validate().is_err());
    }
}
