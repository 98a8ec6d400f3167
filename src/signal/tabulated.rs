//! Precomputed signal tables.
//!
//! A table is a JSON list of entries, one per simulated tissue point:
//!
//! ```text
//! [{ "t1": 0.8, "t2": 0.05, "b1": 1.0,
//!    "magnetization": [[re, im], ...],
//!    "d_t1": [[re, im], ...], "d_t2": [...], "d_b1": [...] }]
//! ```
//!
//! Lookups match tissue points within `TISSUE_TOL`. The table is tied to one
//! sequence, so the sequence fields of a request are only checked for length.

use std::fs::File;
use std::path::Path;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::domain::ProbePoint;
use crate::error::AppError;
use crate::signal::{SignalModel, SignalRequest, SignalSeries};

const TISSUE_TOL: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignalEntry {
    pub t1: f64,
    pub t2: f64,
    #[serde(default = "nominal_b1")]
    pub b1: f64,
    pub magnetization: Vec<Complex64>,
    #[serde(default)]
    pub d_t1: Vec<Complex64>,
    #[serde(default)]
    pub d_t2: Vec<Complex64>,
    #[serde(default)]
    pub d_b1: Vec<Complex64>,
}

fn nominal_b1() -> f64 {
    1.0
}

impl SignalEntry {
    fn matches(&self, tissue: &ProbePoint) -> bool {
        (self.t1 - tissue.t1).abs() <= TISSUE_TOL
            && (self.t2 - tissue.t2).abs() <= TISSUE_TOL
            && (self.b1 - tissue.b1).abs() <= TISSUE_TOL
    }
}

/// Signal model backed by a lookup table.
#[derive(Debug, Clone, Default)]
pub struct TabulatedSignal {
    entries: Vec<SignalEntry>,
}

impl TabulatedSignal {
    pub fn new(entries: Vec<SignalEntry>) -> Self {
        Self { entries }
    }

    pub fn from_json_str(text: &str) -> Result<Self, AppError> {
        let entries: Vec<SignalEntry> =
            serde_json::from_str(text).map_err(|e| AppError::new(2, format!("Invalid signal table: {e}")))?;
        Ok(Self::new(entries))
    }

    pub fn read_json(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::new(2, format!("Failed to open signal table '{}': {e}", path.display())))?;
        let entries: Vec<SignalEntry> = serde_json::from_reader(file)
            .map_err(|e| AppError::new(2, format!("Invalid signal table '{}': {e}", path.display())))?;
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, tissue: &ProbePoint) -> Result<&SignalEntry, AppError> {
        self.entries.iter().find(|e| e.matches(tissue)).ok_or_else(|| {
            AppError::new(
                2,
                format!(
                    "Signal table has no entry for t1={}, t2={}, b1={}.",
                    tissue.t1, tissue.t2, tissue.b1
                ),
            )
        })
    }
}

impl SignalModel for TabulatedSignal {
    fn simulate(&self, request: &SignalRequest<'_>, tissues: &[ProbePoint]) -> Result<Vec<SignalSeries>, AppError> {
        tissues
            .iter()
            .map(|tissue| {
                let entry = self.lookup(tissue)?;
                let wanted = request.derivatives;
                let pick = |v: &Vec<Complex64>, want: bool, name: &str| -> Result<Vec<Complex64>, AppError> {
                    if !want {
                        return Ok(Vec::new());
                    }
                    if v.is_empty() {
                        return Err(AppError::new(
                            2,
                            format!(
                                "Signal table entry t1={}, t2={}, b1={} has no `{name}` column.",
                                entry.t1, entry.t2, entry.b1
                            ),
                        ));
                    }
                    Ok(v.clone())
                };
                Ok(SignalSeries {
                    magnetization: entry.magnetization.clone(),
                    d_t1: pick(&entry.d_t1, wanted.t1, "d_t1")?,
                    d_t2: pick(&entry.d_t2, wanted.t2, "d_t2")?,
                    d_b1: pick(&entry.d_b1, wanted.b1, "d_b1")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::DerivativeSet;

    const TABLE: &str = r#"[
        {"t1": 0.8, "t2": 0.05, "magnetization": [[0.1, 0.0], [0.2, -0.1]],
         "d_t1": [[0.01, 0.0], [0.02, 0.0]], "d_t2": [[0.0, 0.1], [0.0, 0.2]]},
        {"t1": 0.8, "t2": 0.05, "b1": 0.9, "magnetization": [[0.09, 0.0], [0.18, -0.09]]}
    ]"#;

    fn request(derivatives: DerivativeSet) -> SignalRequest<'static> {
        SignalRequest {
            rf_deg: &[10.0, 20.0],
            tr: 0.01,
            te: 0.002,
            max_order: 10,
            inversion: false,
            timing: &[],
            derivatives,
        }
    }

    #[test]
    fn looks_up_entries_by_tissue() {
        let table = TabulatedSignal::from_json_str(TABLE).unwrap();
        assert_eq!(table.len(), 2);

        let out = table
            .simulate(
                &request(DerivativeSet::primary(false)),
                &[ProbePoint::new(0.8, 0.05), ProbePoint::new(0.8, 0.05).with_b1(0.9)],
            )
            .unwrap_err();
        // The b1=0.9 entry has no derivatives.
        assert!(out.message().contains("d_t1"));

        let out = table
            .simulate(&request(DerivativeSet::NONE), &[ProbePoint::new(0.8, 0.05).with_b1(0.9)])
            .unwrap();
        assert_eq!(out[0].magnetization[1], Complex64::new(0.18, -0.09));
        assert!(out[0].d_t1.is_empty());
    }

    #[test]
    fn missing_tissue_is_reported() {
        let table = TabulatedSignal::from_json_str(TABLE).unwrap();
        let err = table
            .simulate(&request(DerivativeSet::NONE), &[ProbePoint::new(1.2, 0.05)])
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("t1=1.2"));
    }
}
