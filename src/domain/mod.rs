//! Domain types used throughout the evaluator.
//!
//! This module defines:
//!
//! - trajectory and tissue inputs (`KPoint`, `Trajectory`, `ProbePoint`)
//! - option enums (`B1Mode`, `B1Metric`, `InfoFocus`, `PlotKind`)
//! - the typed configuration (`NoiseConfig`)
//! - evaluation outputs (`Evaluation`, `ProbeSummary`)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
