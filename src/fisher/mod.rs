//! Fisher-information engine.
//!
//! `binner` → `assembler` → `noise` per probe tissue, with `b1` estimating the
//! coupling of an unmodeled B1 error. `probe_set` drives the whole run.

pub mod assembler;
pub mod b1;
pub mod binner;
pub mod noise;
pub mod probe_set;

pub use assembler::{FisherField, assemble};
pub use binner::{GridGeometry, KSpaceGrid, bin_trajectory};
pub use noise::InformationMap;
pub use probe_set::{EvaluationRun, Evaluator, FisherCache, ProbeOutcome, evaluate};
