//! `qnoise` library crate.
//!
//! Predicts noise levels and information content of quantitative MRI
//! sequences from per-cell Fisher matrices. The binary (`qnoise`) is a thin
//! wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - an outer optimizer can call `fisher::evaluate` directly

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fisher;
pub mod io;
pub mod math;
pub mod plot;
pub mod report;
pub mod signal;
