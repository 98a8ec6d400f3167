//! Reporting: formatted terminal output of evaluation runs.

pub mod format;

pub use format::*;
