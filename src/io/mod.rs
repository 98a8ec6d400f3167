//! Input/output helpers.
//!
//! - problem JSON + trajectory CSV ingest (`ingest`)
//! - result exports (JSON/CSV) (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
