//! Mathematical utilities: grid kernels and regularized complex inversion.

pub mod kernel;
pub mod linalg;

pub use kernel::*;
pub use linalg::*;
