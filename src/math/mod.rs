//! Mathematical utilities: descriptive statistics and a dense linear solver.

pub mod linalg;
pub mod stats;

pub use linalg::*;
pub use stats::*;
