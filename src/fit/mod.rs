//! Standard-curve fitting.
//!
//! Responsibilities:
//!
//! - least-squares polynomials and their search-based inversion
//! - 4PL fitting by Levenberg–Marquardt and its closed-form inversion
//! - fitting over aggregated standard levels
//! - Auto-QC: greedy exclusion search scored by penalised R²

pub mod autoqc;
pub mod logistic;
pub mod polynomial;
pub mod standard;

pub use autoqc::*;
pub use logistic::*;
pub use polynomial::*;
pub use standard::*;
