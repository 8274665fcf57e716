//! Synthetic data for demos and end-to-end tests.

pub mod simulate;

pub use simulate::*;
