//! `elisa-quant` library crate.
//!
//! The binary (`elisa`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the engine (parse, fit, Auto-QC, quantify) is reusable from other front-ends
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod quant;
pub mod report;
