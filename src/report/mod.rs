//! Reporting utilities: formatted terminal output for parse, quantify and
//! invert runs.

pub mod format;

pub use format::*;
