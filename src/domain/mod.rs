//! Domain types used throughout the engine.
//!
//! This module defines:
//!
//! - plate primitives (`WellId`, `WellReading`, `WellAssignment`, `PlateLayout`)
//! - fitting inputs/outputs (`StandardLevelInput`, `CurveFit`, `AutoQcSuggestion`)
//! - quantification outputs (`SampleQuantification`, `AnimalSummary`, ...)
//! - option structs carrying the engine defaults

pub mod types;

pub use types::*;
