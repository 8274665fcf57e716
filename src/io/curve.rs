//! Read/write curve JSON files.
//!
//! Curve JSON is the portable representation of a fitted standard curve:
//! - curve kind + parameters
//! - the concentration range inversions are restricted to
//! - the level means it was fitted on
//! - a precomputed log-spaced grid for quick plotting
//!
//! The schema is defined by `domain::CurveFile`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::domain::{CurveFile, CurveFit, CurveGrid, StandardLevelInput, StandardPoint};
use crate::error::AppError;
use crate::math::mean;

/// Grid resolution of exported curves.
pub const GRID_POINTS: usize = 101;

/// Assemble a curve file from a fit and the levels it was fitted on.
///
/// `None` when no usable level gives a concentration range.
pub fn build_curve_file(fit: &CurveFit, levels: &[StandardLevelInput]) -> Option<CurveFile> {
    let standards: Vec<StandardPoint> = levels
        .iter()
        .filter(|l| l.is_usable())
        .filter_map(|l| {
            let ys: Vec<f64> = l.replicates.iter().map(|r| r.y).collect();
            mean(&ys).map(|m| StandardPoint {
                level: l.level.clone(),
                conc: l.conc,
                mean: m,
            })
        })
        .collect();

    let lo = standards.iter().map(|p| p.conc).fold(f64::INFINITY, f64::min);
    let hi = standards.iter().map(|p| p.conc).fold(f64::NEG_INFINITY, f64::max);
    if !(lo.is_finite() && hi.is_finite()) {
        return None;
    }

    Some(CurveFile {
        tool: "elisa".to_string(),
        curve: fit.clone(),
        conc_range: (lo, hi),
        standards,
        grid: build_grid(fit, lo, hi, GRID_POINTS),
    })
}

/// Write a curve JSON file.
pub fn write_curve_json(path: &Path, curve: &CurveFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create curve JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, curve).map_err(|e| AppError::new(2, format!("Failed to write curve JSON: {e}")))
}

/// Read a curve JSON file.
pub fn read_curve_json(path: &Path) -> Result<CurveFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open curve JSON '{}': {e}", path.display())))?;
    let curve: CurveFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Invalid curve JSON: {e}")))?;
    Ok(curve)
}

/// Log-spaced grid over `[lo, hi]`; a degenerate range is widened by half a
/// decade on each side.
fn build_grid(fit: &CurveFit, lo: f64, hi: f64, n: usize) -> CurveGrid {
    let n = n.max(2);
    let mut t0 = lo.log10();
    let mut t1 = hi.log10();
    if (t1 - t0).abs() < 1e-9 {
        t0 -= 0.5;
        t1 += 0.5;
    }

    let conc: Vec<f64> = (0..n)
        .map(|i| {
            let u = i as f64 / (n as f64 - 1.0);
            10f64.powf(t0 + u * (t1 - t0))
        })
        .collect();
    let absorbance = conc.iter().map(|&c| fit.predict(c)).collect();

    CurveGrid { conc, absorbance }
}
