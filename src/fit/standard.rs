//! Standard-curve fitting over aggregated standard levels.
//!
//! Each usable level contributes one point: its nominal concentration and the
//! mean of its replicate responses. The chosen `CurveKind` decides which
//! fitter runs.

use tracing::debug;

use crate::domain::{CurveFit, CurveKind, LogisticOptions, StandardLevelInput};
use crate::fit::{fit_4pl, fit_polynomial};
use crate::math::mean;

/// Fit `kind` to raw `(conc, y)` points.
pub fn fit_curve(kind: CurveKind, x: &[f64], y: &[f64], opts: &LogisticOptions) -> Option<CurveFit> {
    match kind.degree() {
        Some(degree) => fit_polynomial(x, y, degree).map(CurveFit::Polynomial),
        None => fit_4pl(x, y, opts).map(CurveFit::FourPl),
    }
}

/// `(conc, mean response)` for every usable level, in input order.
pub fn level_means(levels: &[StandardLevelInput]) -> (Vec<f64>, Vec<f64>) {
    levels
        .iter()
        .filter(|l| l.is_usable())
        .filter_map(|l| {
            let ys: Vec<f64> = l.replicates.iter().map(|r| r.y).collect();
            mean(&ys).map(|m| (l.conc, m))
        })
        .unzip()
}

/// Fit the standard curve over level means. `None` when too few usable levels
/// remain or the fitter fails.
pub fn fit_standard_curve(
    levels: &[StandardLevelInput],
    kind: CurveKind,
    opts: &LogisticOptions,
) -> Option<CurveFit> {
    let (x, y) = level_means(levels);
    if x.len() < kind.min_points() {
        debug!(
            levels = x.len(),
            required = kind.min_points(),
            curve = kind.display_name(),
            "not enough usable standard levels"
        );
        return None;
    }
    let fit = fit_curve(kind, &x, &y, opts);
    if fit.is_none() {
        debug!(curve = kind.display_name(), "standard curve fit failed");
    }
    fit
}

/// `[min, max]` nominal concentration over the usable levels.
pub fn standard_range(levels: &[StandardLevelInput]) -> Option<(f64, f64)> {
    let (x, _) = level_means(levels);
    let lo = x.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (lo.is_finite() && hi.is_finite()).then_some((lo, hi))
}
