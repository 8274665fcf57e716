//! Small descriptive statistics used by the fitters and the orchestrator.
//!
//! All helpers skip non-finite values so a single bad well cannot poison a
//! whole group.

use std::cmp::Ordering;

/// Median of the finite values, or `None` if there are none.
///
/// Even counts average the two central values.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        Some(v[mid])
    } else {
        Some((v[mid - 1] + v[mid]) / 2.0)
    }
}

/// Arithmetic mean of the finite values.
pub fn mean(values: &[f64]) -> Option<f64> {
    let (sum, n) = values
        .iter()
        .filter(|x| x.is_finite())
        .fold((0.0, 0usize), |(s, n), &x| (s + x, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Sample standard deviation (n-1 denominator); `None` when fewer than two values.
pub fn sample_sd(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if finite.len() <= 1 {
        return None;
    }
    let m = mean(&finite)?;
    let ss: f64 = finite.iter().map(|x| (x - m) * (x - m)).sum();
    Some((ss / (finite.len() as f64 - 1.0)).sqrt())
}

/// Sum of squared residuals `Σ (y - ŷ)²`.
pub fn sse(y: &[f64], y_hat: &[f64]) -> f64 {
    y.iter().zip(y_hat).map(|(a, b)| (a - b) * (a - b)).sum()
}

/// Coefficient of determination `1 - SSres/SStot`.
///
/// Returns NaN when all `y` are identical (`SStot = 0`): fit quality is
/// undefined there, which is different from a failed fit.
pub fn r2_score(y: &[f64], y_hat: &[f64]) -> f64 {
    let Some(y_mean) = mean(y) else {
        return f64::NAN;
    };
    let ss_tot: f64 = y.iter().map(|v| (v - y_mean) * (v - y_mean)).sum();
    if ss_tot == 0.0 {
        return f64::NAN;
    }
    1.0 - sse(y, y_hat) / ss_tot
}
