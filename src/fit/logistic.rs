//! 4-parameter logistic (4PL) standard curves.
//!
//! Model, in log-concentration space `t = log10(x)`:
//!
//! ```text
//! y = A + (D - A) / (1 + 10^((C - t)·B))
//! ```
//!
//! We fit by Levenberg–Marquardt over the internal vector `p = [A, D, C, b]`
//! with `B = exp(b)`, which keeps the Hill slope positive without a
//! constrained optimizer. The direction of the curve (rising or falling) is
//! carried by the ordering of `A` and `D`.
//!
//! Numerical notes:
//! - The Jacobian uses central differences with a *relative* step
//!   `1e-4·(|p_k| + 1)`; asymptotes and log-EC50 live on very different scales.
//! - After every step `C` is clamped to the observed log range ±2 decades and
//!   `b` to `[-4, 4]` (B ∈ [0.018, 54.6]).
//! - Sigmoid fits have local minima, so we restart from several Hill-slope
//!   seeds and keep the lowest SSE.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::domain::{LogisticFit, LogisticOptions, LogisticParams};
use crate::math::{mean, r2_score, solve_linear_system, sse};
use crate::models::eval_4pl_log_x;

/// Hill-slope seeds, in the order they are tried.
const SLOPE_SEEDS: [f64; 4] = [0.6, 1.0, 1.8, 3.0];
/// Bound on `b = ln(B)`.
const LOG_SLOPE_BOUND: f64 = 4.0;
/// Decades allowed for `C` beyond the observed concentrations.
const C_MARGIN: f64 = 2.0;
const JAC_REL_STEP: f64 = 1e-4;
const LAMBDA_DOWN: f64 = 0.35;
const LAMBDA_UP: f64 = 10.0;
const LAMBDA_MAX: f64 = 1e12;
const N_PARAMS: usize = 4;

type Internal = [f64; N_PARAMS];

#[derive(Debug, Clone, Copy)]
struct Bounds {
    c_min: f64,
    c_max: f64,
}

impl Bounds {
    fn clamp(&self, p: &mut Internal) {
        p[2] = p[2].clamp(self.c_min, self.c_max);
        p[3] = p[3].clamp(-LOG_SLOPE_BOUND, LOG_SLOPE_BOUND);
    }
}

/// Fit a 4PL to concentration/response pairs.
///
/// Only pairs with finite `x > 0` and finite `y` are used; fewer than four
/// such pairs gives `None`, as does a run where no seed produces a finite SSE.
pub fn fit_4pl(x_conc: &[f64], y: &[f64], opts: &LogisticOptions) -> Option<LogisticFit> {
    let (lx, ys): (Vec<f64>, Vec<f64>) = x_conc
        .iter()
        .zip(y)
        .filter(|(x, y)| x.is_finite() && **x > 0.0 && y.is_finite())
        .map(|(x, y)| (x.log10(), *y))
        .unzip();

    if lx.len() < N_PARAMS {
        return None;
    }

    let lx_min = lx.iter().copied().fold(f64::INFINITY, f64::min);
    let lx_max = lx.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let bounds = Bounds {
        c_min: lx_min - C_MARGIN,
        c_max: lx_max + C_MARGIN,
    };

    let (a0, d0, c0) = initial_guess(&lx, &ys);
    let n_seeds = opts.restarts.saturating_add(1).min(SLOPE_SEEDS.len());

    // Deterministic selection: lowest SSE, ties keep the earlier seed.
    let mut best: Option<(Internal, f64)> = None;
    for &slope in &SLOPE_SEEDS[..n_seeds] {
        let p0 = [a0, d0, c0, slope.ln()];
        let Some((p, cost)) = levenberg_marquardt(&lx, &ys, p0, bounds, opts) else {
            continue;
        };
        if best.as_ref().is_none_or(|(_, c)| cost < *c) {
            best = Some((p, cost));
        }
    }

    let Some((p, _)) = best else {
        debug!(n = lx.len(), "4PL fit produced no finite candidate");
        return None;
    };

    let params = to_params(&p);
    let y_hat: Vec<f64> = lx.iter().map(|&t| eval_4pl_log_x(&params, t)).collect();
    Some(LogisticFit {
        params,
        r2: r2_score(&ys, &y_hat),
        sse: sse(&ys, &y_hat),
        n: lx.len(),
    })
}

/// Closed-form inverse of the 4PL, restricted to `[min_conc, max_conc]`.
///
/// `None` when `y` is at or beyond an asymptote, the logistic ratio is not
/// positive, or the concentration falls outside the range.
pub fn invert_4pl(params: &LogisticParams, y: f64, min_conc: f64, max_conc: f64) -> Option<f64> {
    if !y.is_finite() {
        return None;
    }
    let LogisticParams { a, d, c, b } = *params;
    if y <= a.min(d) || y >= a.max(d) {
        return None;
    }

    let ratio = (d - a) / (y - a) - 1.0;
    if !(ratio.is_finite() && ratio > 0.0) {
        return None;
    }

    let x = 10f64.powf(c - ratio.log10() / b);
    if !(x.is_finite() && x >= min_conc && x <= max_conc) {
        return None;
    }
    Some(x)
}

fn to_params(p: &Internal) -> LogisticParams {
    LogisticParams {
        a: p[0],
        d: p[1],
        c: p[2],
        b: p[3].exp(),
    }
}

fn predict(p: &Internal, t: f64) -> f64 {
    eval_4pl_log_x(&to_params(p), t)
}

fn cost(p: &Internal, lx: &[f64], y: &[f64]) -> f64 {
    lx.iter()
        .zip(y)
        .map(|(&t, &yi)| {
            let r = yi - predict(p, t);
            r * r
        })
        .sum()
}

/// Seed `(A0, D0, C0)` from the data.
///
/// Rising data (non-negative covariance of `log10 x` and `y`) starts at the
/// minimum response; falling data at the maximum.
fn initial_guess(lx: &[f64], y: &[f64]) -> (f64, f64, f64) {
    let lx_mean = mean(lx).unwrap_or(0.0);
    let y_mean = mean(y).unwrap_or(0.0);
    let cov: f64 = lx.iter().zip(y).map(|(t, v)| (t - lx_mean) * (v - y_mean)).sum();

    let y_min = y.iter().copied().fold(f64::INFINITY, f64::min);
    let y_max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (a0, d0) = if cov >= 0.0 { (y_min, y_max) } else { (y_max, y_min) };

    let mid = (a0 + d0) / 2.0;
    let mut c0 = lx[0];
    let mut best_gap = f64::INFINITY;
    for (&t, &v) in lx.iter().zip(y) {
        let gap = (v - mid).abs();
        if gap < best_gap {
            best_gap = gap;
            c0 = t;
        }
    }

    (a0, d0, c0)
}

/// Build `JᵀJ` and `Jᵀr` at `p` (numerical Jacobian of the model).
fn normal_equations(p: &Internal, lx: &[f64], y: &[f64]) -> (DMatrix<f64>, DVector<f64>) {
    let n = lx.len();
    let mut jac = DMatrix::<f64>::zeros(n, N_PARAMS);
    for k in 0..N_PARAMS {
        let h = JAC_REL_STEP * (p[k].abs() + 1.0);
        let mut up = *p;
        let mut down = *p;
        up[k] += h;
        down[k] -= h;
        for (i, &t) in lx.iter().enumerate() {
            jac[(i, k)] = (predict(&up, t) - predict(&down, t)) / (2.0 * h);
        }
    }

    let r = DVector::from_iterator(n, lx.iter().zip(y).map(|(&t, &yi)| yi - predict(p, t)));
    let jt = jac.transpose();
    (&jt * &jac, &jt * r)
}

/// One Levenberg–Marquardt run from `p0`. Returns the final point and its SSE.
fn levenberg_marquardt(
    lx: &[f64],
    y: &[f64],
    mut p: Internal,
    bounds: Bounds,
    opts: &LogisticOptions,
) -> Option<(Internal, f64)> {
    bounds.clamp(&mut p);
    let mut current = cost(&p, lx, y);
    if !current.is_finite() {
        return None;
    }

    let mut lambda = opts.lambda0.abs();
    // Normal equations are only rebuilt after an accepted step.
    let mut system: Option<(DMatrix<f64>, DVector<f64>)> = None;

    for _ in 0..opts.max_iter {
        if current <= f64::EPSILON * f64::EPSILON {
            break;
        }
        let (jtj, jtr) = system.get_or_insert_with(|| normal_equations(&p, lx, y));

        let mut damped = jtj.clone();
        for i in 0..N_PARAMS {
            damped[(i, i)] += lambda;
        }

        let Some(delta) = solve_linear_system(&damped, jtr) else {
            lambda *= LAMBDA_UP;
            if lambda > LAMBDA_MAX {
                break;
            }
            continue;
        };

        let mut trial = p;
        for (k, v) in trial.iter_mut().enumerate() {
            *v += delta[k];
        }
        bounds.clamp(&mut trial);
        let trial_cost = cost(&trial, lx, y);

        if trial_cost.is_finite() && trial_cost < current {
            p = trial;
            current = trial_cost;
            lambda *= LAMBDA_DOWN;
            system = None;
            if delta.norm() < opts.tol {
                break;
            }
        } else {
            lambda *= LAMBDA_UP;
            if lambda > LAMBDA_MAX {
                break;
            }
        }
    }

    Some((p, current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::eval_4pl;
    use approx::assert_abs_diff_eq;

    fn dilution_series(top: f64, factor: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| top / factor.powi(i as i32)).collect()
    }

    #[test]
    fn recovers_noiseless_rising_curve() {
        let truth = LogisticParams {
            a: 0.05,
            d: 2.4,
            c: 40f64.log10(),
            b: 1.1,
        };
        let x = dilution_series(500.0, 2.0, 9);
        let y: Vec<f64> = x.iter().map(|&v| eval_4pl(&truth, v)).collect();

        let fit = fit_4pl(&x, &y, &LogisticOptions::default()).unwrap();
        assert_eq!(fit.n, 9);
        assert_abs_diff_eq!(fit.r2, 1.0, epsilon = 1e-6);
        for (&xi, &yi) in x.iter().zip(&y) {
            assert_abs_diff_eq!(eval_4pl(&fit.params, xi), yi, epsilon = 1e-3);
        }
        assert!(fit.params.b > 0.0);
    }

    #[test]
    fn recovers_falling_curve() {
        // Competitive formats: signal drops with concentration.
        let truth = LogisticParams {
            a: 1.9,
            d: 0.12,
            c: 1.0,
            b: 0.9,
        };
        let x = dilution_series(1000.0, 3.0, 8);
        let y: Vec<f64> = x.iter().map(|&v| eval_4pl(&truth, v)).collect();

        let fit = fit_4pl(&x, &y, &LogisticOptions::default()).unwrap();
        assert_abs_diff_eq!(fit.r2, 1.0, epsilon = 1e-6);
        assert!(fit.params.a > fit.params.d);
    }

    #[test]
    fn slope_seeds_start_shallow() {
        assert_eq!(SLOPE_SEEDS, [0.6, 1.0, 1.8, 3.0]);

        // With no restarts only the 0.6 seed runs.
        let truth = LogisticParams {
            a: 0.1,
            d: 2.0,
            c: 50f64.log10(),
            b: 0.6,
        };
        let x = dilution_series(2000.0, 3.0, 9);
        let y: Vec<f64> = x.iter().map(|&v| eval_4pl(&truth, v)).collect();
        let opts = LogisticOptions {
            restarts: 0,
            ..LogisticOptions::default()
        };
        let fit = fit_4pl(&x, &y, &opts).unwrap();
        assert_abs_diff_eq!(fit.r2, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn requires_four_positive_points() {
        let opts = LogisticOptions::default();
        assert!(fit_4pl(&[1.0, 2.0, 4.0], &[0.1, 0.2, 0.4], &opts).is_none());
        // Zero/negative concentrations cannot be placed on a log axis.
        assert!(fit_4pl(&[0.0, -1.0, 2.0, 4.0, 8.0], &[0.1, 0.1, 0.2, 0.4, 0.8], &opts).is_none());
    }

    #[test]
    fn inversion_roundtrip() {
        let p = LogisticParams {
            a: 0.08,
            d: 2.2,
            c: 1.5,
            b: 1.4,
        };
        for &x in &[2.0, 10.0, 31.6, 75.0, 180.0] {
            let y = eval_4pl(&p, x);
            let back = invert_4pl(&p, y, 1.0, 250.0).unwrap();
            assert_abs_diff_eq!(back, x, epsilon = 1e-3);
        }
    }

    #[test]
    fn inversion_rejects_asymptotes_and_range() {
        let p = LogisticParams {
            a: 0.1,
            d: 2.0,
            c: 1.0,
            b: 1.0,
        };
        assert!(invert_4pl(&p, 0.1, 0.0, 1e9).is_none());
        assert!(invert_4pl(&p, 2.5, 0.0, 1e9).is_none());
        assert!(invert_4pl(&p, 0.05, 0.0, 1e9).is_none());
        // y at the EC50 → x = 10, outside [20, 100].
        assert!(invert_4pl(&p, 1.05, 20.0, 100.0).is_none());
        assert_abs_diff_eq!(invert_4pl(&p, 1.05, 1.0, 100.0).unwrap(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn constant_response_is_finite_with_undefined_r2() {
        let x = dilution_series(100.0, 2.0, 6);
        let y = vec![0.5; 6];
        let fit = fit_4pl(&x, &y, &LogisticOptions::default()).unwrap();
        assert!(fit.sse.is_finite());
        assert!(fit.r2.is_nan());
    }
}
