//! Least-squares polynomial standard curves.
//!
//! Given concentrations `x_i` and responses `y_i` we solve the normal
//! equations over the monomial basis `{1, x, …, x^d}`:
//!
//! ```text
//! Σ_j (Σ_i x_i^(j+k)) β_j = Σ_i x_i^k y_i        k = 0..=d
//! ```
//!
//! The moment matrix is built by direct summation and solved with
//! `math::solve_linear_system`. Inversion is done by search rather than in
//! closed form: cubics need not be monotone and have no convenient inverse.

use nalgebra::{DMatrix, DVector};

use crate::domain::PolynomialFit;
use crate::math::{r2_score, solve_linear_system, sse};
use crate::models::eval_poly;

/// Uniform scan resolution of the inversion search.
const SCAN_STEPS: usize = 600;
/// Halving iterations after the scan.
const REFINE_ITERS: usize = 28;

/// Fit a degree-`degree` polynomial to the finite `(x, y)` pairs.
///
/// Returns `None` with fewer than `degree + 1` finite pairs or when the
/// normal equations are singular (e.g. all `x` equal).
pub fn fit_polynomial(x: &[f64], y: &[f64], degree: usize) -> Option<PolynomialFit> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .unzip();

    let k = degree + 1;
    if xs.len() < k {
        return None;
    }

    // Power moments Σ x^p for p = 0..=2d, and Σ x^p·y for p = 0..=d.
    let mut moments = vec![0.0; 2 * degree + 1];
    let mut rhs = DVector::<f64>::zeros(k);
    for (&xi, &yi) in xs.iter().zip(&ys) {
        let mut pow = 1.0;
        for (p, m) in moments.iter_mut().enumerate() {
            *m += pow;
            if p < k {
                rhs[p] += pow * yi;
            }
            pow *= xi;
        }
    }

    let normal = DMatrix::from_fn(k, k, |i, j| moments[i + j]);
    let beta = solve_linear_system(&normal, &rhs)?;
    let coeff: Vec<f64> = beta.iter().copied().collect();

    let y_hat: Vec<f64> = xs.iter().map(|&xi| eval_poly(&coeff, xi)).collect();
    Some(PolynomialFit {
        degree,
        r2: r2_score(&ys, &y_hat),
        sse: sse(&ys, &y_hat),
        n: xs.len(),
        coeff,
    })
}

/// Find `x ∈ [min_x, max_x]` whose prediction is closest to `y`.
///
/// A coarse uniform scan picks the best grid point; the step is then halved
/// `REFINE_ITERS` times, moving to whichever neighbour improves the squared
/// error. The result always lies inside the range. Not a global optimum for
/// non-monotone curves beyond the scan resolution.
pub fn invert_poly_by_search(coeff: &[f64], y: f64, min_x: f64, max_x: f64) -> Option<f64> {
    if !(y.is_finite() && min_x.is_finite() && max_x.is_finite()) || max_x <= min_x {
        return None;
    }
    if coeff.iter().any(|c| !c.is_finite()) {
        return None;
    }

    let err = |x: f64| {
        let r = eval_poly(coeff, x) - y;
        r * r
    };

    let step0 = (max_x - min_x) / SCAN_STEPS as f64;
    let mut best_x = min_x;
    let mut best_err = err(min_x);
    for i in 1..=SCAN_STEPS {
        let x = if i == SCAN_STEPS { max_x } else { min_x + step0 * i as f64 };
        let e = err(x);
        if e < best_err {
            best_err = e;
            best_x = x;
        }
    }

    let mut step = step0 / 2.0;
    for _ in 0..REFINE_ITERS {
        let lo = (best_x - step).max(min_x);
        let hi = (best_x + step).min(max_x);
        let (e_lo, e_hi) = (err(lo), err(hi));
        if e_lo < best_err && e_lo <= e_hi {
            best_x = lo;
            best_err = e_lo;
        } else if e_hi < best_err {
            best_x = hi;
            best_err = e_hi;
        }
        step /= 2.0;
    }

    best_x.is_finite().then_some(best_x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn recovers_exact_quadratic() {
        let c = [0.05, 0.8, -0.06];
        let x: Vec<f64> = vec![0.0, 0.5, 1.0, 2.0, 3.0, 4.0];
        let y: Vec<f64> = x.iter().map(|&v| eval_poly(&c, v)).collect();

        let fit = fit_polynomial(&x, &y, 2).unwrap();
        assert_eq!(fit.degree, 2);
        assert_eq!(fit.n, 6);
        for (a, b) in fit.coeff.iter().zip(c.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
        assert_relative_eq!(fit.r2, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn too_few_points_or_degenerate_x() {
        assert!(fit_polynomial(&[1.0, 2.0], &[1.0, 2.0], 2).is_none());
        assert!(fit_polynomial(&[2.0; 5], &[1.0, 2.0, 3.0, 4.0, 5.0], 2).is_none());
        // Non-finite pairs do not count toward the minimum.
        assert!(fit_polynomial(&[1.0, 2.0, f64::NAN], &[1.0, 2.0, 3.0], 2).is_none());
    }

    #[test]
    fn search_rejects_bad_range() {
        assert!(invert_poly_by_search(&[0.0, 1.0], 0.5, 1.0, 1.0).is_none());
        assert!(invert_poly_by_search(&[0.0, 1.0], f64::NAN, 0.0, 1.0).is_none());
        assert!(invert_poly_by_search(&[0.0, 1.0], 0.5, 0.0, f64::INFINITY).is_none());
    }

    #[test]
    fn search_clamps_to_range() {
        // y = x; asking for 5 within [0, 1] pins to the upper bound.
        let x = invert_poly_by_search(&[0.0, 1.0], 5.0, 0.0, 1.0).unwrap();
        assert_relative_eq!(x, 1.0);
    }

    proptest! {
        #[test]
        fn search_inverts_monotone_cubics(
            c0 in -1.0..1.0f64,
            c1 in 0.05..2.0f64,
            c2 in 0.0..0.1f64,
            c3 in 0.0..0.01f64,
            x in 0.5..9.5f64,
        ) {
            let c = [c0, c1, c2, c3];
            let got = invert_poly_by_search(&c, eval_poly(&c, x), 0.0, 10.0).unwrap();
            prop_assert!((got - x).abs() < 1e-2, "expected {x}, got {got}");
        }
    }
}
