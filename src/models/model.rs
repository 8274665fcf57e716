//! Model evaluation for the polynomial and 4PL standard curves.
//!
//! The fitters and the orchestrator rely on two primitive operations:
//! - predict absorbance for a concentration (residuals, plotting grids)
//! - back-calculate a concentration from an absorbance (quantification)
//!
//! Both are dispatched over the `CurveFit` sum type here.

use std::f64::consts::LN_10;

use crate::domain::{CurveFit, CurveKind, FitSummary, LogisticParams};
use crate::fit::{invert_4pl, invert_poly_by_search};

/// Bound on the exponent of `10^t` inside the logistic term.
const MAX_EXPONENT: f64 = 60.0;

/// Evaluate `Σ coeff[i]·x^i` (Horner, coefficients low to high).
pub fn eval_poly(coeff: &[f64], x: f64) -> f64 {
    coeff.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// Evaluate the 4PL at concentration `x`.
pub fn eval_4pl(params: &LogisticParams, x: f64) -> f64 {
    eval_4pl_log_x(params, x.log10())
}

/// Evaluate the 4PL at `log_x = log10(x)`.
///
/// `10^t` is computed as `exp(t·ln10)` with `t` clamped to `[-60, 60]` so the
/// denominator never overflows.
pub fn eval_4pl_log_x(params: &LogisticParams, log_x: f64) -> f64 {
    let t = ((params.c - log_x) * params.b).clamp(-MAX_EXPONENT, MAX_EXPONENT);
    params.a + (params.d - params.a) / (1.0 + (t * LN_10).exp())
}

impl CurveFit {
    pub fn kind(&self) -> CurveKind {
        match self {
            CurveFit::Polynomial(p) if p.degree == 3 => CurveKind::Poly3,
            CurveFit::Polynomial(_) => CurveKind::Poly2,
            CurveFit::FourPl(_) => CurveKind::FourPl,
        }
    }

    pub fn r2(&self) -> f64 {
        match self {
            CurveFit::Polynomial(p) => p.r2,
            CurveFit::FourPl(l) => l.r2,
        }
    }

    pub fn sse(&self) -> f64 {
        match self {
            CurveFit::Polynomial(p) => p.sse,
            CurveFit::FourPl(l) => l.sse,
        }
    }

    /// Number of points the curve was fitted on.
    pub fn n(&self) -> usize {
        match self {
            CurveFit::Polynomial(p) => p.n,
            CurveFit::FourPl(l) => l.n,
        }
    }

    pub fn summary(&self) -> FitSummary {
        FitSummary {
            r2: self.r2(),
            sse: self.sse(),
            n_levels: self.n(),
        }
    }

    /// Predicted absorbance at concentration `x`.
    pub fn predict(&self, x: f64) -> f64 {
        match self {
            CurveFit::Polynomial(p) => eval_poly(&p.coeff, x),
            CurveFit::FourPl(l) => eval_4pl(&l.params, x),
        }
    }

    /// Concentration producing absorbance `y`, restricted to `[min_conc, max_conc]`.
    pub fn invert(&self, y: f64, min_conc: f64, max_conc: f64) -> Option<f64> {
        match self {
            CurveFit::Polynomial(p) => invert_poly_by_search(&p.coeff, y, min_conc, max_conc),
            CurveFit::FourPl(l) => invert_4pl(&l.params, y, min_conc, max_conc),
        }
    }
}
