//! Dense linear solver for the small normal-equation systems of the fitters.
//!
//! Both fitters reduce each step to a square system `A·x = b` with at most four
//! unknowns (4PL) or `degree + 1` unknowns (polynomial):
//!
//! ```text
//! (XᵀX) β = Xᵀy                  polynomial least squares
//! (JᵀJ + λI) δ = Jᵀr             Levenberg–Marquardt step
//! ```
//!
//! Implementation choices:
//! - Gauss–Jordan elimination with partial pivoting on an augmented copy.
//! - A pivot below `PIVOT_EPS` means the system is (numerically) singular;
//!   we report `None` instead of returning a garbage solution. Callers read
//!   that as "no fit possible for these inputs".

use nalgebra::{DMatrix, DVector};

/// Smallest pivot magnitude accepted during elimination.
pub const PIVOT_EPS: f64 = 1e-12;

/// Solve the square system `a · x = b`.
///
/// Returns `None` for mismatched shapes, non-finite results, or a pivot below
/// [`PIVOT_EPS`].
pub fn solve_linear_system(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let n = a.nrows();
    if n == 0 || a.ncols() != n || b.len() != n {
        return None;
    }

    // Augmented matrix [A | b].
    let mut m = DMatrix::<f64>::zeros(n, n + 1);
    m.view_mut((0, 0), (n, n)).copy_from(a);
    m.set_column(n, b);

    for col in 0..n {
        // Partial pivoting: bring the largest remaining entry onto the diagonal.
        let (offset, pivot_abs) = m
            .view((col, col), (n - col, 1))
            .iter()
            .map(|v| v.abs())
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });
        if !(pivot_abs >= PIVOT_EPS) {
            return None;
        }
        let pivot_row = col + offset;
        if pivot_row != col {
            m.swap_rows(col, pivot_row);
        }

        let pivot = m[(col, col)];
        for j in col..=n {
            m[(col, j)] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = m[(row, col)];
            if factor == 0.0 {
                continue;
            }
            for j in col..=n {
                m[(row, j)] -= factor * m[(col, j)];
            }
        }
    }

    let x = m.column(n).into_owned();
    x.iter().all(|v| v.is_finite()).then_some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn solves_small_system_needing_a_pivot() {
        // First pivot is zero without row exchange.
        let a = DMatrix::from_row_slice(3, 3, &[0.0, 2.0, 1.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let x_true = DVector::from_row_slice(&[1.0, -2.0, 3.0]);
        let b = &a * &x_true;

        let x = solve_linear_system(&a, &b).unwrap();
        for i in 0..3 {
            assert_relative_eq!(x[i], x_true[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn singular_system_is_none() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let b = DVector::from_row_slice(&[1.0, 2.0]);
        assert!(solve_linear_system(&a, &b).is_none());
    }

    #[test]
    fn shape_mismatch_is_none() {
        let a = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let b = DVector::from_row_slice(&[1.0, 2.0]);
        assert!(solve_linear_system(&a, &b).is_none());
    }
}
