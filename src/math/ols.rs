//! Linear least squares for component amplitudes.
//!
//! With centres and dispersions held fixed, a Gaussian mixture is linear in
//! its amplitudes:
//!
//! ```text
//! minimize Σ_i (y_i - Σ_j A_j g_j(v_i))^2
//! ```
//!
//! The grid fitter solves this many times per spectrum, once per candidate
//! centre/width tuple.
//!
//! Implementation choices:
//! - SVD, so tall design matrices (many channels, few components) are handled
//!   and nearly collinear columns (two components on top of each other) do not
//!   panic.
//! - Columns are tiny (one per component), so SVD cost is negligible next to
//!   building the design matrix.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    if x.nrows() == 0 || x.ncols() == 0 || x.nrows() != y.len() {
        return None;
    }
    let svd = x.clone().svd(true, true);

    // Progressively looser tolerances: overlapping components produce nearly
    // collinear columns.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let x = DMatrix::<f64>::zeros(3, 1);
        let y = DVector::<f64>::zeros(2);
        assert!(solve_least_squares(&x, &y).is_none());
    }
}
