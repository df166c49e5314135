//! Whitened linear least squares.
//!
//! Every linear problem in the fitter has the form:
//!
//! ```text
//! minimize || A β - b ||^2
//! ```
//!
//! where rows were already multiplied by the data whitening transform, so the
//! plain Euclidean norm is the covariance-weighted chi-square.
//!
//! Implementation choices:
//! - SVD rather than normal equations, so the conditioning of `A` is not
//!   squared (whitened rows can be scaled by 1e6 or more for nearly exact data).
//! - Singular values are cut relative to the largest one, which keeps the
//!   solve independent of the overall scale of `A`.
//! - Nalgebra's `QR::solve` is for square systems and panics on tall
//!   matrices, so it is not used here.

use nalgebra::{DMatrix, DVector};

/// Relative singular-value cut used for the parameter covariance.
const COVARIANCE_RCOND: f64 = 1e-13;

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is empty, not finite, or too ill-conditioned
/// to give a finite solution at any of the tried cuts.
pub fn solve_least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    if a.ncols() == 0 || a.nrows() != b.len() {
        return None;
    }
    if a.iter().any(|v| !v.is_finite()) || b.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let svd = a.clone().svd(true, true);
    let s_max = svd.singular_values.max();
    if !(s_max.is_finite() && s_max > 0.0) {
        return None;
    }

    // Try progressively looser cuts if the strict solve is not finite.
    for &rcond in &[1e-14, 1e-10, 1e-6] {
        if let Ok(beta) = svd.solve(b, rcond * s_max) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// `(Aᵀ A)⁻¹` via the SVD of `A`, plus the numerical rank of `A`.
///
/// Directions with singular values below the relative cut are dropped
/// (pseudo-inverse), so a rank-deficient design yields zero variance along
/// the unidentified directions instead of infinities. Callers compare the
/// rank with `A.ncols()` to detect that case.
pub fn normal_covariance(a: &DMatrix<f64>) -> Option<(DMatrix<f64>, usize)> {
    if a.ncols() == 0 || a.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let svd = a.clone().svd(false, true);
    let v_t = svd.v_t?;
    let s = &svd.singular_values;
    let s_max = s.max();
    if !(s_max.is_finite() && s_max > 0.0) {
        return None;
    }

    let cut = COVARIANCE_RCOND * s_max;
    let inv_sq = DVector::from_iterator(
        s.len(),
        s.iter().map(|&si| if si > cut { 1.0 / (si * si) } else { 0.0 }),
    );
    let rank = s.iter().filter(|&&si| si > cut).count();

    let scaled = DMatrix::from_diagonal(&inv_sq) * &v_t;
    let cov = v_t.transpose() * scaled;
    Some((symmetrize(cov), rank))
}

/// `(M + Mᵀ) / 2`.
pub fn symmetrize(m: DMatrix<f64>) -> DMatrix<f64> {
    let t = m.transpose();
    (m + t) * 0.5
}
