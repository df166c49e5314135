//! Covariance whitening.
//!
//! The fit objective is `rᵀ C⁻¹ r` with the dataset's full covariance `C`.
//! We factor `C⁻¹ = Wᵀ W` once per fit and work with whitened residuals
//! `W r`, so every inner solve is an ordinary least squares problem.
//!
//! Two factorizations are supported:
//! - strict: Cholesky `C = L Lᵀ`, `W = L⁻¹`. Fails when `C` is not positive
//!   definite.
//! - svd cut: with `D` the per-point sdevs, the correlation `R = D⁻¹ C D⁻¹ =
//!   V Λ Vᵀ` has its eigenvalues below `cut * λ_max` raised to that floor, and
//!   `W = Λ^{-1/2} Vᵀ D⁻¹`. Working on `R` keeps the cut independent of the
//!   units of each point. Points with zero variance keep unit scale, so a
//!   covariance that is exactly zero (data generated without noise) uses the
//!   absolute floor `cut`.

use log::{debug, warn};
use nalgebra::{Cholesky, DMatrix, DVector, SymmetricEigen};

use crate::error::{Error, Result};

/// `W` with `Wᵀ W = C⁻¹` for the (possibly conditioned) data covariance.
#[derive(Debug, Clone)]
pub struct Whitening {
    transform: DMatrix<f64>,
    log_det: f64,
    modified: usize,
}

impl Whitening {
    pub fn new(covariance: &DMatrix<f64>, svd_cut: Option<f64>) -> Result<Self> {
        let n = covariance.nrows();
        if n == 0 || covariance.ncols() != n {
            return Err(Error::SingularCovariance(format!(
                "covariance must be square and non-empty, got {}x{}",
                covariance.nrows(),
                covariance.ncols()
            )));
        }
        if covariance.iter().any(|v| !v.is_finite()) {
            return Err(Error::SingularCovariance("covariance has non-finite entries".into()));
        }

        match svd_cut {
            None => Self::cholesky(covariance),
            Some(cut) => Self::eigen_cut(covariance, cut),
        }
    }

    fn cholesky(covariance: &DMatrix<f64>) -> Result<Self> {
        let n = covariance.nrows();
        let chol = Cholesky::new(covariance.clone()).ok_or_else(|| {
            Error::SingularCovariance("covariance is not positive definite".into())
        })?;
        let l = chol.l();
        let transform = l
            .solve_lower_triangular(&DMatrix::identity(n, n))
            .ok_or_else(|| Error::SingularCovariance("Cholesky factor is singular".into()))?;
        let log_det = 2.0 * l.diagonal().iter().map(|d| d.ln()).sum::<f64>();
        if !log_det.is_finite() || transform.iter().any(|v| !v.is_finite()) {
            return Err(Error::SingularCovariance("covariance is numerically singular".into()));
        }

        debug!("whitening by Cholesky over {n} points");
        Ok(Self {
            transform,
            log_det,
            modified: 0,
        })
    }

    fn eigen_cut(covariance: &DMatrix<f64>, cut: f64) -> Result<Self> {
        let n = covariance.nrows();
        let scale = DVector::from_iterator(
            n,
            covariance.diagonal().iter().map(|&v| if v > 0.0 { v.sqrt() } else { 1.0 }),
        );
        let correlation = DMatrix::from_fn(n, n, |i, j| covariance[(i, j)] / (scale[i] * scale[j]));

        let eigen = SymmetricEigen::new(correlation);
        let lambda_max = eigen.eigenvalues.max();
        let floor = if lambda_max > 0.0 { cut * lambda_max } else { cut };

        let mut modified = 0;
        let conditioned: Vec<f64> = eigen
            .eigenvalues
            .iter()
            .map(|&l| {
                if l < floor {
                    modified += 1;
                    floor
                } else {
                    l
                }
            })
            .collect();

        if modified > 0 {
            if lambda_max > 0.0 {
                warn!(
                    "svd cut {cut:e} raised {modified} of {n} correlation eigenvalues to {floor:e}"
                );
            } else {
                debug!("covariance is zero; using absolute floor {floor:e}");
            }
        }

        let inv_sqrt = DVector::from_iterator(n, conditioned.iter().map(|l| 1.0 / l.sqrt()));
        let inv_scale = scale.map(|s| 1.0 / s);
        let transform = DMatrix::from_diagonal(&inv_sqrt)
            * eigen.eigenvectors.transpose()
            * DMatrix::from_diagonal(&inv_scale);
        let log_det = conditioned.iter().map(|l| l.ln()).sum::<f64>()
            + 2.0 * scale.iter().map(|s| s.ln()).sum::<f64>();
        if !log_det.is_finite() || transform.iter().any(|v| !v.is_finite()) {
            return Err(Error::SingularCovariance(
                "covariance could not be conditioned".into(),
            ));
        }

        Ok(Self {
            transform,
            log_det,
            modified,
        })
    }

    /// `W v`.
    pub fn whiten(&self, v: &DVector<f64>) -> DVector<f64> {
        &self.transform * v
    }

    /// `W M`.
    pub fn whiten_matrix(&self, m: &DMatrix<f64>) -> DMatrix<f64> {
        &self.transform * m
    }

    /// `ln det C` of the covariance actually used.
    pub fn log_det(&self) -> f64 {
        self.log_det
    }

    /// Number of eigenvalues raised by the svd cut.
    pub fn modified(&self) -> usize {
        self.modified
    }
}
