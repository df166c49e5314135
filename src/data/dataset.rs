//! Reduce repeated samples to one dataset with a full covariance.
//!
//! For `N` draws `y_d` over `n` points:
//!
//! ```text
//! m_i  = (1/N) Σ_d y_di
//! C_ij = Σ_d (y_di - m_i)(y_dj - m_j) / (N (N - 1))
//! ```
//!
//! `C` is the covariance of the *mean*, not of a single draw. Off-diagonal
//! entries are kept even though draws are uncorrelated across points: with a
//! finite sample the estimated means are correlated, and the fitter weights by
//! the full matrix.

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::domain::{correlation_of, sdev_of};
use crate::error::{Error, Result};

/// Central values and covariance over the grid dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedDataset {
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
    sample_count: usize,
}

impl ObservedDataset {
    /// Dataset from an explicit mean and covariance.
    ///
    /// `sample_count` is informational; pass 0 when the dataset did not come
    /// from averaging.
    pub fn from_parts(mean: Vec<f64>, covariance: DMatrix<f64>, sample_count: usize) -> Result<Self> {
        let n = mean.len();
        if n == 0 {
            return Err(Error::DimensionMismatch {
                what: "data points",
                expected: 1,
                actual: 0,
            });
        }
        if covariance.nrows() != n || covariance.ncols() != n {
            return Err(Error::DimensionMismatch {
                what: "covariance rows/columns",
                expected: n,
                actual: covariance.nrows().max(covariance.ncols()),
            });
        }
        Ok(Self {
            mean: DVector::from_vec(mean),
            covariance,
            sample_count,
        })
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    pub fn mean(&self) -> &[f64] {
        self.mean.as_slice()
    }

    pub fn mean_vector(&self) -> &DVector<f64> {
        &self.mean
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Per-point standard uncertainty of the mean.
    pub fn sdev(&self) -> Vec<f64> {
        sdev_of(&self.covariance)
    }

    pub fn correlation(&self) -> DMatrix<f64> {
        correlation_of(&self.covariance)
    }
}

/// Average draws (rows) over points (columns).
pub fn aggregate(samples: &DMatrix<f64>) -> Result<ObservedDataset> {
    let count = samples.nrows();
    let n = samples.ncols();
    if count < 2 {
        return Err(Error::InsufficientSamples { count });
    }
    if n == 0 {
        return Err(Error::DimensionMismatch {
            what: "data points",
            expected: 1,
            actual: 0,
        });
    }

    let count_f = count as f64;
    // Shifted by the first draw, so a column of identical draws has exactly
    // that value as its mean and an exactly zero variance.
    let mean: DVector<f64> = DVector::from_iterator(
        n,
        samples.column_iter().map(|c| {
            let shift = c[0];
            shift + c.iter().map(|v| v - shift).sum::<f64>() / count_f
        }),
    );

    let mut centered = samples.clone();
    for (j, mut column) in centered.column_iter_mut().enumerate() {
        column.add_scalar_mut(-mean[j]);
    }

    let mut covariance = centered.tr_mul(&centered) / (count_f * (count_f - 1.0));
    // Exact symmetry for the eigen/Cholesky factorizations downstream.
    for i in 0..n {
        for j in 0..i {
            covariance[(j, i)] = covariance[(i, j)];
        }
    }

    debug!("aggregated {count} draws over {n} points");
    Ok(ObservedDataset {
        mean,
        covariance,
        sample_count: count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn samples() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            4,
            3,
            &[
                1.0, 2.0, 0.5, //
                2.0, 1.0, 0.7, //
                0.0, 4.0, 0.1, //
                3.0, 1.0, 0.3,
            ],
        )
    }

    #[test]
    fn mean_and_covariance_of_the_mean() {
        let ds = aggregate(&samples()).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.sample_count(), 4);
        assert_relative_eq!(ds.mean()[0], 1.5, max_relative = 1e-15);
        assert_relative_eq!(ds.mean()[1], 2.0, max_relative = 1e-15);

        // Column 0: deviations (-0.5, 0.5, -1.5, 1.5), sum of squares 5.
        // Var of mean = 5 / (4 * 3).
        assert_relative_eq!(ds.covariance()[(0, 0)], 5.0 / 12.0, max_relative = 1e-12);
        // Column 1 deviations (0, -1, 2, -1); cross sum with column 0 = -0.5 -3 -1.5 = -5.
        assert_relative_eq!(ds.covariance()[(0, 1)], -5.0 / 12.0, max_relative = 1e-12);
        assert_eq!(ds.covariance()[(0, 1)], ds.covariance()[(1, 0)]);
    }

    #[test]
    fn one_draw_is_insufficient() {
        let one = DMatrix::from_row_slice(1, 3, &[1.0, 2.0, 3.0]);
        assert!(matches!(aggregate(&one), Err(Error::InsufficientSamples { count: 1 })));
    }

    #[test]
    fn draw_order_does_not_matter() {
        let a = aggregate(&samples()).unwrap();
        let s = samples();
        let permuted = DMatrix::from_fn(4, 3, |i, j| s[([2, 0, 3, 1][i], j)]);
        let b = aggregate(&permuted).unwrap();
        for (x, y) in a.mean().iter().zip(b.mean()) {
            assert_relative_eq!(*x, *y, max_relative = 1e-14);
        }
        for (x, y) in a.covariance().iter().zip(b.covariance().iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-14, max_relative = 1e-12);
        }
    }

    #[test]
    fn identical_input_is_bit_reproducible() {
        assert_eq!(aggregate(&samples()).unwrap(), aggregate(&samples()).unwrap());
    }

    #[test]
    fn identical_draws_have_zero_covariance() {
        let flat = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
        let ds = aggregate(&flat).unwrap();
        assert!(ds.covariance().iter().all(|&v| v == 0.0));
        assert_eq!(ds.sdev(), vec![0.0, 0.0]);
    }

    #[test]
    fn identical_draws_keep_their_exact_value() {
        let v = [0.1 + 0.2, 1.0 / 3.0];
        let flat = DMatrix::from_fn(100, 2, |_, j| v[j]);
        let ds = aggregate(&flat).unwrap();
        assert_eq!(ds.mean(), &v[..]);
        assert!(ds.covariance().iter().all(|&c| c == 0.0));
    }

    #[test]
    fn from_parts_checks_shapes() {
        assert!(ObservedDataset::from_parts(vec![1.0, 2.0], DMatrix::identity(3, 3), 0).is_err());
        assert!(ObservedDataset::from_parts(vec![], DMatrix::zeros(0, 0), 0).is_err());
        let ds = ObservedDataset::from_parts(vec![1.0, 2.0], DMatrix::identity(2, 2) * 4.0, 0).unwrap();
        assert_eq!(ds.sdev(), vec![2.0, 2.0]);
    }
}
