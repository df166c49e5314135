//! The `fit` entry point.
//!
//! Given:
//! - grid points `x_i`
//! - an aggregated dataset (central values `y_i`, covariance `C`)
//! - starting coefficients, whose degrees are the free parameters
//! - the degrees declared to enter linearly
//!
//! we minimize `(y - f(p))ᵀ C⁻¹ (y - f(p))` and report the minimum with its
//! parameter covariance `(Jᵀ C⁻¹ J)⁻¹` and fit-quality diagnostics.

use std::f64::consts::PI;

use log::{info, warn};

use crate::data::ObservedDataset;
use crate::domain::{sdev_of, Coefficients, FitResult, Grid};
use crate::error::{Error, Result};
use crate::fit::strategy::{strategy_for, Problem};
use crate::fit::weights::Whitening;
use crate::math::{chi2_q, normal_covariance};
use crate::models::Polynomial;

/// Options that affect how a fit is solved.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    /// Iteration budget of the damped search.
    pub max_iterations: usize,
    /// Relative step size below which the search stops.
    pub x_tol: f64,
    /// Relative chi2 improvement below which the search stops.
    pub f_tol: f64,
    /// Relative eigenvalue floor for the data correlation matrix.
    ///
    /// `None` requires `C` to be positive definite (Cholesky) and fails with
    /// `SingularCovariance` otherwise.
    pub svd_cut: Option<f64>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            x_tol: 1e-10,
            f_tol: 1e-10,
            svd_cut: Some(1e-12),
        }
    }
}

impl FitOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::config("max_iterations must be >= 1"));
        }
        if !(self.x_tol.is_finite() && self.x_tol > 0.0) {
            return Err(Error::config(format!("x_tol must be finite and > 0, got {}", self.x_tol)));
        }
        if !(self.f_tol.is_finite() && self.f_tol > 0.0) {
            return Err(Error::config(format!("f_tol must be finite and > 0, got {}", self.f_tol)));
        }
        if let Some(cut) = self.svd_cut {
            if !(cut > 0.0 && cut < 1.0) {
                return Err(Error::config(format!("svd_cut must lie in (0, 1), got {cut}")));
            }
        }
        Ok(())
    }
}

/// Fit a polynomial to an aggregated dataset.
///
/// On non-convergence the best parameters found are still returned, inside
/// `Error::NonConvergentFit`, with `converged = false`.
pub fn fit(
    grid: &Grid,
    dataset: &ObservedDataset,
    initial: &Coefficients,
    linear_subset: &[u32],
    options: &FitOptions,
) -> Result<FitResult> {
    options.validate()?;
    if grid.len() != dataset.len() {
        return Err(Error::DimensionMismatch {
            what: "dataset points",
            expected: grid.len(),
            actual: dataset.len(),
        });
    }

    let degrees = initial.degrees();
    let k = degrees.len();
    let n = grid.len();
    if k == 0 {
        return Err(Error::config("no free parameters to fit"));
    }
    if k > n {
        return Err(Error::config(format!(
            "{k} free parameters exceed the {n} data points"
        )));
    }

    let mut linear_positions = Vec::with_capacity(linear_subset.len());
    for degree in linear_subset {
        let position = degrees.iter().position(|d| d == degree).ok_or_else(|| {
            Error::config(format!(
                "linear degree {} is not among the fitted coefficients",
                crate::domain::key_name(*degree)
            ))
        })?;
        if !linear_positions.contains(&position) {
            linear_positions.push(position);
        }
    }
    linear_positions.sort_unstable();
    let linear: Vec<u32> = linear_positions.iter().map(|&i| degrees[i]).collect();

    let whitening = Whitening::new(dataset.covariance(), options.svd_cut)?;
    let model = Polynomial::new(degrees.clone());
    let problem = Problem {
        xs: grid.points(),
        y: dataset.mean_vector(),
        whitening: &whitening,
        model: &model,
    };

    let strategy = strategy_for(&linear, linear_positions);
    let solution = strategy.solve(&problem, &initial.values(), options)?;

    let chi2 = problem.residual(&solution.params).norm_squared();
    let (covariance, rank) = normal_covariance(&problem.jacobian(&solution.params))
        .ok_or_else(|| Error::SingularCovariance("parameter covariance could not be formed".into()))?;
    if rank < k {
        warn!(
            "only {rank} of {k} parameters are identified by the data; \
             unidentified directions get zero variance"
        );
    }

    let dof = n - k;
    let result = FitResult {
        initial: initial.clone(),
        values: Coefficients::from_parts(&degrees, &solution.params)?,
        sdev: sdev_of(&covariance),
        covariance,
        chi2,
        dof,
        q: chi2_q(chi2, dof),
        log_likelihood: -0.5 * (chi2 + whitening.log_det() + n as f64 * (2.0 * PI).ln()),
        svd_modified: whitening.modified(),
        iterations: solution.iterations,
        strategy: strategy.kind(),
        linear,
        converged: solution.converged,
    };

    if !result.converged {
        warn!(
            "fit did not converge within {} iterations (chi2={:.4})",
            options.max_iterations, result.chi2
        );
        return Err(Error::NonConvergentFit(Box::new(result)));
    }

    info!(
        "fit converged: {} iterations, chi2/dof={:.3} [{}], Q={:.3}",
        result.iterations,
        result.chi2_per_dof(),
        result.dof,
        result.q
    );
    Ok(result)
}
