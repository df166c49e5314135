//! Solve strategies behind the single `fit` entry point.
//!
//! - `LevenbergMarquardt`: damped Gauss–Newton over every free parameter,
//!   with the analytic model gradient.
//! - `VariableProjection`: parameters that enter linearly are eliminated by a
//!   direct least squares solve for each trial value of the others; the
//!   damped search then runs over the remaining parameters only. When every
//!   parameter is linear this is one solve and no iterations.
//!
//! Both strategies share `damped_search`, which only sees a residual closure
//! and a Jacobian closure.

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::domain::StrategyKind;
use crate::error::{Error, Result};
use crate::fit::fitter::FitOptions;
use crate::math::solve_least_squares;
use crate::models::FitFunction;

/// Initial Marquardt damping, relative to the scaled curvature.
const INITIAL_DAMPING: f64 = 1e-3;
const MIN_DAMPING: f64 = 1e-15;
/// Above this the step is numerically zero and the point is stationary.
const MAX_DAMPING: f64 = 1e16;

/// Data, whitening and model of one fit, as seen by a strategy.
pub struct Problem<'a> {
    pub xs: &'a [f64],
    pub y: &'a DVector<f64>,
    pub whitening: &'a crate::fit::weights::Whitening,
    pub model: &'a dyn FitFunction,
}

impl Problem<'_> {
    fn len(&self) -> usize {
        self.xs.len()
    }

    /// Model values on the grid.
    pub fn predict(&self, params: &[f64]) -> DVector<f64> {
        DVector::from_iterator(self.len(), self.xs.iter().map(|&x| self.model.value(x, params)))
    }

    /// Whitened residual `W (f(p) - y)`.
    pub fn residual(&self, params: &[f64]) -> DVector<f64> {
        self.whitening.whiten(&(self.predict(params) - self.y))
    }

    /// Unwhitened Jacobian `∂f(x_i)/∂p_j`.
    pub fn raw_jacobian(&self, params: &[f64]) -> DMatrix<f64> {
        let k = self.model.param_len();
        let mut jac = DMatrix::zeros(self.len(), k);
        let mut row = vec![0.0; k];
        for (i, &x) in self.xs.iter().enumerate() {
            self.model.gradient(x, params, &mut row);
            for (j, &g) in row.iter().enumerate() {
                jac[(i, j)] = g;
            }
        }
        jac
    }

    /// Whitened Jacobian `W J`.
    pub fn jacobian(&self, params: &[f64]) -> DMatrix<f64> {
        self.whitening.whiten_matrix(&self.raw_jacobian(params))
    }
}

/// Parameters at the end of a strategy run.
#[derive(Debug, Clone)]
pub struct Solution {
    pub params: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// A way of minimizing the whitened chi-square.
pub trait SolveStrategy {
    fn kind(&self) -> StrategyKind;

    /// Minimize starting from `start` (ordered like the model parameters).
    fn solve(&self, problem: &Problem<'_>, start: &[f64], options: &FitOptions) -> Result<Solution>;
}

/// Build the strategy `StrategyKind::for_subset` picks for these linear
/// degrees; `positions` locates them among the model parameters.
pub fn strategy_for(linear: &[u32], positions: Vec<usize>) -> Box<dyn SolveStrategy> {
    match StrategyKind::for_subset(linear) {
        StrategyKind::LevenbergMarquardt => Box::new(LevenbergMarquardt),
        StrategyKind::VariableProjection => Box::new(VariableProjection::new(positions)),
    }
}

/// Damped Gauss–Newton over all parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenbergMarquardt;

impl SolveStrategy for LevenbergMarquardt {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LevenbergMarquardt
    }

    fn solve(&self, problem: &Problem<'_>, start: &[f64], options: &FitOptions) -> Result<Solution> {
        let outcome = damped_search(
            start.to_vec(),
            |p| Some(problem.residual(p)),
            |p, _| Some(problem.jacobian(p)),
            options,
        )?;
        Ok(Solution {
            params: outcome.params,
            iterations: outcome.iterations,
            converged: outcome.converged,
        })
    }
}

/// Linear parameters (by position) solved inside the search over the rest.
#[derive(Debug, Clone)]
pub struct VariableProjection {
    linear: Vec<usize>,
}

impl VariableProjection {
    pub fn new(linear: Vec<usize>) -> Self {
        Self { linear }
    }

    /// Full parameter vector for given nonlinear values, with the linear ones
    /// at their conditional optimum. `None` if the inner solve fails.
    fn project(&self, problem: &Problem<'_>, nonlinear_idx: &[usize], theta: &[f64]) -> Option<Vec<f64>> {
        let k = problem.model.param_len();
        let mut params = vec![0.0; k];
        for (&i, &v) in nonlinear_idx.iter().zip(theta) {
            params[i] = v;
        }

        // With the linear parameters at zero, f = h(θ); the linear columns are
        // the gradient with respect to those parameters.
        let h = problem.predict(&params);
        let raw = problem.raw_jacobian(&params);
        let g = DMatrix::from_fn(problem.len(), self.linear.len(), |r, c| raw[(r, self.linear[c])]);

        let a = problem.whitening.whiten_matrix(&g);
        let b = problem.whitening.whiten(&(problem.y - h));
        let beta = solve_least_squares(&a, &b)?;
        for (&i, &v) in self.linear.iter().zip(beta.iter()) {
            params[i] = v;
        }
        Some(params)
    }
}

impl SolveStrategy for VariableProjection {
    fn kind(&self) -> StrategyKind {
        StrategyKind::VariableProjection
    }

    fn solve(&self, problem: &Problem<'_>, start: &[f64], options: &FitOptions) -> Result<Solution> {
        let k = problem.model.param_len();
        let nonlinear_idx: Vec<usize> = (0..k).filter(|i| !self.linear.contains(i)).collect();

        if nonlinear_idx.is_empty() {
            let params = self.project(problem, &[], &[]).ok_or_else(|| {
                Error::SingularCovariance("linear solve failed on the whitened design".into())
            })?;
            debug!("variable projection: all {k} parameters linear, single solve");
            return Ok(Solution {
                params,
                iterations: 0,
                converged: true,
            });
        }

        let theta0: Vec<f64> = nonlinear_idx.iter().map(|&i| start[i]).collect();
        let residual = |theta: &[f64]| {
            self.project(problem, &nonlinear_idx, theta)
                .map(|p| problem.residual(&p))
        };
        let jacobian = |theta: &[f64], r0: &DVector<f64>| forward_difference(&residual, theta, r0);

        let outcome = damped_search(theta0, &residual, jacobian, options)?;
        let params = self
            .project(problem, &nonlinear_idx, &outcome.params)
            .ok_or_else(|| Error::SingularCovariance("linear solve failed at the minimum".into()))?;
        Ok(Solution {
            params,
            iterations: outcome.iterations,
            converged: outcome.converged,
        })
    }
}

/// Forward-difference Jacobian of a residual closure.
fn forward_difference<R>(residual: &R, theta: &[f64], r0: &DVector<f64>) -> Option<DMatrix<f64>>
where
    R: Fn(&[f64]) -> Option<DVector<f64>>,
{
    let step_scale = f64::EPSILON.sqrt();
    let mut jac = DMatrix::zeros(r0.len(), theta.len());
    let mut shifted = theta.to_vec();
    for j in 0..theta.len() {
        let h = step_scale * theta[j].abs().max(1.0);
        shifted[j] = theta[j] + h;
        let r = residual(&shifted)?;
        jac.set_column(j, &((r - r0) / h));
        shifted[j] = theta[j];
    }
    Some(jac)
}

struct SearchOutcome {
    params: Vec<f64>,
    iterations: usize,
    converged: bool,
}

/// Levenberg–Marquardt on `|| r(p) ||^2`.
///
/// Each trial step solves the augmented system `[J; sqrt(λ) D] δ = [-r; 0]`
/// with SVD, where `D` holds the Jacobian column norms (scale invariance).
/// Converges when a step is below `x_tol` relative to `|p|`, when an accepted
/// step improves chi2 by less than `f_tol` relative, or when the damping
/// saturates (no representable descent step left).
fn damped_search<R, J>(start: Vec<f64>, residual: R, jacobian: J, options: &FitOptions) -> Result<SearchOutcome>
where
    R: Fn(&[f64]) -> Option<DVector<f64>>,
    J: Fn(&[f64], &DVector<f64>) -> Option<DMatrix<f64>>,
{
    let k = start.len();
    let mut params = start;
    let mut r = residual(&params)
        .filter(|r| r.iter().all(|v| v.is_finite()))
        .ok_or_else(|| Error::config("model is not finite at the starting values"))?;
    let mut chi2 = r.norm_squared();
    let mut damping = INITIAL_DAMPING;

    for iteration in 1..=options.max_iterations {
        let Some(jac) = jacobian(&params, &r) else {
            return Err(Error::SingularCovariance("Jacobian could not be evaluated".into()));
        };
        let scale: Vec<f64> = jac
            .column_iter()
            .map(|c| c.norm().max(f64::MIN_POSITIVE))
            .collect();
        let p_norm = params.iter().map(|v| v * v).sum::<f64>().sqrt();

        loop {
            let n = jac.nrows();
            let mut a = DMatrix::zeros(n + k, k);
            a.view_mut((0, 0), (n, k)).copy_from(&jac);
            for j in 0..k {
                a[(n + j, j)] = damping.sqrt() * scale[j];
            }
            let mut b = DVector::zeros(n + k);
            b.rows_mut(0, n).copy_from(&(-&r));

            let Some(delta) = solve_least_squares(&a, &b) else {
                damping *= 10.0;
                if damping > MAX_DAMPING {
                    debug!("damping saturated at iteration {iteration}; chi2={chi2:.6e}");
                    return Ok(SearchOutcome { params, iterations: iteration, converged: true });
                }
                continue;
            };

            if delta.norm() <= options.x_tol * (p_norm + options.x_tol) {
                debug!("step below x_tol at iteration {iteration}; chi2={chi2:.6e}");
                return Ok(SearchOutcome { params, iterations: iteration, converged: true });
            }

            let trial: Vec<f64> = params.iter().zip(delta.iter()).map(|(p, d)| p + d).collect();
            let trial_r = residual(&trial).filter(|r| r.iter().all(|v| v.is_finite()));
            let trial_chi2 = trial_r.as_ref().map(|r| r.norm_squared()).unwrap_or(f64::INFINITY);

            if trial_chi2 <= chi2 {
                let improvement = (chi2 - trial_chi2) / chi2.max(f64::MIN_POSITIVE);
                params = trial;
                if let Some(trial_r) = trial_r {
                    r = trial_r;
                }
                chi2 = trial_chi2;
                damping = (damping / 10.0).max(MIN_DAMPING);
                debug!("iteration {iteration}: chi2={chi2:.6e} damping={damping:.1e}");

                if improvement <= options.f_tol {
                    return Ok(SearchOutcome { params, iterations: iteration, converged: true });
                }
                break;
            }

            damping *= 10.0;
            if damping > MAX_DAMPING {
                debug!("damping saturated at iteration {iteration}; chi2={chi2:.6e}");
                return Ok(SearchOutcome { params, iterations: iteration, converged: true });
            }
        }
    }

    Ok(SearchOutcome {
        params,
        iterations: options.max_iterations,
        converged: false,
    })
}
