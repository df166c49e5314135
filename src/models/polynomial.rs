//! Polynomial evaluation.
//!
//! The fitter relies on two primitive operations:
//! - evaluate `y(x)` for a coefficient set (truth generation, residuals, plots)
//! - the value and parameter gradient at one `x` for an ordered parameter
//!   vector (Jacobians inside the solver)
//!
//! Both are implemented here. Uncertain evaluation is exact first-order
//! propagation: `y` is linear in the coefficients, so `cov_y = J C Jᵀ` with
//! `J_ij = x_i^(d_j)`.

use nalgebra::{DMatrix, DVector};

use crate::domain::{Coefficients, UncertainCoefficients, UncertainValues};

/// A model that can be fitted: value and gradient with respect to an ordered
/// parameter vector.
pub trait FitFunction {
    /// Number of parameters the model expects.
    fn param_len(&self) -> usize;

    /// Model value at `x`.
    fn value(&self, x: f64, params: &[f64]) -> f64;

    /// Partial derivatives of `value` with respect to each parameter.
    ///
    /// # Panics
    /// Panics if `out` is shorter than `param_len()`.
    fn gradient(&self, x: f64, params: &[f64], out: &mut [f64]);
}

/// `x^k` for a validated degree.
#[inline]
fn power(x: f64, degree: u32) -> f64 {
    // Degrees are capped at `MAX_DEGREE`, so the cast cannot wrap.
    x.powi(degree as i32)
}

/// `sum_k c_k * x^k`. Empty coefficients give `0.0`.
pub fn evaluate(x: f64, coefficients: &Coefficients) -> f64 {
    coefficients
        .iter()
        .map(|(degree, c)| c * power(x, degree))
        .sum()
}

/// Evaluate on every point of `xs`.
pub fn evaluate_grid(xs: &[f64], coefficients: &Coefficients) -> Vec<f64> {
    xs.iter().map(|&x| evaluate(x, coefficients)).collect()
}

/// Design matrix `J_ij = x_i^(degrees_j)`.
pub fn design_matrix(xs: &[f64], degrees: &[u32]) -> DMatrix<f64> {
    DMatrix::from_fn(xs.len(), degrees.len(), |i, j| power(xs[i], degrees[j]))
}

/// Evaluate with correlated coefficient uncertainty.
pub fn evaluate_uncertain(xs: &[f64], coefficients: &UncertainCoefficients) -> UncertainValues {
    let j = design_matrix(xs, &coefficients.degrees);
    let mean: DVector<f64> = &j * &coefficients.mean;
    let covariance = &j * &coefficients.covariance * j.transpose();
    UncertainValues {
        mean: mean.iter().copied().collect(),
        covariance,
    }
}

/// A polynomial whose free parameters are the coefficients of `degrees`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polynomial {
    degrees: Vec<u32>,
}

impl Polynomial {
    pub fn new(degrees: Vec<u32>) -> Self {
        Self { degrees }
    }

    pub fn degrees(&self) -> &[u32] {
        &self.degrees
    }
}

impl FitFunction for Polynomial {
    fn param_len(&self) -> usize {
        self.degrees.len()
    }

    fn value(&self, x: f64, params: &[f64]) -> f64 {
        self.degrees
            .iter()
            .zip(params)
            .map(|(&d, &c)| c * power(x, d))
            .sum()
    }

    fn gradient(&self, x: f64, _params: &[f64], out: &mut [f64]) {
        for (slot, &d) in out.iter_mut().zip(&self.degrees) {
            *slot = power(x, d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn truth() -> Coefficients {
        Coefficients::new([(0, 1.5), (1, -0.3), (2, 0.04)]).unwrap()
    }

    #[test]
    fn matches_closed_form_on_grid() {
        let c = truth();
        let xs: Vec<f64> = (0..=50).map(|i| 0.2 * i as f64).collect();
        let ys = evaluate_grid(&xs, &c);
        for (&x, &y) in xs.iter().zip(&ys) {
            assert_eq!(y, 1.5 * x.powi(0) + -0.3 * x.powi(1) + 0.04 * x.powi(2));
        }
    }

    #[test]
    fn integer_inputs_are_exact() {
        let c = Coefficients::new([(0, 1.0), (1, 2.0), (2, 3.0)]).unwrap();
        assert_eq!(evaluate(2.0, &c), 17.0);
        assert_eq!(evaluate(0.0, &c), 1.0);
    }

    #[test]
    fn sparse_degrees_skip_missing_terms() {
        let c = Coefficients::new([(3, 2.0)]).unwrap();
        assert_eq!(evaluate(2.0, &c), 16.0);
    }

    #[test]
    fn empty_coefficients_give_zero() {
        let ys = evaluate_grid(&[0.0, 1.0, 5.0], &Coefficients::default());
        assert_eq!(ys, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn fit_function_agrees_with_evaluate() {
        let c = truth();
        let poly = Polynomial::new(c.degrees());
        let params = c.values();
        let mut grad = vec![0.0; poly.param_len()];
        for &x in &[0.0, 0.7, 3.0, 10.0] {
            assert_eq!(poly.value(x, &params), evaluate(x, &c));
            poly.gradient(x, &params, &mut grad);
            assert_eq!(grad, vec![1.0, x, x * x]);
        }
    }

    #[test]
    fn exact_coefficients_propagate_zero_uncertainty() {
        let c = truth();
        let out = evaluate_uncertain(&[0.0, 1.0, 2.0], &UncertainCoefficients::exact(&c));
        for (m, y) in out.mean.iter().zip(evaluate_grid(&[0.0, 1.0, 2.0], &c)) {
            assert_relative_eq!(*m, y, max_relative = 1e-15);
        }
        assert!(out.sdev().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn propagation_includes_correlation() {
        // y(x) = a + b x with var(a)=1, var(b)=4, cov(a,b)=-1:
        // var(y) = 1 + 4x^2 - 2x.
        let coefficients = UncertainCoefficients {
            degrees: vec![0, 1],
            mean: DVector::from_vec(vec![1.0, 2.0]),
            covariance: DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 4.0]),
        };
        let out = evaluate_uncertain(&[0.0, 1.0, 3.0], &coefficients);
        assert_eq!(out.mean, vec![1.0, 3.0, 7.0]);
        let expected = [1.0_f64, 3.0, 31.0];
        for (s, e) in out.sdev().iter().zip(expected) {
            assert_relative_eq!(*s, e.sqrt(), max_relative = 1e-12);
        }
        let (lo, hi) = out.band();
        assert_relative_eq!(hi[1] - lo[1], 2.0 * 3.0_f64.sqrt(), max_relative = 1e-12);
    }
}
