//! Shared domain types.
//!
//! These types are passed stage to stage and never mutated after
//! construction:
//!
//! - polynomial coefficients keyed by degree (`Coefficients`)
//! - the regular sample grid (`Grid`)
//! - run configuration (`RunConfig`)
//! - fit outputs (`FitResult`) and uncertain values derived from them

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Prefix used by the human-readable coefficient names (`p_0`, `p_1`, ...).
const KEY_PREFIX: &str = "p_";

/// Highest polynomial degree accepted anywhere in the pipeline.
pub const MAX_DEGREE: u32 = 64;

/// Polynomial coefficients keyed by degree.
///
/// The evaluated polynomial is `sum_k c_k * x^k`. Degrees absent from the map
/// are zero. Values are validated finite at construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coefficients(BTreeMap<u32, f64>);

impl Coefficients {
    /// Build from `(degree, value)` pairs. Duplicate degrees are rejected.
    pub fn new(pairs: impl IntoIterator<Item = (u32, f64)>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for (degree, value) in pairs {
            if degree > MAX_DEGREE {
                return Err(Error::config(format!(
                    "coefficient degree {degree} exceeds the maximum of {MAX_DEGREE}"
                )));
            }
            if !value.is_finite() {
                return Err(Error::config(format!(
                    "coefficient {} must be finite, got {value}",
                    key_name(degree)
                )));
            }
            if map.insert(degree, value).is_some() {
                return Err(Error::config(format!(
                    "duplicate coefficient {}",
                    key_name(degree)
                )));
            }
        }
        Ok(Self(map))
    }

    /// Build from named pairs such as `("p_2", 0.04)`.
    pub fn from_named<'a>(pairs: impl IntoIterator<Item = (&'a str, f64)>) -> Result<Self> {
        let parsed: Result<Vec<(u32, f64)>> = pairs
            .into_iter()
            .map(|(key, value)| parse_key(key).map(|degree| (degree, value)))
            .collect();
        Self::new(parsed?)
    }

    pub fn get(&self, degree: u32) -> Option<f64> {
        self.0.get(&degree).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Degrees in increasing order.
    pub fn degrees(&self) -> Vec<u32> {
        self.0.keys().copied().collect()
    }

    /// Values ordered by increasing degree.
    pub fn values(&self) -> Vec<f64> {
        self.0.values().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.0.iter().map(|(&k, &v)| (k, v))
    }

    pub fn max_degree(&self) -> Option<u32> {
        self.0.keys().next_back().copied()
    }

    /// Keep only degrees `<= max_degree`.
    pub fn truncated(&self, max_degree: u32) -> Self {
        Self(
            self.0
                .range(..=max_degree)
                .map(|(&k, &v)| (k, v))
                .collect(),
        )
    }

    /// Rebuild from degrees and values in matching order.
    pub(crate) fn from_parts(degrees: &[u32], values: &[f64]) -> Result<Self> {
        if degrees.len() != values.len() {
            return Err(Error::DimensionMismatch {
                what: "coefficient values",
                expected: degrees.len(),
                actual: values.len(),
            });
        }
        Self::new(degrees.iter().copied().zip(values.iter().copied()))
    }
}

/// Parse `p_<k>` into the degree `k`.
pub fn parse_key(key: &str) -> Result<u32> {
    key.strip_prefix(KEY_PREFIX)
        .and_then(|rest| rest.parse::<u32>().ok())
        .ok_or_else(|| {
            Error::config(format!(
                "coefficient key '{key}' must look like {KEY_PREFIX}<non-negative degree>"
            ))
        })
}

/// Human-readable name for a degree (`p_<k>`).
pub fn key_name(degree: u32) -> String {
    format!("{KEY_PREFIX}{degree}")
}

/// Strictly increasing, evenly spaced independent-variable values.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    xs: Vec<f64>,
    step: f64,
}

impl Grid {
    /// Relative tolerance used when checking that spacing is constant.
    const SPACING_TOL: f64 = 1e-9;

    /// `start, start + step, ...` up to and including `stop` (within rounding).
    pub fn regular(start: f64, stop: f64, step: f64) -> Result<Self> {
        if !(start.is_finite() && stop.is_finite() && step.is_finite()) {
            return Err(Error::config("grid bounds and step must be finite"));
        }
        if step <= 0.0 {
            return Err(Error::config(format!("grid step must be > 0, got {step}")));
        }
        if stop < start {
            return Err(Error::config(format!(
                "grid stop ({stop}) must not be below start ({start})"
            )));
        }

        // Points are computed from the index rather than accumulated so the
        // last point lands on `stop` exactly when the span divides evenly.
        let n = ((stop - start) / step + Self::SPACING_TOL).floor() as usize + 1;
        let xs = (0..n).map(|i| start + step * i as f64).collect();
        Ok(Self { xs, step })
    }

    /// Validate an explicit list of points.
    pub fn from_points(xs: Vec<f64>) -> Result<Self> {
        if xs.is_empty() {
            return Err(Error::config("grid must contain at least one point"));
        }
        if xs.iter().any(|x| !x.is_finite()) {
            return Err(Error::config("grid points must be finite"));
        }
        if xs.len() == 1 {
            return Ok(Self { xs, step: 0.0 });
        }

        let step = xs[1] - xs[0];
        if step <= 0.0 {
            return Err(Error::config("grid points must be strictly increasing"));
        }
        for w in xs.windows(2) {
            let d = w[1] - w[0];
            if d <= 0.0 {
                return Err(Error::config("grid points must be strictly increasing"));
            }
            if (d - step).abs() > Self::SPACING_TOL * step.abs().max(1.0) {
                return Err(Error::config(format!(
                    "grid spacing must be constant: expected {step}, found {d}"
                )));
            }
        }
        Ok(Self { xs, step })
    }

    /// Finer grid over the same span, used to evaluate the fitted model.
    ///
    /// The upper end is extended by less than one step so the last data point
    /// is always covered.
    pub fn fine(&self, step: f64) -> Result<Self> {
        let end = self.end();
        let grid = Self::regular(self.start(), end, step)?;
        match grid.xs.last() {
            Some(&last) if last < end - Self::SPACING_TOL * step => {
                Self::regular(self.start(), end + step, step)
            }
            _ => Ok(grid),
        }
    }

    pub fn points(&self) -> &[f64] {
        &self.xs
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn start(&self) -> f64 {
        self.xs[0]
    }

    pub fn end(&self) -> f64 {
        self.xs[self.xs.len() - 1]
    }
}

impl Default for Grid {
    /// `x = 0.0, 0.2, ..., 10.0` (51 points).
    fn default() -> Self {
        let xs = (0..=50).map(|i| 0.2 * i as f64).collect();
        Self { xs, step: 0.2 }
    }
}

/// Which solve strategy produced a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Damped Gauss–Newton over every free parameter.
    LevenbergMarquardt,
    /// Linear parameters solved directly inside the nonlinear search.
    VariableProjection,
}

impl StrategyKind {
    /// Variable projection whenever any parameter is declared linear.
    pub fn for_subset(linear_subset: &[u32]) -> Self {
        if linear_subset.is_empty() {
            StrategyKind::LevenbergMarquardt
        } else {
            StrategyKind::VariableProjection
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            StrategyKind::LevenbergMarquardt => "Levenberg-Marquardt",
            StrategyKind::VariableProjection => "variable projection",
        }
    }
}

/// Coefficients carrying a joint Gaussian uncertainty.
#[derive(Debug, Clone, PartialEq)]
pub struct UncertainCoefficients {
    pub degrees: Vec<u32>,
    pub mean: DVector<f64>,
    pub covariance: DMatrix<f64>,
}

impl UncertainCoefficients {
    /// Exact coefficients (zero covariance).
    pub fn exact(coefficients: &Coefficients) -> Self {
        let degrees = coefficients.degrees();
        let k = degrees.len();
        Self {
            degrees,
            mean: DVector::from_vec(coefficients.values()),
            covariance: DMatrix::zeros(k, k),
        }
    }
}

/// Values with a joint Gaussian uncertainty, as plain arrays for display.
#[derive(Debug, Clone, PartialEq)]
pub struct UncertainValues {
    pub mean: Vec<f64>,
    pub covariance: DMatrix<f64>,
}

impl UncertainValues {
    pub fn sdev(&self) -> Vec<f64> {
        sdev_of(&self.covariance)
    }

    /// `(mean - sdev, mean + sdev)` per point.
    pub fn band(&self) -> (Vec<f64>, Vec<f64>) {
        self.mean
            .iter()
            .zip(self.sdev())
            .map(|(m, s)| (m - s, m + s))
            .unzip()
    }
}

/// Output of one fit call.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Starting values; also define which degrees were free.
    pub initial: Coefficients,
    pub values: Coefficients,
    /// Standard deviations, ordered like `values.degrees()`.
    pub sdev: Vec<f64>,
    pub covariance: DMatrix<f64>,
    pub chi2: f64,
    pub dof: usize,
    /// Probability of a chi2 at least this large for `dof` degrees of freedom.
    pub q: f64,
    /// Gaussian log-likelihood at the minimum.
    pub log_likelihood: f64,
    /// Number of data-covariance eigenvalues raised by the svd cut.
    pub svd_modified: usize,
    pub iterations: usize,
    pub strategy: StrategyKind,
    /// Degrees that were solved linearly (empty for Levenberg–Marquardt).
    pub linear: Vec<u32>,
    pub converged: bool,
}

impl FitResult {
    pub fn chi2_per_dof(&self) -> f64 {
        if self.dof == 0 {
            f64::NAN
        } else {
            self.chi2 / self.dof as f64
        }
    }

    pub fn sdev_of(&self, degree: u32) -> Option<f64> {
        self.values
            .degrees()
            .iter()
            .position(|&d| d == degree)
            .map(|i| self.sdev[i])
    }

    /// Pairwise correlation matrix of the fitted coefficients.
    pub fn correlation(&self) -> DMatrix<f64> {
        correlation_of(&self.covariance)
    }

    /// The fitted coefficients as one correlated Gaussian.
    pub fn uncertain(&self) -> UncertainCoefficients {
        UncertainCoefficients {
            degrees: self.values.degrees(),
            mean: DVector::from_vec(self.values.values()),
            covariance: self.covariance.clone(),
        }
    }
}

/// Square roots of the covariance diagonal (negative rounding clamps to 0).
pub fn sdev_of(covariance: &DMatrix<f64>) -> Vec<f64> {
    covariance.diagonal().iter().map(|v| v.max(0.0).sqrt()).collect()
}

/// Correlation matrix; entries with a zero variance are reported as 0
/// (diagonal stays 1).
pub fn correlation_of(covariance: &DMatrix<f64>) -> DMatrix<f64> {
    let s = sdev_of(covariance);
    DMatrix::from_fn(covariance.nrows(), covariance.ncols(), |i, j| {
        if i == j {
            1.0
        } else if s[i] > 0.0 && s[j] > 0.0 {
            covariance[(i, j)] / (s[i] * s[j])
        } else {
            0.0
        }
    })
}

/// One run of the pipeline as understood by the core.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Highest degree of the truth polynomial used to generate data.
    pub data_degree: u32,
    /// Highest degree of the fitted polynomial.
    pub fit_degree: u32,
    /// `None` draws a fresh, non-reproducible seed.
    pub seed: Option<u64>,
    pub noise_mean: f64,
    pub noise_width: f64,
    pub sample_count: usize,
    /// Declare every fitted coefficient linear (variable projection).
    pub use_linear_subset: bool,
    pub run_fit: bool,
    pub fit_options: crate::fit::FitOptions,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data_degree: 1,
            fit_degree: 1,
            seed: None,
            noise_mean: 0.0,
            noise_width: 1.0,
            sample_count: 100,
            use_linear_subset: false,
            run_fit: true,
            fit_options: crate::fit::FitOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_keys_parse_to_degrees() {
        let c = Coefficients::from_named([("p_0", 1.5), ("p_1", -0.3), ("p_2", 0.04)]).unwrap();
        assert_eq!(c.degrees(), vec![0, 1, 2]);
        assert_eq!(c.get(1), Some(-0.3));
        assert_eq!(c.max_degree(), Some(2));
    }

    #[test]
    fn malformed_keys_are_rejected() {
        for key in ["p_", "p_-1", "q_1", "p_x", "1"] {
            let err = Coefficients::from_named([(key, 1.0)]).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{key}: {err}");
        }
    }

    #[test]
    fn duplicate_and_non_finite_values_are_rejected() {
        assert!(Coefficients::new([(1, 1.0), (1, 2.0)]).is_err());
        assert!(Coefficients::new([(0, f64::NAN)]).is_err());
        assert!(Coefficients::new([(MAX_DEGREE + 1, 1.0)]).is_err());
    }

    #[test]
    fn truncation_keeps_low_degrees() {
        let c = Coefficients::new([(0, 1.5), (1, -0.3), (2, 0.04)]).unwrap();
        assert_eq!(c.truncated(1).degrees(), vec![0, 1]);
        assert!(c.truncated(0).get(1).is_none());
    }

    #[test]
    fn default_grid_matches_regular_grid() {
        let grid = Grid::default();
        assert_eq!(grid.len(), 51);
        assert_eq!(grid.start(), 0.0);
        assert!((grid.end() - 10.0).abs() < 1e-12);

        let regular = Grid::regular(0.0, 10.0, 0.2).unwrap();
        assert_eq!(regular.len(), 51);
        for (a, b) in grid.points().iter().zip(regular.points()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn irregular_points_are_rejected() {
        assert!(Grid::from_points(vec![0.0, 1.0, 3.0]).is_err());
        assert!(Grid::from_points(vec![0.0, -1.0]).is_err());
        assert!(Grid::from_points(vec![]).is_err());
        assert!(Grid::from_points(vec![0.0, 0.5, 1.0]).is_ok());
    }

    #[test]
    fn fine_grid_covers_the_data_span() {
        let fine = Grid::default().fine(0.1).unwrap();
        assert_eq!(fine.start(), 0.0);
        assert!(fine.end() >= 10.0 - 1e-9);
        assert_eq!(fine.len(), 101);
    }

    #[test]
    fn correlation_handles_zero_variance() {
        let cov = DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, 0.0]);
        let corr = correlation_of(&cov);
        assert_eq!(corr[(0, 0)], 1.0);
        assert_eq!(corr[(1, 1)], 1.0);
        assert_eq!(corr[(0, 1)], 0.0);
    }
}
