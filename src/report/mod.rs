//! Reporting utilities: per-point residuals and formatted terminal output.

pub mod format;

pub use format::*;

use crate::data::ObservedDataset;
use crate::domain::{FitResult, Grid};
use crate::error::{Error, Result};
use crate::models::evaluate;

/// Data point compared with the fitted curve.
#[derive(Debug, Clone, PartialEq)]
pub struct PointResidual {
    pub x: f64,
    pub y_obs: f64,
    pub y_sdev: f64,
    pub y_fit: f64,
    /// `y_obs - y_fit`.
    pub residual: f64,
    /// Residual in units of the point's own uncertainty (0 when it has none).
    pub pull: f64,
}

/// Fitted values and residuals for each data point.
pub fn compute_residuals(grid: &Grid, dataset: &ObservedDataset, fit: &FitResult) -> Result<Vec<PointResidual>> {
    if grid.len() != dataset.len() {
        return Err(Error::DimensionMismatch {
            what: "dataset points",
            expected: grid.len(),
            actual: dataset.len(),
        });
    }

    let sdev = dataset.sdev();
    let mut out = Vec::with_capacity(grid.len());
    for ((&x, &y_obs), y_sdev) in grid.points().iter().zip(dataset.mean()).zip(sdev) {
        let y_fit = evaluate(x, &fit.values);
        let residual = y_obs - y_fit;
        out.push(PointResidual {
            x,
            y_obs,
            y_sdev,
            y_fit,
            residual,
            pull: if y_sdev > 0.0 { residual / y_sdev } else { 0.0 },
        });
    }
    Ok(out)
}

/// The `top_n` points furthest from the curve, largest `|pull|` first.
pub fn largest_pulls(residuals: &[PointResidual], top_n: usize) -> Vec<PointResidual> {
    let mut sorted = residuals.to_vec();
    sorted.sort_by(|a, b| b.pull.abs().total_cmp(&a.pull.abs()));
    sorted.truncate(top_n);
    sorted
}
