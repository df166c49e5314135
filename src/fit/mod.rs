//! Least squares fitting.
//!
//! - `weights`: whitening by the dataset covariance
//! - `strategy`: Levenberg–Marquardt and variable projection
//! - `fitter`: the `fit` entry point and its options

pub mod fitter;
pub mod strategy;
pub mod weights;

pub use fitter::*;
pub use strategy::{LevenbergMarquardt, SolveStrategy, VariableProjection};
pub use weights::Whitening;
