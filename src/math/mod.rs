//! Mathematical utilities: whitened least squares and chi-square statistics.

pub mod ols;
pub mod stats;

pub use ols::*;
pub use stats::*;
