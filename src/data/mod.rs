//! Synthetic data: noise draws and their aggregation into one dataset.

pub mod dataset;
pub mod noise;

pub use dataset::*;
pub use noise::*;
