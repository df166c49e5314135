//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - polynomial coefficients keyed by degree (`Coefficients`)
//! - the regular sample grid (`Grid`)
//! - run configuration (`RunConfig`)
//! - fit outputs (`FitResult`, `UncertainValues`, etc.)

pub mod types;

pub use types::*;
