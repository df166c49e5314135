//! `polyfit-noise` library crate.
//!
//! The binary (`polyfit`) is a thin wrapper around this library so that:
//!
//! - the sampling and fitting core is testable without spawning processes
//! - reporting, plotting and export stay separate from the numerics

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
