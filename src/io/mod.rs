//! Input/output helpers.
//!
//! - run exports to JSON (`export`)

pub mod export;

pub use export::*;
