//! Polynomial model implementation.
//!
//! Models are implemented as small, pure functions so that fitting/search code can
//! stay generic over `FitFunction`.

pub mod polynomial;

pub use polynomial::*;
