//! Error taxonomy shared by every stage of the pipeline.
//!
//! Each variant maps to a process exit code (see [`Error::exit_code`]) so the
//! binary can stay a thin wrapper, the same way a run failure is reported
//! whether it comes from argument validation or from the solver.

use crate::domain::FitResult;

/// Errors produced by sampling, aggregation and fitting.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid degree, sample size, noise or solver setting.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Fewer than two draws; the sample covariance is undefined.
    #[error("Need at least 2 samples to estimate a covariance, got {count}")]
    InsufficientSamples { count: usize },

    /// The data covariance cannot be inverted (or is not finite).
    #[error("Data covariance is singular: {0}")]
    SingularCovariance(String),

    /// The nonlinear search ran out of iterations.
    ///
    /// The best-so-far estimate is attached with `converged == false`; it must
    /// not be presented as a valid fit.
    #[error("Fit did not converge within {} iterations (chi2={:.6})", .0.iterations, .0.chi2)]
    NonConvergentFit(Box<FitResult>),

    /// Two stages were connected with inconsistent lengths.
    #[error("Dimension mismatch: expected {expected} {what}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Failure writing an export file.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Configuration(_) | Error::Io { .. } => 2,
            Error::InsufficientSamples { .. } | Error::DimensionMismatch { .. } => 3,
            Error::SingularCovariance(_) | Error::NonConvergentFit(_) => 4,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
