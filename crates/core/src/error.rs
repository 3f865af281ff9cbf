//! Error types for madchange

use thiserror::Error;

/// Main error type for madchange operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid band stack dimensions: {bands} bands of {rows}x{cols}")]
    InvalidDimensions { bands: usize, rows: usize, cols: usize },

    #[error("Band stack must contain at least one band")]
    EmptyStack,

    #[error(
        "Band stack shape mismatch: expected ({}, {}, {}), got ({}, {}, {})",
        expected.0, expected.1, expected.2, actual.0, actual.1, actual.2
    )]
    ShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Linear algebra failure: {0}")]
    LinearAlgebra(String),

    #[error("Numeric divergence: convergence delta is {delta}")]
    NumericDivergence { delta: f64 },

    #[error("No IR-MAD iteration completed successfully: {cause}")]
    NoConvergedIteration {
        #[source]
        cause: Box<Error>,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error is a per-iteration numerical failure that an
    /// iterative algorithm may recover from by keeping an earlier result.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::LinearAlgebra(_) | Error::NumericDivergence { .. })
    }
}

/// Result type alias for madchange operations
pub type Result<T> = std::result::Result<T, Error>;
