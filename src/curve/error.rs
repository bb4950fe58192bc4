//! Curve error types

use thiserror::Error;

/// Errors raised while building [`CurveParameters`](super::CurveParameters)
/// from external representations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CurveError {
    /// An instrument curve description did not hold a 4PL or 5PL equation
    #[error("Curve description must hold 6 or 7 numbers, found {found} in \"{description}\"")]
    InvalidDescription {
        /// The raw description string
        description: String,
        /// Number of numeric tokens found
        found: usize,
    },

    /// A persisted pipe-delimited record could not be decoded
    #[error("Invalid curve record \"{record}\": {reason}")]
    InvalidRecord { record: String, reason: String },

    /// Wrong number of values when building parameters from a slice
    #[error("Expected {expected} curve parameters, got {found}")]
    WrongParameterCount { expected: usize, found: usize },
}
