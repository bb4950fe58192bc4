use thiserror::Error;

/// Errors raised at the plate-data boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// Error encountered when reading or writing CSV data
    #[error("CSV error: {0}")]
    CSVError(String),
    /// An FI cell held text that is neither a number nor a known marker
    #[error("Unrecognized FI reading \"{raw}\"")]
    InvalidReading { raw: String },
    /// A numeric field could not be parsed
    #[error("Invalid number \"{raw}\" in column {column}")]
    InvalidNumber { raw: String, column: String },
    /// A concentration range did not have the `<min>-<max>` form
    #[error("Invalid concentration range \"{raw}\": {reason}")]
    InvalidRange { raw: String, reason: String },
}
