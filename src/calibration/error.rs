//! Calibration error types

use thiserror::Error;

use crate::curve::CurveError;
use crate::data::DataError;
use crate::optimize::FitError;

/// Errors that stop a (run, analyte) pair, or the whole batch for option errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Curve import failed
    #[error(transparent)]
    Curve(#[from] CurveError),

    /// The fitter rejected its input
    #[error(transparent)]
    Fit(#[from] FitError),

    /// Boundary data could not be interpreted
    #[error(transparent)]
    Data(#[from] DataError),

    /// No nominal S1 concentration to build the dilution series from
    #[error("No top standard concentration for run {run}, analyte {analyte}")]
    MissingTopConcentration { run: String, analyte: String },

    /// A control range string could not be parsed
    #[error("Control C{level} range: {source}")]
    InvalidControlRange { level: u8, source: DataError },

    /// Options could not be loaded
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Invalid option value
    #[error("Invalid parameter: {param} = {value}")]
    InvalidParameter { param: String, value: String },
}
