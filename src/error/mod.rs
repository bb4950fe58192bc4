use thiserror::Error;

use crate::calibration::CalibrationError;
use crate::curve::CurveError;
use crate::data::DataError;
use crate::optimize::FitError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LumicurveError {
    #[error("Error in the curve model: {0}")]
    CurveError(#[from] CurveError),
    #[error("Error while fitting: {0}")]
    FitError(#[from] FitError),
    #[error("Error in plate data: {0}")]
    DataError(#[from] DataError),
    #[error("Calibration error: {0}")]
    CalibrationError(#[from] CalibrationError),
}
