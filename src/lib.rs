pub mod calibration;
pub mod curve;
pub mod data;
pub mod error;
pub mod optimize;

pub use crate::calibration::{calibrate, CalibrationOptions, CalibrationReport};
pub use crate::curve::{evaluate, invert, ConfidenceBand, CurveParameters};
pub use crate::data::{AnalyteSetup, FiReading, PlateRow, WellType};
pub use error::LumicurveError;

pub mod prelude {
    pub mod curve {
        pub use crate::curve::{
            evaluate, evaluate_many, floor_concentration, invert, ConfidenceBand, CurveParameters,
        };
    }
    pub mod data {
        pub use crate::data::{
            read_analyte_setups, read_plate_rows, AnalyteSetup, ConcentrationRange, FiReading,
            PlateRow, SentinelCodes, WellType,
        };
    }
    pub mod calibration {
        pub use crate::calibration::{
            calibrate, write_curve_records, write_sample_records, AggregationMode,
            CalibrationOptions, CalibrationReport, CalibrationWarning, CurveSource,
            FallbackPolicy, StandardCurve, Warning,
        };
    }

    pub use crate::calibration::{calibrate, CalibrationOptions, CalibrationReport};
    pub use crate::curve::CurveParameters;
    pub use crate::data::{AnalyteSetup, FiReading, PlateRow, WellType};
    pub use crate::optimize::{CurveFitter, FitOptions};
    pub use crate::LumicurveError;
}
