//! Boundary data contracts
//!
//! Everything the calibration engine consumes from the upstream plate parser:
//! tidy [`PlateRow`]s with raw FI cells, per-analyte [`AnalyteSetup`]s, the
//! [`FiReading`] marker translation and known [`ConcentrationRange`]s.

pub mod error;
pub mod parser;
pub mod range;
pub mod reading;
pub mod row;

pub use error::DataError;
pub use parser::{
    read_analyte_setups, read_analyte_setups_from_reader, read_plate_rows,
    read_plate_rows_from_reader,
};
pub use range::ConcentrationRange;
pub use reading::{parse_decimal, FiReading, SentinelCodes};
pub use row::{AnalyteSetup, PlateRow, PlateRowBuilder, WellType};
