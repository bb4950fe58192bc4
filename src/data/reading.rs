//! Instrument FI cells and their marker strings

use serde::{Deserialize, Serialize};

use super::error::DataError;

/// Parse a decimal number written with either `.` or `,` as separator
pub fn parse_decimal(raw: &str) -> Option<f64> {
    raw.trim().replace(',', ".").parse::<f64>().ok()
}

/// Numeric codes written in place of a concentration for unreadable FI values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelCodes {
    /// `OOR >`
    pub above_range: f64,
    /// `OOR <`
    pub below_range: f64,
    /// `---` or an empty cell
    pub no_value: f64,
    /// `***` and unrecognized markers
    pub flagged: f64,
}

impl Default for SentinelCodes {
    fn default() -> Self {
        Self {
            above_range: -1.0,
            below_range: -2.0,
            no_value: -1.0,
            flagged: -3.0,
        }
    }
}

/// A single FI cell after marker translation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FiReading {
    /// A usable fluorescence intensity
    Valid(f64),
    /// Instrument reported the well below the blank (`OOR <`)
    BelowBlank,
    /// Instrument reported the well above the measurable range (`OOR >`)
    AboveRange,
    /// No reading available (`---` or empty)
    NoValue,
    /// Instrument flagged the well as unreadable (`***`)
    InstrumentFlagged,
}

impl FiReading {
    /// Translate a raw FI cell
    ///
    /// | Raw | Reading |
    /// |-----|---------|
    /// | `1234,5` / `1234.5` | `Valid(1234.5)` |
    /// | `1234.5*` | `Valid(1234.5)`, extrapolated |
    /// | `OOR <` | `BelowBlank` |
    /// | `OOR >` | `AboveRange` |
    /// | `---`, empty | `NoValue` |
    /// | `***` | `InstrumentFlagged` |
    ///
    /// Returns the reading and whether the instrument marked the value as
    /// extrapolated with a trailing `*`.
    pub fn parse_marked(raw: &str) -> Result<(Self, bool), DataError> {
        let trimmed = raw.trim();
        let reading = match trimmed {
            "" | "---" => Self::NoValue,
            "***" => Self::InstrumentFlagged,
            "OOR <" => Self::BelowBlank,
            "OOR >" => Self::AboveRange,
            _ => {
                let (number, extrapolated) = match trimmed.strip_suffix('*') {
                    Some(stripped) => (stripped, true),
                    None => (trimmed, false),
                };
                return parse_decimal(number)
                    .filter(|v| v.is_finite())
                    .map(|v| (Self::Valid(v), extrapolated))
                    .ok_or_else(|| DataError::InvalidReading {
                        raw: raw.to_string(),
                    });
            }
        };
        Ok((reading, false))
    }

    /// Translate a raw FI cell, dropping the extrapolation marker
    pub fn parse(raw: &str) -> Result<Self, DataError> {
        Self::parse_marked(raw).map(|(reading, _)| reading)
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Valid(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Numeric output code for non-valid readings
    pub fn sentinel_code(&self, codes: &SentinelCodes) -> Option<f64> {
        match self {
            Self::Valid(_) => None,
            Self::AboveRange => Some(codes.above_range),
            Self::BelowBlank => Some(codes.below_range),
            Self::NoValue => Some(codes.no_value),
            Self::InstrumentFlagged => Some(codes.flagged),
        }
    }
}
