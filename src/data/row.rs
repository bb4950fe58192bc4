//! Tidy plate rows and per-analyte setup
//!
//! One [`PlateRow`] is one well read on one analyte channel. The FI cell is
//! kept as raw text so marker strings survive until the resolver translates
//! them.
//!
//! # Example
//!
//! ```rust
//! use lumicurve::data::{FiReading, PlateRow, WellType};
//!
//! let row = PlateRow::builder("run_a", "IL-6", "A1")
//!     .sample_type("S1")
//!     .fi("17381,2")
//!     .build();
//!
//! assert_eq!(row.well_type(), WellType::Standard(1));
//! assert_eq!(row.reading().unwrap(), FiReading::Valid(17381.2));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::DataError;
use super::range::ConcentrationRange;
use super::reading::FiReading;

/// Role of a well on the plate, derived from its type label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WellType {
    /// Dilution-series standard `S<n>`, 1 is the most concentrated
    Standard(u32),
    /// Buffer-only blank
    Blank,
    /// Quality control `C<n>` with a known concentration range
    Control(u8),
    /// Unknown sample
    Sample,
}

impl WellType {
    /// Classify a type label
    ///
    /// `S1`..`Sn` (case-insensitive, an optional leading `e` marks re-run
    /// standards), `Blank`/`B`, `C1`/`C2` (optional leading `e`), anything else
    /// is a sample.
    pub fn parse(label: &str) -> Self {
        let trimmed = label.trim();
        if trimmed.eq_ignore_ascii_case("blank") || trimmed.eq_ignore_ascii_case("b") {
            return Self::Blank;
        }

        let core = match trimmed.as_bytes().first() {
            Some(b'e') | Some(b'E') if trimmed.len() > 2 => &trimmed[1..],
            _ => trimmed,
        };
        let mut chars = core.chars();
        let prefix = chars.next().map(|c| c.to_ascii_uppercase());
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Self::Sample;
        }

        match (prefix, digits.parse::<u32>()) {
            (Some('S'), Ok(n)) if n > 0 => Self::Standard(n),
            (Some('C'), Ok(n)) if n == 1 || n == 2 => Self::Control(n as u8),
            _ => Self::Sample,
        }
    }

    pub fn is_standard_or_blank(&self) -> bool {
        matches!(self, Self::Standard(_) | Self::Blank)
    }
}

impl fmt::Display for WellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard(n) => write!(f, "S{}", n),
            Self::Blank => write!(f, "Blank"),
            Self::Control(n) => write!(f, "C{}", n),
            Self::Sample => write!(f, "Sample"),
        }
    }
}

/// One well on one analyte channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlateRow {
    /// Run identifier
    pub run: String,
    /// Analyte (protein) name
    pub analyte: String,
    /// Well position, e.g. `A1`
    pub well: String,
    /// Raw type label (`S1`, `Blank`, `C1`, `X12`, ...)
    pub sample_type: String,
    /// Sample name, if the plate layout names one
    pub sample: Option<String>,
    /// Raw FI cell as exported by the instrument
    pub fi: String,
    /// Independently known concentration bound for this sample
    pub bound: Option<ConcentrationRange>,
}

impl PlateRow {
    pub fn builder(
        run: impl Into<String>,
        analyte: impl Into<String>,
        well: impl Into<String>,
    ) -> PlateRowBuilder {
        PlateRowBuilder::new(run, analyte, well)
    }

    pub fn well_type(&self) -> WellType {
        WellType::parse(&self.sample_type)
    }

    /// Translate the raw FI cell
    pub fn reading(&self) -> Result<FiReading, DataError> {
        FiReading::parse(&self.fi)
    }

    /// Name used to match the same physical sample across runs
    ///
    /// Falls back to the type label when no sample name is given.
    pub fn sample_key(&self) -> &str {
        self.sample.as_deref().unwrap_or(&self.sample_type)
    }
}

/// Builder for [`PlateRow`]
#[derive(Debug, Clone)]
pub struct PlateRowBuilder {
    row: PlateRow,
}

impl PlateRowBuilder {
    pub fn new(run: impl Into<String>, analyte: impl Into<String>, well: impl Into<String>) -> Self {
        Self {
            row: PlateRow {
                run: run.into(),
                analyte: analyte.into(),
                well: well.into(),
                sample_type: "Sample".to_string(),
                ..Default::default()
            },
        }
    }

    /// Set the type label
    pub fn sample_type(mut self, label: impl Into<String>) -> Self {
        self.row.sample_type = label.into();
        self
    }

    pub fn sample(mut self, name: impl Into<String>) -> Self {
        self.row.sample = Some(name.into());
        self
    }

    /// Set the raw FI cell
    pub fn fi(mut self, raw: impl Into<String>) -> Self {
        self.row.fi = raw.into();
        self
    }

    /// Set a numeric FI
    pub fn fi_value(mut self, value: f64) -> Self {
        self.row.fi = value.to_string();
        self
    }

    pub fn bound(mut self, range: ConcentrationRange) -> Self {
        self.row.bound = Some(range);
        self
    }

    pub fn build(self) -> PlateRow {
        self.row
    }
}

/// Per (run, analyte) inputs that do not come from the wells
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyteSetup {
    pub run: String,
    pub analyte: String,
    /// Nominal concentration of the `S1` standard
    pub top_concentration: Option<f64>,
    /// Known range of control `C1`, as printed (`"50-200"`)
    pub c1_range: Option<String>,
    /// Known range of control `C2`
    pub c2_range: Option<String>,
    /// Instrument curve description; when present the curve is imported
    /// instead of fitted
    pub curve: Option<String>,
}

impl AnalyteSetup {
    pub fn new(run: impl Into<String>, analyte: impl Into<String>) -> Self {
        Self {
            run: run.into(),
            analyte: analyte.into(),
            ..Default::default()
        }
    }

    pub fn with_top_concentration(mut self, top: f64) -> Self {
        self.top_concentration = Some(top);
        self
    }

    pub fn with_control_ranges(mut self, c1: impl Into<String>, c2: impl Into<String>) -> Self {
        self.c1_range = Some(c1.into());
        self.c2_range = Some(c2.into());
        self
    }

    pub fn with_curve(mut self, description: impl Into<String>) -> Self {
        self.curve = Some(description.into());
        self
    }

    /// Raw range string for control level `level`
    pub fn control_range(&self, level: u8) -> Option<&str> {
        match level {
            1 => self.c1_range.as_deref(),
            2 => self.c2_range.as_deref(),
            _ => None,
        }
    }
}
