//! Calibration options, curve quality and result types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use super::error::CalibrationError;
use crate::curve::{ConfidenceBand, CurveParameters, DetectionLimit};
use crate::data::{ConcentrationRange, FiReading, SentinelCodes, WellType};
use crate::optimize::FitOptions;

// ============================================================================
// Options
// ============================================================================

/// How concentration estimates from several runs are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AggregationMode {
    /// Arithmetic mean and sample standard deviation
    #[default]
    Arithmetic,
    /// Geometric mean of absolute concentrations and geometric standard deviation
    Geometric,
}

/// Cross-run aggregation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationOptions {
    /// Estimates with Fpos at or below this are excluded from the mean
    pub min_fpos: f64,
    pub mode: AggregationMode,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            min_fpos: 0.1,
            mode: AggregationMode::Arithmetic,
        }
    }
}

/// Which run lends its standard curve to runs without a usable one
///
/// A per-run entry wins over the default. Donors must own their curve;
/// borrowing never chains.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackPolicy {
    pub default_run: Option<String>,
    pub per_run: BTreeMap<String, String>,
}

impl FallbackPolicy {
    pub fn with_default_run(mut self, run: impl Into<String>) -> Self {
        self.default_run = Some(run.into());
        self
    }

    pub fn with_donor(mut self, run: impl Into<String>, donor: impl Into<String>) -> Self {
        self.per_run.insert(run.into(), donor.into());
        self
    }

    /// Donor run for `run`, never `run` itself
    pub fn donor_for(&self, run: &str) -> Option<&str> {
        self.per_run
            .get(run)
            .map(String::as_str)
            .or(self.default_run.as_deref())
            .filter(|donor| *donor != run)
    }
}

/// Options for the calibration pipeline
///
/// # Example
///
/// ```rust
/// use lumicurve::calibration::{AggregationMode, CalibrationOptions};
///
/// let options = CalibrationOptions::default()
///     .with_confidence(0.8)
///     .with_aggregation_mode(AggregationMode::Geometric)
///     .with_default_fallback_run("run_2023_01");
/// assert_eq!(options.fallback.donor_for("run_x"), Some("run_2023_01"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOptions {
    /// Fold dilution between consecutive standards
    pub dilution_factor: f64,
    /// Number of standard levels; the last one is the floor point
    pub series_length: u32,
    /// Concentration assigned to the floor point and the blank
    pub zero_value: f64,
    /// Central fraction of the A–B range treated as trusted
    pub confidence: f64,
    /// Positive value replacing non-invertible (zero) concentrations
    pub concentration_floor: f64,
    /// Minimum distinct dilution levels with a valid FI
    pub min_levels: usize,
    /// Minimum valid standard wells
    pub min_points: usize,
    /// R² below this raises a warning
    pub min_r_squared: f64,
    /// Saturation reach below this raises a warning
    pub min_saturation_reach: f64,
    /// Added to the concentration before taking the log in Coff
    pub coff_offset: f64,
    pub fallback: FallbackPolicy,
    pub aggregation: AggregationOptions,
    pub sentinels: SentinelCodes,
    pub fit: FitOptions,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            dilution_factor: 4.0,
            series_length: 8,
            zero_value: 0.1,
            confidence: 0.9,
            concentration_floor: 0.01,
            min_levels: 5,
            min_points: 2,
            min_r_squared: 0.95,
            min_saturation_reach: 0.6,
            coff_offset: 0.1,
            fallback: FallbackPolicy::default(),
            aggregation: AggregationOptions::default(),
            sentinels: SentinelCodes::default(),
            fit: FitOptions::default(),
        }
    }
}

impl CalibrationOptions {
    /// Tighter quality thresholds for reporting
    pub fn strict() -> Self {
        Self {
            min_r_squared: 0.99,
            aggregation: AggregationOptions {
                min_fpos: 0.2,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Permissive settings for exploratory plates
    pub fn lenient() -> Self {
        Self {
            min_levels: 5,
            min_r_squared: 0.9,
            aggregation: AggregationOptions {
                min_fpos: 0.05,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Parse options from JSON, missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, CalibrationError> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| CalibrationError::InvalidOptions(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Read options from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let json = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CalibrationError::InvalidOptions(e.to_string()))?;
        Self::from_json_str(&json)
    }

    /// Reject settings that make the pipeline meaningless
    pub fn validate(&self) -> Result<(), CalibrationError> {
        let invalid = |param: &str, value: String| {
            Err(CalibrationError::InvalidParameter {
                param: param.to_string(),
                value,
            })
        };

        if !(self.dilution_factor > 1.0) {
            return invalid("dilution_factor", self.dilution_factor.to_string());
        }
        if self.series_length < 2 {
            return invalid("series_length", self.series_length.to_string());
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return invalid("confidence", self.confidence.to_string());
        }
        if !(self.concentration_floor > 0.0) {
            return invalid("concentration_floor", self.concentration_floor.to_string());
        }
        if !(self.zero_value > 0.0) {
            return invalid("zero_value", self.zero_value.to_string());
        }
        Ok(())
    }

    pub fn with_dilution_factor(mut self, factor: f64) -> Self {
        self.dilution_factor = factor;
        self
    }

    pub fn with_series_length(mut self, length: u32) -> Self {
        self.series_length = length;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_min_levels(mut self, levels: usize) -> Self {
        self.min_levels = levels;
        self
    }

    pub fn with_min_r_squared(mut self, min_r_squared: f64) -> Self {
        self.min_r_squared = min_r_squared;
        self
    }

    pub fn with_min_fpos(mut self, min_fpos: f64) -> Self {
        self.aggregation.min_fpos = min_fpos;
        self
    }

    pub fn with_aggregation_mode(mut self, mode: AggregationMode) -> Self {
        self.aggregation.mode = mode;
        self
    }

    /// Use `run` as the donor for every run without a usable standard
    pub fn with_default_fallback_run(mut self, run: impl Into<String>) -> Self {
        self.fallback.default_run = Some(run.into());
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_sentinels(mut self, sentinels: SentinelCodes) -> Self {
        self.sentinels = sentinels;
        self
    }

    pub fn with_fit_options(mut self, fit: FitOptions) -> Self {
        self.fit = fit;
        self
    }
}

// ============================================================================
// Curves and quality
// ============================================================================

/// Where the parameters of a curve came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveSource {
    /// Fitted to this run's own standard series
    Fitted,
    /// Taken from the instrument's curve description
    Imported,
    /// Copied from another run's curve
    Borrowed { from_run: String },
}

impl CurveSource {
    pub fn is_borrowed(&self) -> bool {
        matches!(self, Self::Borrowed { .. })
    }
}

impl fmt::Display for CurveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurveSource::Fitted => write!(f, "fitted"),
            CurveSource::Imported => write!(f, "imported"),
            CurveSource::Borrowed { from_run } => write!(f, "borrowed from {}", from_run),
        }
    }
}

/// One standard well placed on the dilution ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DilutionPoint {
    pub well: String,
    pub well_type: WellType,
    /// Nominal concentration, the floor point carries the zero surrogate
    pub concentration: f64,
    pub fi: f64,
}

/// A dilution point with its back-calculated concentration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedPoint {
    pub point: DilutionPoint,
    /// Concentration read back through the curve, floored
    pub back_calculated: f64,
    /// Relative position inside the confidence band
    pub fpos: Option<f64>,
}

/// Control-level summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlScore {
    /// Control level, 1 or 2
    pub level: u8,
    pub range: ConcentrationRange,
    /// Per-well `(well, estimated concentration, Cfit)`
    pub wells: Vec<(String, f64, Option<f64>)>,
    /// Mean Cfit over the wells with a defined score
    pub mean_fit: Option<f64>,
}

/// Derived quality of one curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    pub source: CurveSource,
    /// `None` for imported curves
    pub r_squared: Option<f64>,
    /// Whether the optimizer reported convergence (imported curves count as converged)
    pub converged: bool,
    /// Highest Fpos among the standard points (StMax)
    pub saturation_reach: Option<f64>,
    pub band: ConfidenceBand,
    pub controls: Vec<ControlScore>,
}

impl FitQuality {
    /// Mean Cfit for control `level` (C1fit, C2fit)
    pub fn control_fit(&self, level: u8) -> Option<f64> {
        self.controls
            .iter()
            .find(|c| c.level == level)
            .and_then(|c| c.mean_fit)
    }
}

/// A calibrated (run, analyte) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardCurve {
    pub run: String,
    pub analyte: String,
    pub params: CurveParameters,
    pub quality: FitQuality,
    /// The run's own standard series, annotated against `params`
    pub points: Vec<AnnotatedPoint>,
    /// All `series_length` standard labels were present on the plate
    pub has_full_standard: bool,
}

impl StandardCurve {
    /// Whether this run's parameters can lend to other runs or feed the consensus
    pub fn owns_parameters(&self) -> bool {
        !self.quality.source.is_borrowed()
    }

    /// Run whose standard produced the parameters
    pub fn parameter_run(&self) -> &str {
        match &self.quality.source {
            CurveSource::Borrowed { from_run } => from_run,
            _ => &self.run,
        }
    }
}

// ============================================================================
// Estimates
// ============================================================================

/// One well resolved against one curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationEstimate {
    pub run: String,
    pub analyte: String,
    pub well: String,
    pub sample_type: String,
    pub sample: String,
    /// Run whose curve was applied
    pub curve_run: String,
    pub reading: FiReading,
    /// Trailing `*` in the instrument export
    pub extrapolated: bool,
    /// Floored concentration, `None` for non-valid readings
    pub concentration: Option<f64>,
    pub fpos: Option<f64>,
    pub coff: Option<f64>,
}

impl ConcentrationEstimate {
    /// Concentration for output, sentinel code for non-valid readings
    pub fn output_concentration(&self, codes: &SentinelCodes) -> f64 {
        self.concentration
            .or_else(|| self.reading.sentinel_code(codes))
            .unwrap_or(codes.flagged)
    }
}

/// One run's contribution to a consensus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEstimate {
    pub curve_run: String,
    pub concentration: f64,
    pub fpos: Option<f64>,
    /// Asymptote the FI reaches on this curve, if any
    pub detection: Option<DetectionLimit>,
}

/// Combined estimate for one sample well over several runs' curves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusEstimate {
    pub run: String,
    pub analyte: String,
    pub well: String,
    pub sample: String,
    pub mode: AggregationMode,
    /// Mean over the included estimates (two decimals)
    pub mean: f64,
    /// Sample standard deviation (geometric in geometric mode), `None` below two estimates
    pub std: Option<f64>,
    /// Mean Fpos over all estimates, included or not (three decimals)
    pub fpos_mean: Option<f64>,
    pub included: usize,
    pub contributions: Vec<RunEstimate>,
}

// ============================================================================
// Warnings
// ============================================================================

/// Recoverable conditions found while calibrating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Warning {
    /// The local standard cannot support a fit
    NoStandardUsable { reason: String },
    /// The curve was copied from another run
    BorrowedCurve { from_run: String },
    /// The optimizer stopped without meeting its convergence criterion
    FitNotConverged { iterations: u64 },
    /// R² below the configured minimum
    PoorFit { r_squared: f64, threshold: f64 },
    /// The standard series does not reach far into the upper plateau
    LowSaturationReach { reach: f64, threshold: f64 },
    /// Some standard labels are missing from the plate
    IncompleteStandard { found: usize, expected: usize },
    /// Control mean Cfit outside `[0, 1]`
    ControlOutOfRange { level: u8, fit: f64 },
    /// Control wells present without a known range
    MissingControlRange { level: u8 },
    /// Instrument marker in place of an FI value
    FlaggedReading { well: String, reading: FiReading },
    /// Unrecognized text in place of an FI value, treated as flagged
    UnmappedMarker { well: String, raw: String },
    /// Valid FI at or below the lower asymptote, concentration floored
    BelowDetection { well: String, fi: f64 },
    /// Valid FI at or above the upper asymptote, concentration saturated
    AboveDetection { well: String, fi: f64 },
    /// The pair could not be calibrated at all
    PairExcluded { reason: String },
    /// Analyte not listed in the setup table
    UnknownAnalyte,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::NoStandardUsable { reason } => write!(f, "No standard usable: {}", reason),
            Warning::BorrowedCurve { from_run } => {
                write!(f, "Standard from run {} used", from_run)
            }
            Warning::FitNotConverged { iterations } => {
                write!(f, "Fit did not converge after {} iterations", iterations)
            }
            Warning::PoorFit {
                r_squared,
                threshold,
            } => write!(f, "R²={:.4} below minimum {:.4}", r_squared, threshold),
            Warning::LowSaturationReach { reach, threshold } => write!(
                f,
                "Standard reaches Fpos {:.3}, below {:.3}; curve is extrapolated",
                reach, threshold
            ),
            Warning::IncompleteStandard { found, expected } => {
                write!(f, "Only {} of {} standard levels present", found, expected)
            }
            Warning::ControlOutOfRange { level, fit } => {
                write!(f, "C{}fit={:.3} outside [0, 1]", level, fit)
            }
            Warning::MissingControlRange { level } => {
                write!(f, "No known range for control C{}", level)
            }
            Warning::FlaggedReading { well, reading } => {
                write!(f, "Well {} reported {:?}", well, reading)
            }
            Warning::UnmappedMarker { well, raw } => {
                write!(f, "Well {} holds unrecognized FI \"{}\"", well, raw)
            }
            Warning::BelowDetection { well, fi } => {
                write!(f, "Well {} FI {} at or below the lower asymptote", well, fi)
            }
            Warning::AboveDetection { well, fi } => {
                write!(f, "Well {} FI {} at or above the upper asymptote", well, fi)
            }
            Warning::PairExcluded { reason } => write!(f, "Excluded: {}", reason),
            Warning::UnknownAnalyte => write!(f, "Analyte not in setup, skipped"),
        }
    }
}

/// A [`Warning`] tagged with the pair it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationWarning {
    pub run: String,
    pub analyte: String,
    pub warning: Warning,
}

impl CalibrationWarning {
    pub fn new(run: impl Into<String>, analyte: impl Into<String>, warning: Warning) -> Self {
        Self {
            run: run.into(),
            analyte: analyte.into(),
            warning,
        }
    }
}

impl fmt::Display for CalibrationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} / {}] {}", self.run, self.analyte, self.warning)
    }
}
