//! Luminex standard-curve calibration
//!
//! Turns tidy plate rows into fitted 5PL curves, control scores and
//! concentration estimates, then combines estimates for the same sample across
//! runs.
//!
//! # Pipeline
//!
//! Within one (run, analyte) pair the stages run strictly in order. Pairs are
//! independent until the cross-run consensus.
//!
//! | Stage | Produces |
//! |-------|----------|
//! | Standard analysis | Dilution ladder, fitted or imported [`StandardCurve`] |
//! | Borrowing | Donor curve for pairs without a usable standard |
//! | Controls | C1fit / C2fit on the curve's [`FitQuality`] |
//! | Resolution | One [`ConcentrationEstimate`] per well (conc, Fpos, Coff) |
//! | Consensus | One [`ConsensusEstimate`] per sample well |
//!
//! # Quality metrics
//!
//! | Metric | Description |
//! |--------|-------------|
//! | R² | Coefficient of determination of the fit |
//! | Fmin / Fmax | FI bounds of the trusted band |
//! | ConcMin / ConcMax | Concentrations at the band bounds |
//! | StMax | Highest Fpos reached by the standard series |
//! | C1fit / C2fit | Log position of each control inside its known range |
//! | Fpos | Position of a sample FI inside the band |
//! | Coff | Offset of an estimate from the midpoint of a known bound |
//!
//! # Usage
//!
//! ```rust,no_run
//! use lumicurve::calibration::{calibrate, write_sample_records, CalibrationOptions};
//! use lumicurve::data::{read_analyte_setups, read_plate_rows};
//!
//! let rows = read_plate_rows("plate.csv").unwrap();
//! let setups = read_analyte_setups("setup.csv").unwrap();
//! let options = CalibrationOptions::default().with_default_fallback_run("run_01");
//!
//! let report = calibrate(&rows, &setups, &options).unwrap();
//! for warning in &report.warnings {
//!     println!("{}", warning);
//! }
//! write_sample_records(std::io::stdout(), &report.sample_records(&options.sentinels)).unwrap();
//! ```

mod aggregate;
mod batch;
mod controls;
mod error;
mod export;
mod resolve;
mod standard;
mod types;

#[cfg(test)]
mod tests;

pub use aggregate::{aggregate, is_included, Aggregate};
pub use batch::{calibrate, CalibrationReport};
pub use controls::{control_range, evaluate_controls, CONTROL_LEVELS};
pub use error::CalibrationError;
pub use export::{
    write_curve_records, write_sample_records, CurveRecord, SampleRecord, R_SQUARED_DECIMALS,
};
pub use resolve::SampleResolver;
pub use standard::{
    has_full_standard, saturation_reach, standard_levels_present, DonorReason, LocalCurve,
    StandardAnalyzer,
};
pub use types::{
    AggregationMode, AggregationOptions, AnnotatedPoint, CalibrationOptions, CalibrationWarning,
    ConcentrationEstimate, ConsensusEstimate, ControlScore, CurveSource, DilutionPoint,
    FallbackPolicy, FitQuality, RunEstimate, StandardCurve, Warning,
};
