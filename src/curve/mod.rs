//! Five-parameter logistic (5PL) calibration curves
//!
//! The curve maps an analyte concentration to the fluorescence intensity (FI)
//! reported by the instrument:
//!
//! ```text
//! FI = A + (B - A) / (1 + (conc / C)^D)^E
//! ```
//!
//! | Parameter | Meaning |
//! |-----------|---------|
//! | A | Lower asymptote, FI at zero concentration |
//! | B | Upper asymptote, FI at saturation |
//! | C | Inflection-point concentration |
//! | D | Slope factor, constrained to `[-1, 0)` |
//! | E | Asymmetry factor, constrained to `(0.1, 5]` |
//!
//! # Usage
//!
//! ```rust
//! use lumicurve::curve::{evaluate, invert, CurveParameters};
//!
//! let params = CurveParameters::new(30.0, 18000.0, 300.0, -0.9, 1.2);
//! let fi = evaluate(120.0, &params);
//! assert!((invert(fi, &params) - 120.0).abs() < 0.01);
//! ```

mod error;
mod model;
mod params;

pub use error::CurveError;
pub use model::{
    detection_limit, evaluate, evaluate_many, floor_concentration, invert, round_to,
    ConfidenceBand, DetectionLimit, FPOS_DECIMALS, INVERT_DECIMALS,
};
pub use params::{CurveParameters, D_MAX, D_MIN, E_MAX, E_MIN, RECORD_DECIMALS};
