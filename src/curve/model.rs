//! Pure 5PL evaluation and inversion
//!
//! These functions are stateless and never panic. Values that cannot be
//! inverted are reported as `0.0`, which callers replace with a positive
//! floor via [`floor_concentration`] before any log-scale arithmetic.

use serde::{Deserialize, Serialize};

use super::params::CurveParameters;

/// Decimal places kept by [`invert`]
pub const INVERT_DECIMALS: i32 = 2;

/// Decimal places kept for relative positions (Fpos)
pub const FPOS_DECIMALS: i32 = 3;

/// Smallest inner term accepted before the outer power in [`invert`].
/// An FI sitting exactly on the upper asymptote maps to a large finite value.
const SATURATION_EPS: f64 = f64::EPSILON;

/// Round to a fixed number of decimal places, leaving huge values untouched
#[inline]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    let scaled = value * scale;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / scale
}

/// Evaluate the 5PL curve at a single concentration
///
/// Relies on IEEE power semantics for the limits: at `conc = 0` with `D < 0`
/// the inner power is `+inf` and the result collapses to `A`.
#[inline]
pub fn evaluate(concentration: f64, params: &CurveParameters) -> f64 {
    let CurveParameters { a, b, c, d, e } = *params;
    a + (b - a) / (1.0 + (concentration / c).powf(d)).powf(e)
}

/// Evaluate the 5PL curve elementwise
pub fn evaluate_many(concentrations: &[f64], params: &CurveParameters) -> Vec<f64> {
    concentrations.iter().map(|&c| evaluate(c, params)).collect()
}

/// Unrounded inverse, `None` wherever the inverse is undefined in real arithmetic
fn invert_raw(fi: f64, params: &CurveParameters) -> Option<f64> {
    let CurveParameters { a, b, c, d, e } = *params;

    let ratio = (b - a) / (fi - a);
    if !(ratio > 0.0) {
        return None;
    }

    let inner = ratio.powf(1.0 / e) - 1.0;
    if inner.is_nan() || inner < 0.0 {
        return None;
    }

    let conc = c * inner.max(SATURATION_EPS).powf(1.0 / d);
    if conc == f64::INFINITY {
        // shallow slopes overflow near the upper asymptote
        return Some(f64::MAX);
    }
    (conc.is_finite() && conc >= 0.0).then_some(conc)
}

/// Side of the curve's FI range an observation falls on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionLimit {
    /// At or beyond the lower asymptote A
    Below,
    /// At or beyond the upper asymptote B
    Above,
}

/// Which asymptote `fi` reaches or crosses, `None` strictly inside `(A, B)`
///
/// Also `None` for a flat curve, where neither side is defined.
pub fn detection_limit(fi: f64, params: &CurveParameters) -> Option<DetectionLimit> {
    let relative = (fi - params.a) / params.dynamic_range();
    if !relative.is_finite() {
        return None;
    }
    if relative <= 0.0 {
        Some(DetectionLimit::Below)
    } else if relative >= 1.0 {
        Some(DetectionLimit::Above)
    } else {
        None
    }
}

/// Convert an FI back into a concentration, rounded to two decimals
///
/// Returns `0.0` for FI values below `A`, above `B`, or otherwise not
/// invertible.
pub fn invert(fi: f64, params: &CurveParameters) -> f64 {
    invert_raw(fi, params)
        .map(|conc| round_to(conc, INVERT_DECIMALS))
        .unwrap_or(0.0)
}

/// Replace non-positive (or NaN) concentrations with the positive `floor`
#[inline]
pub fn floor_concentration(concentration: f64, floor: f64) -> f64 {
    if concentration > 0.0 {
        concentration
    } else {
        floor
    }
}

/// FI and concentration window covering a central fraction of the A–B range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBand {
    /// Central fraction of the dynamic range used
    pub fraction: f64,
    /// Lower FI bound of the trusted region
    pub f_min: f64,
    /// Upper FI bound of the trusted region
    pub f_max: f64,
    /// Concentration at `f_min`
    pub conc_min: f64,
    /// Concentration at `f_max`
    pub conc_max: f64,
}

impl ConfidenceBand {
    /// Compute the band for `fraction` (e.g. 0.9 trims 5% at each asymptote)
    pub fn new(params: &CurveParameters, fraction: f64) -> Self {
        let margin = (1.0 - fraction) / 2.0 * params.dynamic_range();
        let f_min = params.a + margin;
        let f_max = params.b - margin;

        Self {
            fraction,
            f_min,
            f_max,
            conc_min: invert(f_min, params),
            conc_max: invert(f_max, params),
        }
    }

    /// Relative position of `fi` inside the band (Fpos), three decimals
    ///
    /// `0` sits on `f_min`, `1` on `f_max`. Values outside the band are not
    /// clamped. `None` when the band has no width.
    pub fn position(&self, fi: f64) -> Option<f64> {
        let width = self.f_max - self.f_min;
        if !width.is_finite() || width.abs() < f64::EPSILON || !fi.is_finite() {
            return None;
        }
        Some(round_to((fi - self.f_min) / width, FPOS_DECIMALS))
    }

    /// Whether `fi` falls inside `[f_min, f_max]`
    pub fn contains(&self, fi: f64) -> bool {
        fi >= self.f_min.min(self.f_max) && fi <= self.f_max.max(self.f_min)
    }
}
