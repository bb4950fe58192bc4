use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::CurveError;
use super::model::round_to;

/// Lower bound of the slope factor D (inclusive)
pub const D_MIN: f64 = -1.0;
/// Upper bound of the slope factor D (exclusive)
pub const D_MAX: f64 = 0.0;
/// Lower bound of the asymmetry factor E (exclusive)
pub const E_MIN: f64 = 0.1;
/// Upper bound of the asymmetry factor E (inclusive)
pub const E_MAX: f64 = 5.0;

/// Decimal places used by the pipe-delimited record
pub const RECORD_DECIMALS: i32 = 3;

const RECORD_SEPARATOR: char = '|';

/// The five parameters of a 5PL calibration curve
///
/// `FI = A + (B - A) / (1 + (conc / C)^D)^E`
///
/// With `D < 0` and `E > 0` the curve rises from `A` at zero concentration
/// to `B` at saturation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveParameters {
    /// Lower asymptote (FI floor)
    pub a: f64,
    /// Upper asymptote (FI ceiling)
    pub b: f64,
    /// Inflection-point concentration
    pub c: f64,
    /// Slope factor, in `[-1, 0)`
    pub d: f64,
    /// Asymmetry factor, in `(0.1, 5]`
    pub e: f64,
}

impl Default for CurveParameters {
    fn default() -> Self {
        Self::INITIAL_GUESS
    }
}

impl CurveParameters {
    /// Domain starting point for fitting, independent of the data
    pub const INITIAL_GUESS: CurveParameters = CurveParameters {
        a: 10.0,
        b: 1000.0,
        c: 10000.0,
        d: -1.0,
        e: 1.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64) -> Self {
        Self { a, b, c, d, e }
    }

    /// Build from `[A, B, C, D, E]`
    pub fn from_slice(values: &[f64]) -> Result<Self, CurveError> {
        match *values {
            [a, b, c, d, e] => Ok(Self { a, b, c, d, e }),
            _ => Err(CurveError::WrongParameterCount {
                expected: 5,
                found: values.len(),
            }),
        }
    }

    pub fn to_array(&self) -> [f64; 5] {
        [self.a, self.b, self.c, self.d, self.e]
    }

    /// FI span between the two asymptotes
    pub fn dynamic_range(&self) -> f64 {
        self.b - self.a
    }

    /// Whether D and E sit inside the admissible fitting bounds
    pub fn within_bounds(&self) -> bool {
        (D_MIN..D_MAX).contains(&self.d) && self.e > E_MIN && self.e <= E_MAX
    }

    /// Import a curve from the instrument's human readable description
    ///
    /// Accepts strings such as
    /// `"Std. Curve: FI = 27,863 + (7268,64 - 27,863) / ((1 + (Conc / 101819)^-1,51961))^0,62292"`.
    /// A 4PL description (no trailing exponent) is upgraded with `E = 1`.
    pub fn from_curve_description(description: &str) -> Result<Self, CurveError> {
        let nums = numeric_tokens(&description.replace(',', "."));
        match nums.as_slice() {
            [a, b, _, _, c, d] => Ok(Self::new(*a, *b, *c, *d, 1.0)),
            [a, b, _, _, c, d, e] => Ok(Self::new(*a, *b, *c, *d, *e)),
            _ => Err(CurveError::InvalidDescription {
                description: description.to_string(),
                found: nums.len(),
            }),
        }
    }

    /// Fixed-order pipe-delimited record with three decimals per value
    pub fn to_record(&self) -> String {
        self.to_array()
            .iter()
            .map(|p| format!("{}", round_to(*p, RECORD_DECIMALS)))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl fmt::Display for CurveParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_record())
    }
}

impl FromStr for CurveParameters {
    type Err = CurveError;

    /// Parse a record produced by [`CurveParameters::to_record`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(RECORD_SEPARATOR)
            .map(|part| {
                part.trim()
                    .parse::<f64>()
                    .map_err(|e| CurveError::InvalidRecord {
                        record: s.to_string(),
                        reason: format!("\"{}\": {}", part.trim(), e),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_slice(&values).map_err(|e| CurveError::InvalidRecord {
            record: s.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Extract every `-?digits(.digits)?` token from `text`
///
/// A minus sign only belongs to a number when it directly precedes a digit,
/// so the `B - A` term of a curve description yields two positive numbers.
pub(crate) fn numeric_tokens(text: &str) -> Vec<f64> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let negative = bytes[i] == b'-' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
        if !negative && !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }

        let start = i;
        if negative {
            i += 1;
        }
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }

        if let Ok(value) = text[start..i].parse::<f64>() {
            tokens.push(value);
        }
    }

    tokens
}
