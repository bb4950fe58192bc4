use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::DataError;

/// A known concentration interval `[min, max]`
///
/// Control samples and externally measured samples carry one of these. The
/// instrument prints them as `"50-200"` or `"50–200"`, possibly embedded in
/// longer text and with comma decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationRange {
    pub min: f64,
    pub max: f64,
}

impl ConcentrationRange {
    /// Build a range, requiring `0 < min < max`
    pub fn new(min: f64, max: f64) -> Result<Self, DataError> {
        if !(min > 0.0 && max > min && max.is_finite()) {
            return Err(DataError::InvalidRange {
                raw: format!("{}-{}", min, max),
                reason: "bounds must satisfy 0 < min < max".to_string(),
            });
        }
        Ok(Self { min, max })
    }

    /// Extract the first `<number> - <number>` pair from `raw`
    pub fn parse(raw: &str) -> Result<Self, DataError> {
        let normalized = raw.replace('–', "-").replace(',', ".");
        let (min, max) = find_pair(&normalized).ok_or_else(|| DataError::InvalidRange {
            raw: raw.to_string(),
            reason: "expected \"<min>-<max>\"".to_string(),
        })?;
        Self::new(min, max).map_err(|e| match e {
            DataError::InvalidRange { reason, .. } => DataError::InvalidRange {
                raw: raw.to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Half the log-width of the range, `ln(max/min) / 2`
    pub fn log_half_width(&self) -> f64 {
        (self.max / self.min).ln() / 2.0
    }

    /// Log-linear position of `concentration` in the range (Cfit)
    ///
    /// `0` at `min`, `1` at `max`, `0.5` at the geometric midpoint. `None`
    /// for non-positive concentrations.
    pub fn fit_position(&self, concentration: f64) -> Option<f64> {
        if !(concentration > 0.0) {
            return None;
        }
        let position = (concentration / self.min).ln() / (self.max / self.min).ln();
        position.is_finite().then_some(position)
    }

    /// Deviation from the geometric midpoint in half-widths (Coff)
    ///
    /// `(ln((conc + offset) / min) - hw) / hw` with `hw = ln(max/min) / 2`,
    /// so `0` sits at the midpoint and `±1` at the range edges.
    pub fn offset(&self, concentration: f64, offset: f64) -> Option<f64> {
        let half_width = self.log_half_width();
        let shifted = concentration + offset;
        if !(shifted > 0.0) || !(half_width > 0.0) {
            return None;
        }
        let value = ((shifted / self.min).ln() - half_width) / half_width;
        value.is_finite().then_some(value)
    }
}

impl fmt::Display for ConcentrationRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

impl FromStr for ConcentrationRange {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Unsigned decimal starting at `start`, returns the value and the end offset
fn scan_number(bytes: &[u8], start: usize) -> Option<(f64, usize)> {
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == start {
        return None;
    }
    if end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    let text = std::str::from_utf8(&bytes[start..end]).ok()?;
    text.parse().ok().map(|v| (v, end))
}

fn skip_spaces(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos] == b' ' {
        pos += 1;
    }
    pos
}

fn find_pair(text: &str) -> Option<(f64, f64)> {
    let bytes = text.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        if !bytes[pos].is_ascii_digit() {
            pos += 1;
            continue;
        }
        let (low, end) = scan_number(bytes, pos)?;
        let sep = skip_spaces(bytes, end);
        if bytes.get(sep) == Some(&b'-') {
            let next = skip_spaces(bytes, sep + 1);
            if let Some((high, _)) = scan_number(bytes, next) {
                return Some((low, high));
            }
        }
        pos = end;
    }
    None
}
