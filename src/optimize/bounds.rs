//! Box constraints for unconstrained optimizers
//!
//! Nelder–Mead works on an unbounded space, so bounded parameters are mapped
//! through `x = lo + (hi - lo) * (sin(u) + 1) / 2`. Every internal value `u`
//! lands inside `[lo, hi]`, and the bounds themselves are reachable.

use serde::{Deserialize, Serialize};

/// Closed interval `[lower, upper]` with a sine mapping to the real line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Map an internal (unbounded) value into the interval
    #[inline]
    pub fn to_external(&self, internal: f64) -> f64 {
        let x = self.lower + (self.upper - self.lower) * (internal.sin() + 1.0) / 2.0;
        x.max(self.lower).min(self.upper)
    }

    /// Map a value inside the interval to its internal representation
    ///
    /// Values outside the interval are clamped onto the nearest bound first.
    #[inline]
    pub fn to_internal(&self, external: f64) -> f64 {
        let width = self.upper - self.lower;
        if width <= 0.0 {
            return 0.0;
        }
        let scaled = 2.0 * (external - self.lower) / width - 1.0;
        scaled.clamp(-1.0, 1.0).asin()
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.lower..=self.upper).contains(&value)
    }
}
