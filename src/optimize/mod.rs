//! Bounded 5PL curve fitting
//!
//! [`CurveFitter`] minimizes the residual sum of squares with argmin's
//! Nelder–Mead solver. Slope and asymmetry bounds are enforced through
//! [`Bounds`], and the asymptotes are solved linearly at every step.

pub mod bounds;
pub mod curve_fit;

pub use bounds::Bounds;
pub use curve_fit::{
    distinct_levels, r_squared, CurveFit, CurveFitter, FitError, FitOptions, MIN_FIT_LEVELS,
};
