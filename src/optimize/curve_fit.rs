use argmin::{
    core::{CostFunction, Error, Executor, TerminationReason, TerminationStatus},
    solver::neldermead::NelderMead,
};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bounds::Bounds;
use crate::curve::{evaluate, CurveParameters, D_MAX, D_MIN, E_MAX, E_MIN};

/// Fewest distinct concentration levels accepted by the fitter
pub const MIN_FIT_LEVELS: usize = 5;

/// Open ends of the admissible intervals are kept out of reach by this margin
const OPEN_BOUND_MARGIN: f64 = 1e-6;

const D_BOUNDS: Bounds = Bounds::new(D_MIN, D_MAX - OPEN_BOUND_MARGIN);
const E_BOUNDS: Bounds = Bounds::new(E_MIN + OPEN_BOUND_MARGIN, E_MAX);

/// Singular values below this are treated as zero in the asymptote solve
const SVD_EPS: f64 = 1e-10;

/// Initial simplex steps for `[log10 C, D, E]` in internal coordinates
const SIMPLEX_STEPS: [f64; 3] = [1.0, 0.5, 0.5];

/// Errors raised by [`CurveFitter::fit`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// Too few distinct concentrations to determine five parameters
    #[error("Insufficient concentration levels: {levels} distinct, need at least {required}")]
    InsufficientLevels { levels: usize, required: usize },
    /// Concentration and FI slices differ in length
    #[error("Got {concentrations} concentrations but {observations} FI values")]
    LengthMismatch {
        concentrations: usize,
        observations: usize,
    },
    /// NaN or infinite inputs
    #[error("Fit input contains non-finite values")]
    NonFinite,
    /// The underlying solver failed
    #[error("Optimizer error: {0}")]
    Optimizer(String),
}

/// Solver settings for the 5PL fitter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Starting point; only C, D, E seed the search, A and B are the
    /// fallback when the asymptotes cannot be solved for
    pub initial: CurveParameters,
    /// Optional ceiling for the upper asymptote B
    pub upper_asymptote_cap: Option<f64>,
    /// Iteration limit for each Nelder–Mead run
    pub max_iters: u64,
    /// Number of restarts from the best point found so far
    pub max_restarts: usize,
    /// Simplex spread at which a run counts as converged, also the minimum
    /// improvement required to keep restarting
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            initial: CurveParameters::INITIAL_GUESS,
            upper_asymptote_cap: None,
            max_iters: 4000,
            max_restarts: 12,
            tolerance: 1e-12,
        }
    }
}

impl FitOptions {
    pub fn with_upper_asymptote_cap(mut self, cap: f64) -> Self {
        self.upper_asymptote_cap = Some(cap);
        self
    }

    pub fn with_max_iters(mut self, max_iters: u64) -> Self {
        self.max_iters = max_iters;
        self
    }

    pub fn with_max_restarts(mut self, max_restarts: usize) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Outcome of a 5PL fit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveFit {
    pub params: CurveParameters,
    /// Classical R², see [`r_squared`]
    pub r_squared: f64,
    /// Nelder–Mead iterations summed over all restarts
    pub iterations: u64,
    pub restarts: usize,
    /// Whether the final solver run stopped on its own convergence criterion
    pub converged: bool,
    /// The observed FI values have (numerically) zero variance
    pub degenerate: bool,
}

/// Coefficient of determination `1 - SSres / SStot`
///
/// When the observations have no variance, returns `1.0` for a perfect
/// prediction and `0.0` otherwise instead of dividing by zero.
pub fn r_squared(observed: &[f64], predicted: &[f64]) -> f64 {
    let (ssr, tss) = sums_of_squares(observed, predicted);
    if tss <= f64::EPSILON {
        return if ssr <= f64::EPSILON { 1.0 } else { 0.0 };
    }
    1.0 - ssr / tss
}

fn sums_of_squares(observed: &[f64], predicted: &[f64]) -> (f64, f64) {
    let n = observed.len().max(1) as f64;
    let mean = observed.iter().sum::<f64>() / n;
    let ssr = observed
        .iter()
        .zip(predicted)
        .map(|(o, p)| (o - p).powi(2))
        .sum();
    let tss = observed.iter().map(|o| (o - mean).powi(2)).sum();
    (ssr, tss)
}

/// Count distinct concentration values
pub fn distinct_levels(concentrations: &[f64]) -> usize {
    let mut sorted = concentrations.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted.dedup_by(|a, b| (*a - *b).abs() <= f64::EPSILON * a.abs().max(b.abs()));
    sorted.len()
}

/// Sum of squared residuals with A and B projected out
///
/// The search space is `[log10 C, u_D, u_E]`, where `u_D` and `u_E` are the
/// sine-transformed slope and asymmetry. For every candidate shape the
/// asymptotes follow from a linear least-squares solve, since the model is
/// linear in A and B once C, D and E are fixed.
#[derive(Debug, Clone, Copy)]
struct ProjectedCost<'a> {
    concentrations: &'a [f64],
    observed: &'a [f64],
    total_ss: f64,
    fallback: CurveParameters,
    cap: Option<f64>,
}

impl ProjectedCost<'_> {
    fn params(&self, internal: &[f64]) -> CurveParameters {
        let c = 10f64.powf(internal[0]);
        let d = D_BOUNDS.to_external(internal[1]);
        let e = E_BOUNDS.to_external(internal[2]);

        // g(x) = 1 / (1 + (x/C)^D)^E, so FI = A (1 - g) + B g
        let shape = CurveParameters::new(0.0, 1.0, c, d, e);
        let g: Vec<f64> = self
            .concentrations
            .iter()
            .map(|&x| evaluate(x, &shape))
            .collect();

        let (a, b) = self.asymptotes(&g);
        CurveParameters::new(a, b, c, d, e)
    }

    fn asymptotes(&self, g: &[f64]) -> (f64, f64) {
        let n = g.len();
        let design = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 - g[i] } else { g[i] });
        let y = DVector::from_column_slice(self.observed);

        let svd = design.svd(true, true);
        // near-flat shapes leave B undetermined; the minimum-norm solve would report B = 0
        let identifiable = svd.singular_values.min() > SVD_EPS * svd.singular_values.max();
        let (a, b) = match svd.solve(&y, SVD_EPS) {
            Ok(sol) if identifiable && sol[0].is_finite() && sol[1].is_finite() => (sol[0], sol[1]),
            _ => (self.fallback.a, self.fallback.b),
        };

        let Some(cap) = self.cap else {
            return (a, b);
        };
        let capped = if identifiable { b.min(cap) } else { cap };
        if capped == b {
            return (a, b);
        }

        // re-solve A with B held at the cap
        let (num, den) = g
            .iter()
            .zip(self.observed)
            .fold((0.0, 0.0), |(num, den), (gi, yi)| {
                (num + (1.0 - gi) * (yi - capped * gi), den + (1.0 - gi).powi(2))
            });
        let a = if den > SVD_EPS { num / den } else { self.fallback.a.min(capped) };
        (a, capped)
    }

    fn residual_ss(&self, params: &CurveParameters) -> f64 {
        self.concentrations
            .iter()
            .zip(self.observed)
            .map(|(&x, &y)| (y - evaluate(x, params)).powi(2))
            .sum()
    }

    fn value(&self, internal: &[f64]) -> f64 {
        let cost = self.residual_ss(&self.params(internal)) / self.total_ss;
        // Nelder–Mead orders vertices by cost and cannot rank NaN
        if cost.is_nan() {
            f64::INFINITY
        } else {
            cost
        }
    }
}

impl CostFunction for ProjectedCost<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, internal: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.value(internal))
    }
}

/// Bounded least-squares fitter for the 5PL curve
///
/// ```rust
/// use lumicurve::curve::{evaluate, CurveParameters};
/// use lumicurve::optimize::{CurveFitter, FitOptions};
///
/// let truth = CurveParameters::new(30.0, 18000.0, 300.0, -0.95, 1.0);
/// let conc = [10000.0, 2500.0, 625.0, 156.25, 39.06, 9.77, 2.44, 0.1];
/// let fi: Vec<f64> = conc.iter().map(|&c| evaluate(c, &truth)).collect();
///
/// let options = FitOptions::default();
/// let fit = CurveFitter::new(&conc, &fi, &options).fit().unwrap();
/// assert!(fit.r_squared > 0.99);
/// ```
pub struct CurveFitter<'a> {
    concentrations: &'a [f64],
    observed: &'a [f64],
    options: &'a FitOptions,
}

impl<'a> CurveFitter<'a> {
    pub fn new(concentrations: &'a [f64], observed: &'a [f64], options: &'a FitOptions) -> Self {
        Self {
            concentrations,
            observed,
            options,
        }
    }

    fn validate(&self) -> Result<(), FitError> {
        if self.concentrations.len() != self.observed.len() {
            return Err(FitError::LengthMismatch {
                concentrations: self.concentrations.len(),
                observations: self.observed.len(),
            });
        }
        if self
            .concentrations
            .iter()
            .chain(self.observed)
            .any(|v| !v.is_finite())
        {
            return Err(FitError::NonFinite);
        }
        let levels = distinct_levels(self.concentrations);
        if levels < MIN_FIT_LEVELS {
            return Err(FitError::InsufficientLevels {
                levels,
                required: MIN_FIT_LEVELS,
            });
        }
        Ok(())
    }

    fn initial_point(&self) -> Vec<f64> {
        let initial = self.options.initial;
        vec![
            initial.c.abs().max(f64::MIN_POSITIVE).log10(),
            D_BOUNDS.to_internal(initial.d),
            E_BOUNDS.to_internal(initial.e),
        ]
    }

    /// Run the fit
    ///
    /// Nelder–Mead is restarted from the best vertex until a restart no longer
    /// improves the cost by more than the tolerance, or `max_restarts` is hit.
    /// Deterministic: identical input always yields identical parameters.
    pub fn fit(&self) -> Result<CurveFit, FitError> {
        self.validate()?;

        let (_, total_ss) = sums_of_squares(self.observed, self.observed);
        let degenerate = total_ss <= f64::EPSILON;
        let cost = ProjectedCost {
            concentrations: self.concentrations,
            observed: self.observed,
            total_ss: if degenerate { 1.0 } else { total_ss },
            fallback: self.options.initial,
            cap: self.options.upper_asymptote_cap,
        };

        let mut best = self.initial_point();
        let mut best_cost = cost.value(&best);
        let mut iterations = 0;
        let mut restarts = 0;
        let mut converged = false;

        for restart in 0..=self.options.max_restarts {
            let solver = NelderMead::new(create_initial_simplex(&best))
                .with_sd_tolerance(self.options.tolerance)
                .map_err(|e| FitError::Optimizer(e.to_string()))?;
            let res = Executor::new(cost, solver)
                .configure(|state| state.max_iters(self.options.max_iters))
                .run()
                .map_err(|e| FitError::Optimizer(e.to_string()))?;

            iterations += res.state.iter;
            restarts = restart;
            converged = matches!(
                res.state.termination_status,
                TerminationStatus::Terminated(TerminationReason::SolverConverged)
            );

            let Some(candidate) = res.state.best_param else {
                break;
            };
            let improvement = best_cost - res.state.best_cost;
            if res.state.best_cost <= best_cost {
                best = candidate;
                best_cost = res.state.best_cost;
            }

            tracing::trace!(
                restart,
                cost = best_cost,
                improvement,
                iterations = res.state.iter,
                "5PL Nelder-Mead run finished"
            );

            if !(improvement > self.options.tolerance) {
                break;
            }
        }

        let params = cost.params(&best);
        let predicted: Vec<f64> = self
            .concentrations
            .iter()
            .map(|&x| evaluate(x, &params))
            .collect();

        Ok(CurveFit {
            params,
            r_squared: r_squared(self.observed, &predicted),
            iterations,
            restarts,
            converged,
            degenerate,
        })
    }
}

fn create_initial_simplex(initial_point: &[f64]) -> Vec<Vec<f64>> {
    let mut vertices = Vec::with_capacity(initial_point.len() + 1);
    vertices.push(initial_point.to_vec());

    for (i, step) in SIMPLEX_STEPS.iter().enumerate().take(initial_point.len()) {
        let mut perturbed_point = initial_point.to_vec();
        perturbed_point[i] += step;
        vertices.push(perturbed_point);
    }

    vertices
}
