//! Cross-run combination of concentration estimates
//!
//! Every owned curve of an analyte is applied to the same sample FI. The
//! resulting estimates are combined once all runs are resolved.

use serde::{Deserialize, Serialize};

use super::types::{AggregationMode, AggregationOptions, RunEstimate};
use crate::curve::{round_to, FPOS_DECIMALS, INVERT_DECIMALS};

/// Population statistics over the included estimates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub mean: f64,
    pub std: Option<f64>,
    /// Mean Fpos over every estimate with a defined Fpos
    pub fpos_mean: Option<f64>,
    pub included: usize,
}

/// Whether an estimate passes the confidence threshold
///
/// An FI at or beyond either asymptote of the curve never passes, whatever
/// its Fpos.
pub fn is_included(estimate: &RunEstimate, min_fpos: f64) -> bool {
    estimate.detection.is_none()
        && estimate.fpos.is_some_and(|fpos| fpos > min_fpos)
        && estimate.concentration.is_finite()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator)
fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Combine one sample's estimates
///
/// Estimates with Fpos at or below `min_fpos` (or without an Fpos) and
/// estimates beyond an asymptote are left out of the mean and standard
/// deviation but still count towards the mean Fpos. Returns `None` when nothing passes the threshold.
pub fn aggregate(estimates: &[RunEstimate], options: &AggregationOptions) -> Option<Aggregate> {
    let included: Vec<f64> = estimates
        .iter()
        .filter(|e| is_included(e, options.min_fpos))
        .map(|e| e.concentration)
        .collect();
    if included.is_empty() {
        return None;
    }

    let (center, spread) = match options.mode {
        AggregationMode::Arithmetic => (mean(&included), sample_std(&included)),
        AggregationMode::Geometric => {
            let logs: Vec<f64> = included.iter().map(|c| c.abs().ln()).collect();
            (mean(&logs).exp(), sample_std(&logs).map(f64::exp))
        }
    };

    let fpos: Vec<f64> = estimates.iter().filter_map(|e| e.fpos).collect();
    let fpos_mean = (!fpos.is_empty()).then(|| round_to(mean(&fpos), FPOS_DECIMALS));

    Some(Aggregate {
        mean: round_to(center, INVERT_DECIMALS),
        std: spread,
        fpos_mean,
        included: included.len(),
    })
}
