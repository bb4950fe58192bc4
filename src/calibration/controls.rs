//! Control-sample evaluation
//!
//! Controls carry a known concentration range. Reading them back through a
//! curve and placing the estimate on the log scale of that range gives the
//! Cfit score: close to `0.5` for a well-behaved assay, outside `[0, 1]` for an
//! out-of-control run.

use super::error::CalibrationError;
use super::standard::reading_warning;
use super::types::{CalibrationOptions, ControlScore, Warning};
use crate::curve::{floor_concentration, invert, CurveParameters};
use crate::data::{AnalyteSetup, ConcentrationRange, FiReading, PlateRow, WellType};

/// Control levels on a plate
pub const CONTROL_LEVELS: [u8; 2] = [1, 2];

/// Parse the known range for `level`, if the setup declares one
pub fn control_range(setup: &AnalyteSetup, level: u8) -> Result<Option<ConcentrationRange>, CalibrationError> {
    setup
        .control_range(level)
        .map(|raw| {
            ConcentrationRange::parse(raw)
                .map_err(|source| CalibrationError::InvalidControlRange { level, source })
        })
        .transpose()
}

/// Score every control level present in `rows` against `params`
///
/// Ranges are parsed up front, so a malformed range fails the pair even when
/// its control wells are missing.
pub fn evaluate_controls(
    rows: &[&PlateRow],
    setup: &AnalyteSetup,
    params: &CurveParameters,
    options: &CalibrationOptions,
) -> Result<(Vec<ControlScore>, Vec<Warning>), CalibrationError> {
    let mut scores = Vec::new();
    let mut warnings = Vec::new();

    for level in CONTROL_LEVELS {
        let range = control_range(setup, level)?;
        let wells: Vec<&PlateRow> = rows
            .iter()
            .copied()
            .filter(|row| row.well_type() == WellType::Control(level))
            .collect();
        if wells.is_empty() {
            continue;
        }
        let Some(range) = range else {
            warnings.push(Warning::MissingControlRange { level });
            continue;
        };

        let mut scored = Vec::new();
        for row in wells {
            match row.reading() {
                Ok(FiReading::Valid(fi)) => {
                    let concentration =
                        floor_concentration(invert(fi, params), options.concentration_floor);
                    scored.push((row.well.clone(), concentration, range.fit_position(concentration)));
                }
                _ => warnings.extend(reading_warning(row)),
            }
        }

        let fits: Vec<f64> = scored.iter().filter_map(|(_, _, fit)| *fit).collect();
        let mean_fit = (!fits.is_empty()).then(|| fits.iter().sum::<f64>() / fits.len() as f64);

        if let Some(fit) = mean_fit {
            if !(0.0..=1.0).contains(&fit) {
                warnings.push(Warning::ControlOutOfRange { level, fit });
            }
        }

        scores.push(ControlScore {
            level,
            range,
            wells: scored,
            mean_fit,
        });
    }

    Ok((scores, warnings))
}
