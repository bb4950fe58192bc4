//! Convert well FI values into concentration estimates

use super::types::{CalibrationOptions, ConcentrationEstimate, StandardCurve, Warning};
use crate::curve::{detection_limit, floor_concentration, invert, DetectionLimit};
use crate::data::{DataError, FiReading, PlateRow};

/// Applies one curve to the wells of a pair
pub struct SampleResolver<'a> {
    options: &'a CalibrationOptions,
}

impl<'a> SampleResolver<'a> {
    pub fn new(options: &'a CalibrationOptions) -> Self {
        Self { options }
    }

    /// Floored concentration and Fpos for a valid FI
    pub fn concentration(&self, fi: f64, curve: &StandardCurve) -> (f64, Option<f64>) {
        let concentration =
            floor_concentration(invert(fi, &curve.params), self.options.concentration_floor);
        (concentration, curve.quality.band.position(fi))
    }

    /// Warning for a valid FI outside the open interval `(A, B)` of `curve`
    pub fn detection_warning(&self, well: &str, fi: f64, curve: &StandardCurve) -> Option<Warning> {
        let well = well.to_string();
        detection_limit(fi, &curve.params).map(|limit| match limit {
            DetectionLimit::Below => Warning::BelowDetection { well, fi },
            DetectionLimit::Above => Warning::AboveDetection { well, fi },
        })
    }

    /// Resolve `row` against `curve`
    ///
    /// Marker readings produce an estimate without a concentration and a
    /// warning. Unrecognized FI text is treated as an instrument flag.
    /// Valid readings beyond an asymptote keep their estimate and gain a
    /// detection warning.
    pub fn resolve(&self, row: &PlateRow, curve: &StandardCurve) -> (ConcentrationEstimate, Option<Warning>) {
        let (reading, extrapolated, warning) = match FiReading::parse_marked(&row.fi) {
            Ok((FiReading::Valid(fi), extrapolated)) => (FiReading::Valid(fi), extrapolated, None),
            Ok((reading, _)) => (
                reading,
                false,
                Some(Warning::FlaggedReading {
                    well: row.well.clone(),
                    reading,
                }),
            ),
            Err(err) => {
                let raw = match err {
                    DataError::InvalidReading { raw } => raw,
                    _ => row.fi.clone(),
                };
                (
                    FiReading::InstrumentFlagged,
                    false,
                    Some(Warning::UnmappedMarker {
                        well: row.well.clone(),
                        raw,
                    }),
                )
            }
        };

        let (concentration, fpos, coff, warning) = match reading {
            FiReading::Valid(fi) => {
                let (concentration, fpos) = self.concentration(fi, curve);
                let coff = row
                    .bound
                    .and_then(|bound| bound.offset(concentration, self.options.coff_offset));
                let warning = self.detection_warning(&row.well, fi, curve);
                (Some(concentration), fpos, coff, warning)
            }
            _ => (None, None, None, warning),
        };

        let estimate = ConcentrationEstimate {
            run: row.run.clone(),
            analyte: row.analyte.clone(),
            well: row.well.clone(),
            sample_type: row.sample_type.clone(),
            sample: row.sample_key().to_string(),
            curve_run: curve.parameter_run().to_string(),
            reading,
            extrapolated,
            concentration,
            fpos,
            coff,
        };
        (estimate, warning)
    }
}
