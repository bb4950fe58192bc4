//! Standard-curve analysis for one (run, analyte) pair
//!
//! Builds the dilution ladder from the standard wells, fits or imports the
//! curve and derives its quality. Borrowing from another run happens later in
//! the batch driver, once every run's own curve is known.

use std::collections::BTreeSet;
use std::fmt;

use super::error::CalibrationError;
use super::types::*;
use crate::curve::{floor_concentration, invert, ConfidenceBand, CurveParameters};
use crate::data::{AnalyteSetup, DataError, FiReading, PlateRow, WellType};
use crate::optimize::{distinct_levels, CurveFit, CurveFitter};

/// Why a pair has to look for a donor curve
#[derive(Debug, Clone, PartialEq)]
pub enum DonorReason {
    /// No nominal S1 concentration, so no dilution series
    MissingTopConcentration,
    /// The standard series cannot support a fit
    Unusable(String),
    /// The fit ran but did not converge
    NotConverged,
}

impl fmt::Display for DonorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DonorReason::MissingTopConcentration => write!(f, "no top standard concentration"),
            DonorReason::Unusable(reason) => write!(f, "{}", reason),
            DonorReason::NotConverged => write!(f, "fit did not converge"),
        }
    }
}

/// Result of analyzing a pair's own standard
#[derive(Debug, Clone)]
pub struct LocalCurve {
    /// The pair's own curve; provisional when `needs_donor` is set
    pub curve: Option<StandardCurve>,
    pub needs_donor: Option<DonorReason>,
    /// Valid standard wells on the dilution ladder
    pub points: Vec<DilutionPoint>,
    pub has_full_standard: bool,
    pub warnings: Vec<Warning>,
}

/// Number of distinct `S1..S<series_length>` labels present
pub fn standard_levels_present(rows: &[&PlateRow], series_length: u32) -> usize {
    rows.iter()
        .filter_map(|row| match row.well_type() {
            WellType::Standard(n) if (1..=series_length).contains(&n) => Some(n),
            _ => None,
        })
        .collect::<BTreeSet<_>>()
        .len()
}

/// Whether every standard label of the series is on the plate
pub fn has_full_standard(rows: &[&PlateRow], series_length: u32) -> bool {
    standard_levels_present(rows, series_length) == series_length as usize
}

/// Highest Fpos among annotated standard points
pub fn saturation_reach(points: &[AnnotatedPoint]) -> Option<f64> {
    points
        .iter()
        .filter_map(|p| p.fpos)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
}

/// Warning for a non-valid FI cell, `None` for valid readings
pub(crate) fn reading_warning(row: &PlateRow) -> Option<Warning> {
    match row.reading() {
        Ok(FiReading::Valid(_)) => None,
        Ok(reading) => Some(Warning::FlaggedReading {
            well: row.well.clone(),
            reading,
        }),
        Err(DataError::InvalidReading { raw }) => Some(Warning::UnmappedMarker {
            well: row.well.clone(),
            raw,
        }),
        Err(_) => Some(Warning::UnmappedMarker {
            well: row.well.clone(),
            raw: row.fi.clone(),
        }),
    }
}

/// Standard-curve analyzer
pub struct StandardAnalyzer<'a> {
    options: &'a CalibrationOptions,
}

impl<'a> StandardAnalyzer<'a> {
    pub fn new(options: &'a CalibrationOptions) -> Self {
        Self { options }
    }

    /// Nominal concentration of a standard or blank well
    ///
    /// `S<n>` sits at `top / factor^(n-1)`; the last level of the series and
    /// the blank take the zero surrogate. Labels past the series have none.
    pub fn nominal_concentration(&self, well_type: WellType, top: f64) -> Option<f64> {
        let series_length = self.options.series_length;
        match well_type {
            WellType::Standard(n) if n > series_length => None,
            WellType::Standard(n) if n == series_length => Some(self.options.zero_value),
            WellType::Standard(n) => Some(top / self.options.dilution_factor.powi(n as i32 - 1)),
            WellType::Blank => Some(self.options.zero_value),
            _ => None,
        }
    }

    /// Place valid standard and blank wells on the dilution ladder
    ///
    /// Wells with marker readings are left out and reported. Points are
    /// ordered from the most to the least concentrated.
    pub fn dilution_series(&self, rows: &[&PlateRow], top: f64) -> (Vec<DilutionPoint>, Vec<Warning>) {
        let mut points = Vec::new();
        let mut warnings = Vec::new();

        for row in rows {
            let well_type = row.well_type();
            let Some(concentration) = self.nominal_concentration(well_type, top) else {
                continue;
            };
            match row.reading() {
                Ok(FiReading::Valid(fi)) => points.push(DilutionPoint {
                    well: row.well.clone(),
                    well_type,
                    concentration,
                    fi,
                }),
                _ => warnings.extend(reading_warning(row)),
            }
        }

        points.sort_by(|a, b| {
            b.concentration
                .total_cmp(&a.concentration)
                .then_with(|| a.well.cmp(&b.well))
        });
        (points, warnings)
    }

    /// Check the series against `min_levels` and `min_points`
    pub fn check_usable(&self, points: &[DilutionPoint]) -> Result<(), String> {
        let concentrations: Vec<f64> = points.iter().map(|p| p.concentration).collect();
        let levels = distinct_levels(&concentrations);
        if levels < self.options.min_levels {
            return Err(format!(
                "{} dilution levels with a valid FI, need {}",
                levels, self.options.min_levels
            ));
        }
        if points.len() < self.options.min_points {
            return Err(format!(
                "{} valid standard wells, need {}",
                points.len(),
                self.options.min_points
            ));
        }
        Ok(())
    }

    /// Fit the 5PL curve to the series
    pub fn fit(&self, points: &[DilutionPoint]) -> Result<CurveFit, CalibrationError> {
        let concentrations: Vec<f64> = points.iter().map(|p| p.concentration).collect();
        let fi: Vec<f64> = points.iter().map(|p| p.fi).collect();
        Ok(CurveFitter::new(&concentrations, &fi, &self.options.fit).fit()?)
    }

    pub fn band(&self, params: &CurveParameters) -> ConfidenceBand {
        ConfidenceBand::new(params, self.options.confidence)
    }

    /// Read every point back through the curve
    pub fn annotate(
        &self,
        points: &[DilutionPoint],
        params: &CurveParameters,
        band: &ConfidenceBand,
    ) -> Vec<AnnotatedPoint> {
        points
            .iter()
            .map(|point| AnnotatedPoint {
                point: point.clone(),
                back_calculated: floor_concentration(
                    invert(point.fi, params),
                    self.options.concentration_floor,
                ),
                fpos: band.position(point.fi),
            })
            .collect()
    }

    /// Quality warnings for a freshly derived curve
    pub fn quality_warnings(&self, quality: &FitQuality) -> Vec<Warning> {
        let mut warnings = Vec::new();
        if let Some(r_squared) = quality.r_squared {
            if r_squared < self.options.min_r_squared {
                warnings.push(Warning::PoorFit {
                    r_squared,
                    threshold: self.options.min_r_squared,
                });
            }
        }
        if let Some(reach) = quality.saturation_reach {
            if reach < self.options.min_saturation_reach {
                warnings.push(Warning::LowSaturationReach {
                    reach,
                    threshold: self.options.min_saturation_reach,
                });
            }
        }
        warnings
    }

    /// Assemble a curve and its quality from parameters
    #[allow(clippy::too_many_arguments)]
    pub fn build_curve(
        &self,
        run: &str,
        analyte: &str,
        params: CurveParameters,
        source: CurveSource,
        r_squared: Option<f64>,
        converged: bool,
        points: &[DilutionPoint],
        has_full_standard: bool,
    ) -> StandardCurve {
        let band = self.band(&params);
        let annotated = self.annotate(points, &params, &band);
        StandardCurve {
            run: run.to_string(),
            analyte: analyte.to_string(),
            params,
            quality: FitQuality {
                source,
                r_squared,
                converged,
                saturation_reach: saturation_reach(&annotated),
                band,
                controls: Vec::new(),
            },
            points: annotated,
            has_full_standard,
        }
    }

    /// Analyze the pair's own standard
    ///
    /// An instrument curve description in the setup is imported as-is. Otherwise
    /// the dilution series is fitted when usable. Anything short of a
    /// converged fit sets `needs_donor`.
    pub fn analyze(
        &self,
        run: &str,
        analyte: &str,
        rows: &[&PlateRow],
        setup: &AnalyteSetup,
    ) -> Result<LocalCurve, CalibrationError> {
        let series_length = self.options.series_length;
        let standard_rows: Vec<&PlateRow> = rows
            .iter()
            .copied()
            .filter(|row| row.well_type().is_standard_or_blank())
            .collect();

        let has_full_standard = has_full_standard(&standard_rows, series_length);
        let mut warnings = Vec::new();
        let found = standard_levels_present(&standard_rows, series_length);
        if found > 0 && !has_full_standard {
            warnings.push(Warning::IncompleteStandard {
                found,
                expected: series_length as usize,
            });
        }

        let (points, series_warnings) = match setup.top_concentration {
            Some(top) => self.dilution_series(&standard_rows, top),
            None => (Vec::new(), Vec::new()),
        };
        warnings.extend(series_warnings);

        if let Some(description) = &setup.curve {
            let params = CurveParameters::from_curve_description(description)?;
            let curve = self.build_curve(
                run,
                analyte,
                params,
                CurveSource::Imported,
                None,
                true,
                &points,
                has_full_standard,
            );
            warnings.extend(self.quality_warnings(&curve.quality));
            return Ok(LocalCurve {
                curve: Some(curve),
                needs_donor: None,
                points,
                has_full_standard,
                warnings,
            });
        }

        let unusable = |reason: DonorReason,
                        points: Vec<DilutionPoint>,
                        warnings: Vec<Warning>|
         -> Result<LocalCurve, CalibrationError> {
            Ok(LocalCurve {
                curve: None,
                needs_donor: Some(reason),
                points,
                has_full_standard,
                warnings,
            })
        };

        if setup.top_concentration.is_none() {
            return unusable(DonorReason::MissingTopConcentration, points, warnings);
        }
        if let Err(reason) = self.check_usable(&points) {
            return unusable(DonorReason::Unusable(reason), points, warnings);
        }

        let fit = match self.fit(&points) {
            Ok(fit) => fit,
            Err(CalibrationError::Fit(e)) => {
                return unusable(DonorReason::Unusable(e.to_string()), points, warnings)
            }
            Err(e) => return Err(e),
        };
        if fit.degenerate {
            return unusable(
                DonorReason::Unusable("standard FI values have no variance".to_string()),
                points,
                warnings,
            );
        }

        tracing::debug!(
            run,
            analyte,
            r_squared = fit.r_squared,
            iterations = fit.iterations,
            restarts = fit.restarts,
            "Fitted standard curve {}",
            fit.params
        );

        let curve = self.build_curve(
            run,
            analyte,
            fit.params,
            CurveSource::Fitted,
            Some(fit.r_squared),
            fit.converged,
            &points,
            has_full_standard,
        );
        warnings.extend(self.quality_warnings(&curve.quality));

        let needs_donor = if fit.converged {
            None
        } else {
            warnings.push(Warning::FitNotConverged {
                iterations: fit.iterations,
            });
            Some(DonorReason::NotConverged)
        };

        Ok(LocalCurve {
            curve: Some(curve),
            needs_donor,
            points,
            has_full_standard,
            warnings,
        })
    }
}
