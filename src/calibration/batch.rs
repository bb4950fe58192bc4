//! Batch driver over every (run, analyte) pair of a plate export
//!
//! Phases run in a fixed order:
//!
//! 1. group rows by pair and drop analytes without a setup
//! 2. analyze each pair's own standard (in parallel)
//! 3. lend donor curves to pairs without a usable one
//! 4. score controls and resolve every well
//! 5. combine the estimates of each sample over all owned curves of its analyte
//!
//! Step 5 only starts once every pair is resolved.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::aggregate::aggregate;
use super::controls::evaluate_controls;
use super::error::CalibrationError;
use super::resolve::SampleResolver;
use super::standard::{DonorReason, LocalCurve, StandardAnalyzer};
use super::types::*;
use crate::curve::detection_limit;
use crate::data::{AnalyteSetup, FiReading, PlateRow, WellType};

type PairKey = (String, String);

/// A pair with the outcome of its own standard analysis
type Analyzed<'r> = (PairKey, Vec<&'r PlateRow>, AnalyteSetup, Result<LocalCurve, CalibrationError>);

/// Everything produced by [`calibrate`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// One curve per calibrated pair, sorted by run and analyte
    pub curves: Vec<StandardCurve>,
    /// One estimate per well of every calibrated pair
    pub estimates: Vec<ConcentrationEstimate>,
    /// Cross-run consensus per sample well
    pub consensus: Vec<ConsensusEstimate>,
    pub warnings: Vec<CalibrationWarning>,
}

impl CalibrationReport {
    pub fn curve(&self, run: &str, analyte: &str) -> Option<&StandardCurve> {
        self.curves
            .iter()
            .find(|c| c.run == run && c.analyte == analyte)
    }

    pub fn estimates_for<'a>(
        &'a self,
        run: &'a str,
        analyte: &'a str,
    ) -> impl Iterator<Item = &'a ConcentrationEstimate> + 'a {
        self.estimates
            .iter()
            .filter(move |e| e.run == run && e.analyte == analyte)
    }

    pub fn estimate(&self, run: &str, analyte: &str, well: &str) -> Option<&ConcentrationEstimate> {
        self.estimates
            .iter()
            .find(|e| e.run == run && e.analyte == analyte && e.well == well)
    }

    pub fn consensus_for(&self, run: &str, analyte: &str, well: &str) -> Option<&ConsensusEstimate> {
        self.consensus
            .iter()
            .find(|c| c.run == run && c.analyte == analyte && c.well == well)
    }

    pub fn warnings_for<'a>(
        &'a self,
        run: &'a str,
        analyte: &'a str,
    ) -> impl Iterator<Item = &'a Warning> + 'a {
        self.warnings
            .iter()
            .filter(move |w| w.run == run && w.analyte == analyte)
            .map(|w| &w.warning)
    }
}

/// A pair after the borrowing phase
struct Pair<'r> {
    key: PairKey,
    rows: Vec<&'r PlateRow>,
    setup: AnalyteSetup,
    curve: Option<StandardCurve>,
    warnings: Vec<Warning>,
    excluded: bool,
}

impl Pair<'_> {
    fn exclude(&mut self, reason: String) {
        tracing::warn!(run = %self.key.0, analyte = %self.key.1, "Pair excluded: {}", reason);
        self.curve = None;
        self.excluded = true;
        self.warnings.push(Warning::PairExcluded { reason });
    }
}

/// Calibrate a whole plate export
///
/// Only invalid options fail the batch. Per-pair failures become
/// [`Warning::PairExcluded`] and never affect other pairs.
pub fn calibrate(
    rows: &[PlateRow],
    setups: &[AnalyteSetup],
    options: &CalibrationOptions,
) -> Result<CalibrationReport, CalibrationError> {
    options.validate()?;

    let known_analytes: BTreeSet<&str> = setups.iter().map(|s| s.analyte.as_str()).collect();
    let setup_index: BTreeMap<(&str, &str), &AnalyteSetup> = setups
        .iter()
        .map(|s| ((s.run.as_str(), s.analyte.as_str()), s))
        .collect();

    let mut grouped: BTreeMap<PairKey, Vec<&PlateRow>> = BTreeMap::new();
    for row in rows {
        grouped
            .entry((row.run.clone(), row.analyte.clone()))
            .or_default()
            .push(row);
    }

    let mut report = CalibrationReport::default();
    let mut work = Vec::with_capacity(grouped.len());
    for (key, pair_rows) in grouped {
        if !known_analytes.contains(key.1.as_str()) {
            tracing::warn!(run = %key.0, analyte = %key.1, "Analyte not in setup, skipping");
            report
                .warnings
                .push(CalibrationWarning::new(&key.0, &key.1, Warning::UnknownAnalyte));
            continue;
        }
        let setup = setup_index
            .get(&(key.0.as_str(), key.1.as_str()))
            .map(|s| (*s).clone())
            .unwrap_or_else(|| AnalyteSetup::new(&key.0, &key.1));
        work.push((key, pair_rows, setup));
    }

    let analyzer = StandardAnalyzer::new(options);
    let analyzed: Vec<Analyzed> = work
        .into_par_iter()
        .map(|(key, pair_rows, setup)| {
            let local = analyzer.analyze(&key.0, &key.1, &pair_rows, &setup);
            (key, pair_rows, setup, local)
        })
        .collect();

    let mut pairs = lend_curves(analyzed, &analyzer, options);

    let resolver = SampleResolver::new(options);
    for pair in pairs.iter_mut() {
        let Some(curve) = pair.curve.as_ref() else {
            continue;
        };
        match evaluate_controls(&pair.rows, &pair.setup, &curve.params, options) {
            Ok((scores, control_warnings)) => {
                pair.warnings.extend(control_warnings);
                if let Some(curve) = pair.curve.as_mut() {
                    curve.quality.controls = scores;
                }
            }
            Err(e) => {
                pair.exclude(e.to_string());
                continue;
            }
        }

        let Some(curve) = pair.curve.as_ref() else {
            continue;
        };
        let mut pair_estimates = Vec::with_capacity(pair.rows.len());
        for row in &pair.rows {
            let (estimate, warning) = resolver.resolve(row, curve);
            // standard and control readings were reported when scored
            if row.well_type() == WellType::Sample {
                pair.warnings.extend(warning);
            }
            pair_estimates.push(estimate);
        }
        pair_estimates.sort_by(|a, b| a.well.cmp(&b.well));
        report.estimates.extend(pair_estimates);

        tracing::debug!(
            run = %pair.key.0,
            analyte = %pair.key.1,
            source = %curve.quality.source,
            wells = pair.rows.len(),
            "Calibrated pair"
        );
    }

    report.consensus = consensus(&pairs, &resolver, options);

    for pair in pairs {
        report.warnings.extend(
            pair.warnings
                .into_iter()
                .map(|w| CalibrationWarning::new(&pair.key.0, &pair.key.1, w)),
        );
        report.curves.extend(pair.curve);
    }
    report
        .warnings
        .sort_by(|a, b| (&a.run, &a.analyte).cmp(&(&b.run, &b.analyte)));

    Ok(report)
}

/// Resolve local results, borrowing donor curves where needed
fn lend_curves<'r>(
    analyzed: Vec<Analyzed<'r>>,
    analyzer: &StandardAnalyzer,
    options: &CalibrationOptions,
) -> Vec<Pair<'r>> {
    // Donors own a converged or imported curve
    let donors: BTreeMap<PairKey, StandardCurve> = analyzed
        .iter()
        .filter_map(|(key, _, _, local)| match local {
            Ok(LocalCurve {
                curve: Some(curve),
                needs_donor: None,
                ..
            }) => Some((key.clone(), curve.clone())),
            _ => None,
        })
        .collect();

    let mut pairs = Vec::with_capacity(analyzed.len());
    for (key, rows, setup, local) in analyzed {
        let mut pair = Pair {
            key,
            rows,
            setup,
            curve: None,
            warnings: Vec::new(),
            excluded: false,
        };

        let local = match local {
            Ok(local) => local,
            Err(e) => {
                pair.exclude(e.to_string());
                pairs.push(pair);
                continue;
            }
        };
        pair.warnings = local.warnings;

        let Some(reason) = local.needs_donor else {
            pair.curve = local.curve;
            pairs.push(pair);
            continue;
        };

        let (run, analyte) = (&pair.key.0, &pair.key.1);
        let donor = options
            .fallback
            .donor_for(run)
            .and_then(|donor_run| donors.get(&(donor_run.to_string(), analyte.clone())));

        match (donor, reason) {
            (Some(donor), reason) => {
                tracing::warn!(
                    run = %run,
                    analyte = %analyte,
                    donor = %donor.run,
                    "No usable standard ({}), borrowing curve",
                    reason
                );
                pair.warnings.push(Warning::NoStandardUsable {
                    reason: reason.to_string(),
                });
                pair.warnings.push(Warning::BorrowedCurve {
                    from_run: donor.run.clone(),
                });
                pair.curve = Some(borrow_curve(
                    run,
                    donor,
                    &local.points,
                    local.has_full_standard,
                    analyzer,
                ));
            }
            (None, DonorReason::MissingTopConcentration) => {
                let err = CalibrationError::MissingTopConcentration {
                    run: run.clone(),
                    analyte: analyte.clone(),
                };
                pair.exclude(err.to_string());
            }
            (None, reason) => {
                // a non-converged provisional fit is dropped, never reported as a curve
                tracing::warn!(run = %run, analyte = %analyte, "No usable standard: {}", reason);
                pair.warnings.push(Warning::NoStandardUsable {
                    reason: reason.to_string(),
                });
            }
        }
        pairs.push(pair);
    }
    pairs
}

/// Copy a donor curve for `run`, annotating the run's own standard points
fn borrow_curve(
    run: &str,
    donor: &StandardCurve,
    points: &[DilutionPoint],
    has_full_standard: bool,
    analyzer: &StandardAnalyzer,
) -> StandardCurve {
    let mut quality = donor.quality.clone();
    quality.source = CurveSource::Borrowed {
        from_run: donor.run.clone(),
    };
    quality.controls = Vec::new();

    StandardCurve {
        run: run.to_string(),
        analyte: donor.analyte.clone(),
        params: donor.params,
        points: analyzer.annotate(points, &donor.params, &quality.band),
        quality,
        has_full_standard,
    }
}

/// Combine every sample well over all owned curves of its analyte
fn consensus(
    pairs: &[Pair],
    resolver: &SampleResolver,
    options: &CalibrationOptions,
) -> Vec<ConsensusEstimate> {
    let mut pool: BTreeMap<&str, Vec<&StandardCurve>> = BTreeMap::new();
    for curve in pairs.iter().filter_map(|p| p.curve.as_ref()) {
        if curve.owns_parameters() {
            pool.entry(curve.analyte.as_str()).or_default().push(curve);
        }
    }

    let mut combined = Vec::new();
    for pair in pairs.iter().filter(|p| !p.excluded) {
        let Some(curves) = pool.get(pair.key.1.as_str()) else {
            continue;
        };
        let mut pair_consensus = Vec::new();
        for row in pair.rows.iter().filter(|r| r.well_type() == WellType::Sample) {
            let Ok(FiReading::Valid(fi)) = row.reading() else {
                continue;
            };
            let contributions: Vec<RunEstimate> = curves
                .iter()
                .map(|curve| {
                    let (concentration, fpos) = resolver.concentration(fi, curve);
                    RunEstimate {
                        curve_run: curve.parameter_run().to_string(),
                        concentration,
                        fpos,
                        detection: detection_limit(fi, &curve.params),
                    }
                })
                .collect();
            let Some(summary) = aggregate(&contributions, &options.aggregation) else {
                continue;
            };
            pair_consensus.push(ConsensusEstimate {
                run: row.run.clone(),
                analyte: row.analyte.clone(),
                well: row.well.clone(),
                sample: row.sample_key().to_string(),
                mode: options.aggregation.mode,
                mean: summary.mean,
                std: summary.std,
                fpos_mean: summary.fpos_mean,
                included: summary.included,
                contributions,
            });
        }
        pair_consensus.sort_by(|a, b| a.well.cmp(&b.well));
        combined.extend(pair_consensus);
    }
    combined
}
