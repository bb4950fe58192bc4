//! Scenario tests for the calibration pipeline
//!
//! Plates are synthesized from known 5PL parameters so every expected value
//! can be derived from the curve model.

use approx::assert_relative_eq;

use crate::calibration::*;
use crate::curve::{evaluate, CurveParameters};
use crate::curve::DetectionLimit;
use crate::data::{AnalyteSetup, FiReading, PlateRow, WellType};
use crate::optimize::FitOptions;

const TOP: f64 = 10000.0;
const ANALYTE: &str = "IL-6";

// ============================================================================
// Fixtures
// ============================================================================

fn truth() -> CurveParameters {
    CurveParameters::new(30.0, 18000.0, 300.0, -0.95, 1.0)
}

/// Instrument-style description of `truth()`
fn truth_description() -> String {
    "FI = 30 + (18000 - 30) / ((1 + (Conc / 300)^-0,95))^1".to_string()
}

fn well(run: &str, well: &str, label: &str, fi: f64) -> PlateRow {
    PlateRow::builder(run, ANALYTE, well)
        .sample_type(label)
        .fi_value(fi)
        .build()
}

/// Full standard series, blank, both controls and three samples
fn plate(run: &str, params: &CurveParameters) -> Vec<PlateRow> {
    let options = CalibrationOptions::default();
    let analyzer = StandardAnalyzer::new(&options);

    let mut rows: Vec<PlateRow> = (1..=options.series_length)
        .map(|n| {
            let wt = WellType::Standard(n);
            let conc = analyzer.nominal_concentration(wt, TOP).unwrap_or_default();
            well(run, &format!("A{}", n), &wt.to_string(), evaluate(conc, params))
        })
        .collect();
    rows.push(well(run, "B1", "Blank", evaluate(0.1, params)));
    rows.push(well(run, "G1", "C1", evaluate(100.0, params)));
    rows.push(well(run, "G2", "C2", evaluate(1000.0, params)));

    for (w, label, name, conc) in [("D1", "X1", "P-01", 80.0), ("D2", "X2", "P-02", 400.0)] {
        rows.push(
            PlateRow::builder(run, ANALYTE, w)
                .sample_type(label)
                .sample(name)
                .fi_value(evaluate(conc, params))
                .build(),
        );
    }
    rows.push(
        PlateRow::builder(run, ANALYTE, "D3")
            .sample_type("X3")
            .sample("P-03")
            .fi("OOR >")
            .build(),
    );
    rows
}

fn fitted_setup(run: &str) -> AnalyteSetup {
    AnalyteSetup::new(run, ANALYTE)
        .with_top_concentration(TOP)
        .with_control_ranges("50-200", "500–2000")
}

fn imported_setup(run: &str) -> AnalyteSetup {
    fitted_setup(run).with_curve(truth_description())
}

// ============================================================================
// Local standards
// ============================================================================

#[test]
fn test_fitted_pair_end_to_end() {
    let rows = plate("r1", &truth());
    let options = CalibrationOptions::default();
    let report = calibrate(&rows, &[fitted_setup("r1")], &options).unwrap();

    let curve = report.curve("r1", ANALYTE).unwrap();
    assert_eq!(curve.quality.source, CurveSource::Fitted);
    assert!(curve.quality.r_squared.unwrap() > 0.99);
    assert!((curve.params.a - 30.0).abs() < 0.05 * 17970.0);
    assert!((curve.params.b - 18000.0).abs() < 0.05 * 18000.0);
    assert!(curve.has_full_standard);
    assert_eq!(curve.points.len(), 9);

    // every well gets an estimate
    assert_eq!(report.estimates_for("r1", ANALYTE).count(), rows.len());
    let d2 = report.estimate("r1", ANALYTE, "D2").unwrap();
    assert_relative_eq!(d2.concentration.unwrap(), 400.0, max_relative = 0.05);

    let d3 = report.estimate("r1", ANALYTE, "D3").unwrap();
    assert_eq!(d3.reading, FiReading::AboveRange);
    assert_eq!(d3.output_concentration(&options.sentinels), -1.0);
    assert!(report
        .warnings_for("r1", ANALYTE)
        .any(|w| matches!(w, Warning::FlaggedReading { well, .. } if well == "D3")));
}

#[test]
fn test_fi_at_upper_asymptote_is_large_and_finite() {
    let mut rows = plate("r1", &truth());
    rows.push(well("r1", "E1", "X9", 18000.0));
    let options = CalibrationOptions::default();
    let report = calibrate(&rows, &[imported_setup("r1")], &options).unwrap();

    let estimate = report.estimate("r1", ANALYTE, "E1").unwrap();
    let conc = estimate.concentration.unwrap();
    assert!(conc.is_finite());
    assert!(conc > 1e6);
}

#[test]
fn test_samples_beyond_asymptotes_are_warned() {
    let mut rows = plate("r1", &truth());
    rows.push(well("r1", "E1", "X4", 18500.0));
    rows.push(well("r1", "E2", "X5", 5.0));
    rows.extend(plate("r2", &truth()));
    let setups = [imported_setup("r1"), imported_setup("r2")];
    let report = calibrate(&rows, &setups, &CalibrationOptions::default()).unwrap();

    let warnings: Vec<&Warning> = report.warnings_for("r1", ANALYTE).collect();
    assert!(warnings.contains(&&Warning::AboveDetection {
        well: "E1".into(),
        fi: 18500.0
    }));
    assert!(warnings.contains(&&Warning::BelowDetection {
        well: "E2".into(),
        fi: 5.0
    }));
    // in-range samples stay quiet
    assert!(!warnings
        .iter()
        .any(|w| matches!(w, Warning::AboveDetection { well, .. } | Warning::BelowDetection { well, .. } if well == "D2")));

    // the estimate is still reported, floored
    let saturated = report.estimate("r1", ANALYTE, "E1").unwrap();
    assert_eq!(saturated.concentration, Some(0.01));

    // a saturated well never enters the consensus as the lowest concentration
    assert!(report.consensus_for("r1", ANALYTE, "E1").is_none());
    assert!(report.consensus_for("r1", ANALYTE, "E2").is_none());
    let consensus = report.consensus_for("r1", ANALYTE, "D2").unwrap();
    assert!(consensus.contributions.iter().all(|c| c.detection.is_none()));
    assert_relative_eq!(consensus.mean, 400.0, max_relative = 0.01);
}

#[test]
fn test_saturated_sample_excluded_from_other_runs_consensus() {
    let mut rows = plate("r1", &truth());
    rows.extend(plate("r2", &truth()));
    // above r2's B but inside r1's range
    rows.push(well("r1", "E1", "X4", 17500.0));
    let lower = "FI = 30 + (17000 - 30) / ((1 + (Conc / 300)^-0,95))^1";
    let setups = [imported_setup("r1"), fitted_setup("r2").with_curve(lower)];
    let report = calibrate(&rows, &setups, &CalibrationOptions::default()).unwrap();

    let consensus = report.consensus_for("r1", ANALYTE, "E1").unwrap();
    assert_eq!(consensus.contributions.len(), 2);
    assert_eq!(consensus.contributions[1].detection, Some(DetectionLimit::Above));
    assert_eq!(consensus.included, 1);
    assert_relative_eq!(consensus.mean, consensus.contributions[0].concentration, epsilon = 0.01);
    assert!(consensus.mean > 1000.0);
}

#[test]
fn test_controls_centered_in_known_range() {
    let rows = plate("r1", &truth());
    let options = CalibrationOptions::default();
    let report = calibrate(&rows, &[imported_setup("r1")], &options).unwrap();

    let quality = &report.curve("r1", ANALYTE).unwrap().quality;
    assert_eq!(quality.source, CurveSource::Imported);
    assert_relative_eq!(quality.control_fit(1).unwrap(), 0.5, epsilon = 1e-3);
    assert_relative_eq!(quality.control_fit(2).unwrap(), 0.5, epsilon = 1e-3);
    assert!(!report
        .warnings_for("r1", ANALYTE)
        .any(|w| matches!(w, Warning::ControlOutOfRange { .. })));
}

// ============================================================================
// Borrowing and exclusion
// ============================================================================

#[test]
fn test_run_without_standard_borrows_donor() {
    let mut rows = plate("r1", &truth());
    rows.extend(
        plate("r2", &truth())
            .into_iter()
            .filter(|r| !r.well_type().is_standard_or_blank()),
    );
    let setups = [
        imported_setup("r1"),
        AnalyteSetup::new("r2", ANALYTE).with_control_ranges("50-200", "500-2000"),
    ];
    let options = CalibrationOptions::default().with_default_fallback_run("r1");

    let report = calibrate(&rows, &setups, &options).unwrap();
    let donor = report.curve("r1", ANALYTE).unwrap();
    let borrowed = report.curve("r2", ANALYTE).unwrap();

    assert_eq!(
        borrowed.quality.source,
        CurveSource::Borrowed {
            from_run: "r1".into()
        }
    );
    assert_eq!(borrowed.params, donor.params);
    assert!(!borrowed.has_full_standard);
    // r2's own controls are scored against the borrowed curve
    assert!(borrowed.quality.control_fit(1).is_some());

    let warnings: Vec<&Warning> = report.warnings_for("r2", ANALYTE).collect();
    assert!(warnings.contains(&&Warning::BorrowedCurve {
        from_run: "r1".into()
    }));
    assert!(warnings
        .iter()
        .any(|w| matches!(w, Warning::NoStandardUsable { .. })));

    let estimate = report.estimate("r2", ANALYTE, "D2").unwrap();
    assert_eq!(estimate.curve_run, "r1");
}

#[test]
fn test_missing_top_without_donor_excludes_pair() {
    let rows: Vec<PlateRow> = plate("r2", &truth());
    let options = CalibrationOptions::default();
    let report = calibrate(&rows, &[AnalyteSetup::new("r2", ANALYTE)], &options).unwrap();

    assert!(report.curve("r2", ANALYTE).is_none());
    assert_eq!(report.estimates_for("r2", ANALYTE).count(), 0);
    assert!(report.consensus.is_empty());
    assert!(report
        .warnings_for("r2", ANALYTE)
        .any(|w| matches!(w, Warning::PairExcluded { .. })));
}

#[test]
fn test_unusable_standard_without_donor() {
    let mut rows = plate("r1", &truth());
    rows.extend(
        plate("r3", &truth())
            .into_iter()
            .filter(|r| !matches!(r.well_type(), WellType::Standard(n) if n > 3)),
    );
    let setups = [imported_setup("r1"), fitted_setup("r3")];
    let options = CalibrationOptions::default();

    let report = calibrate(&rows, &setups, &options).unwrap();
    assert!(report.curve("r3", ANALYTE).is_none());
    let warnings: Vec<&Warning> = report.warnings_for("r3", ANALYTE).collect();
    assert!(warnings.contains(&&Warning::IncompleteStandard {
        found: 3,
        expected: 8
    }));
    assert!(warnings
        .iter()
        .any(|w| matches!(w, Warning::NoStandardUsable { .. })));

    // r3's samples still get a consensus from r1's curve
    let consensus = report.consensus_for("r3", ANALYTE, "D2").unwrap();
    assert_eq!(consensus.contributions.len(), 1);
    assert_eq!(consensus.contributions[0].curve_run, "r1");
}

#[test]
fn test_non_converged_fit_without_donor_has_no_curve() {
    let mut rows = plate("r1", &truth());
    rows.extend(plate("r2", &truth()));
    let setups = [fitted_setup("r1"), imported_setup("r2")];
    let fit = FitOptions::default().with_max_iters(1).with_max_restarts(0);
    let options = CalibrationOptions::default().with_fit_options(fit);

    let report = calibrate(&rows, &setups, &options).unwrap();
    assert!(report.curve("r1", ANALYTE).is_none());
    assert_eq!(report.estimates_for("r1", ANALYTE).count(), 0);
    let warnings: Vec<&Warning> = report.warnings_for("r1", ANALYTE).collect();
    assert!(warnings
        .iter()
        .any(|w| matches!(w, Warning::FitNotConverged { .. })));
    assert!(warnings.contains(&&Warning::NoStandardUsable {
        reason: "fit did not converge".into()
    }));

    // the unconverged parameters never reach the consensus
    let consensus = report.consensus_for("r1", ANALYTE, "D2").unwrap();
    let runs: Vec<&str> = consensus
        .contributions
        .iter()
        .map(|c| c.curve_run.as_str())
        .collect();
    assert_eq!(runs, vec!["r2"]);

    // with a donor the pair borrows instead
    let options = options.with_default_fallback_run("r2");
    let report = calibrate(&rows, &setups, &options).unwrap();
    let borrowed = report.curve("r1", ANALYTE).unwrap();
    assert_eq!(
        borrowed.quality.source,
        CurveSource::Borrowed {
            from_run: "r2".into()
        }
    );
}

#[test]
fn test_invalid_control_range_excludes_only_that_pair() {
    let mut rows = plate("r1", &truth());
    rows.extend(plate("r2", &truth()));
    let broken = AnalyteSetup::new("r2", ANALYTE)
        .with_curve(truth_description())
        .with_control_ranges("n/a", "500-2000");
    let setups = [imported_setup("r1"), broken];

    let report = calibrate(&rows, &setups, &CalibrationOptions::default()).unwrap();
    assert!(report.curve("r1", ANALYTE).is_some());
    assert!(report.curve("r2", ANALYTE).is_none());
    assert!(report
        .warnings_for("r2", ANALYTE)
        .any(|w| matches!(w, Warning::PairExcluded { reason } if reason.contains("C1"))));
    assert!(report.consensus_for("r2", ANALYTE, "D2").is_none());
    assert!(report.consensus_for("r1", ANALYTE, "D2").is_some());
}

#[test]
fn test_unknown_analyte_is_skipped() {
    let mut rows = plate("r1", &truth());
    rows.push(
        PlateRow::builder("r1", "TNF-a", "A1")
            .sample_type("S1")
            .fi_value(1000.0)
            .build(),
    );
    let report = calibrate(&rows, &[imported_setup("r1")], &CalibrationOptions::default()).unwrap();

    assert!(report.curve("r1", "TNF-a").is_none());
    assert_eq!(
        report.warnings_for("r1", "TNF-a").collect::<Vec<_>>(),
        vec![&Warning::UnknownAnalyte]
    );
}

// ============================================================================
// Cross-run consensus
// ============================================================================

#[test]
fn test_consensus_over_owned_curves() {
    let shifted = CurveParameters::new(30.0, 17000.0, 320.0, -0.95, 1.0);
    let mut rows = plate("r1", &truth());
    rows.extend(plate("r2", &truth()));
    rows.extend(
        plate("r3", &truth())
            .into_iter()
            .filter(|r| !r.well_type().is_standard_or_blank()),
    );
    let setups = [
        imported_setup("r1"),
        fitted_setup("r2").with_curve("FI = 30 + (17000 - 30) / ((1 + (Conc / 320)^-0,95))^1"),
        AnalyteSetup::new("r3", ANALYTE),
    ];
    let options = CalibrationOptions::default().with_default_fallback_run("r1");
    let report = calibrate(&rows, &setups, &options).unwrap();
    assert_eq!(report.curve("r2", ANALYTE).unwrap().params, shifted);

    // the borrowed r3 curve does not add a third contribution
    let consensus = report.consensus_for("r1", ANALYTE, "D2").unwrap();
    let runs: Vec<&str> = consensus
        .contributions
        .iter()
        .map(|c| c.curve_run.as_str())
        .collect();
    assert_eq!(runs, vec!["r1", "r2"]);
    assert_eq!(consensus.included, 2);
    assert_eq!(consensus.mode, AggregationMode::Arithmetic);

    let low = consensus.contributions[0].concentration;
    let high = consensus.contributions[1].concentration;
    assert!(low < high);
    assert!(consensus.mean >= low && consensus.mean <= high);
    assert!(consensus.std.unwrap() > 0.0);

    // marker wells get no consensus
    assert!(report.consensus_for("r1", ANALYTE, "D3").is_none());
    assert!(report.consensus_for("r3", ANALYTE, "D1").is_some());
}

#[test]
fn test_geometric_consensus() {
    let mut rows = plate("r1", &truth());
    rows.extend(plate("r2", &truth()));
    let setups = [imported_setup("r1"), imported_setup("r2")];
    let options = CalibrationOptions::default().with_aggregation_mode(AggregationMode::Geometric);
    let report = calibrate(&rows, &setups, &options).unwrap();

    // identical curves agree exactly
    let consensus = report.consensus_for("r2", ANALYTE, "D1").unwrap();
    assert_eq!(consensus.mode, AggregationMode::Geometric);
    assert_relative_eq!(consensus.mean, 80.0, epsilon = 0.01);
    assert_relative_eq!(consensus.std.unwrap(), 1.0, epsilon = 1e-9);
}

// ============================================================================
// Batch behaviour
// ============================================================================

#[test]
fn test_calibration_is_idempotent() {
    let mut rows = plate("r1", &truth());
    rows.extend(plate("r2", &CurveParameters::new(45.0, 16000.0, 250.0, -0.9, 1.1)));
    let setups = [fitted_setup("r1"), fitted_setup("r2")];
    let options = CalibrationOptions::default();

    let first = calibrate(&rows, &setups, &options).unwrap();
    let second = calibrate(&rows, &setups, &options).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.curves.len(), 2);
    assert_eq!(first.curves[0].run, "r1");
    assert_eq!(first.curves[1].run, "r2");
}

#[test]
fn test_invalid_options_fail_the_batch() {
    let rows = plate("r1", &truth());
    let options = CalibrationOptions::default().with_confidence(1.2);
    assert!(matches!(
        calibrate(&rows, &[fitted_setup("r1")], &options),
        Err(CalibrationError::InvalidParameter { .. })
    ));
}

#[test]
fn test_records_cover_report() {
    let rows = plate("r1", &truth());
    let options = CalibrationOptions::default();
    let report = calibrate(&rows, &[imported_setup("r1")], &options).unwrap();

    let curves = report.curve_records();
    assert_eq!(curves.len(), 1);
    assert_eq!(curves[0].source, "imported");
    assert!(curves[0].c1_fit.is_some());

    let samples = report.sample_records(&options.sentinels);
    assert_eq!(samples.len(), rows.len());
    let d1 = samples.iter().find(|r| r.well == "D1").unwrap();
    assert!(d1.conc_mean.is_some());
    assert!(d1.fpos_mean.is_some());
}
