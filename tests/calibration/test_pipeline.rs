//! Multi-run pipeline tests on synthetic noisy plates

use approx::assert_relative_eq;
use lumicurve::calibration::*;
use lumicurve::curve::{evaluate, CurveParameters};
use lumicurve::data::{AnalyteSetup, PlateRow, WellType};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

const TOP: f64 = 10000.0;
const SAMPLES: [(&str, f64); 3] = [("P-100", 100.0), ("P-400", 400.0), ("P-1500", 1500.0)];

fn truth() -> CurveParameters {
    CurveParameters::new(30.0, 18000.0, 300.0, -0.95, 1.0)
}

/// Standards with 1% multiplicative noise, noise-free samples
fn noisy_plate(run: &str, analyte: &str, seed: u64) -> Vec<PlateRow> {
    let options = CalibrationOptions::default();
    let analyzer = StandardAnalyzer::new(&options);
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(1.0, 0.01).unwrap();

    let mut rows = Vec::new();
    for n in 1..=options.series_length {
        let wt = WellType::Standard(n);
        let conc = analyzer.nominal_concentration(wt, TOP).unwrap_or_default();
        for replicate in ["A", "B"] {
            rows.push(
                PlateRow::builder(run, analyte, format!("{}{}", replicate, n))
                    .sample_type(wt.to_string())
                    .fi_value(evaluate(conc, &truth()) * noise.sample(&mut rng))
                    .build(),
            );
        }
    }
    for (i, (name, conc)) in SAMPLES.iter().enumerate() {
        rows.push(
            PlateRow::builder(run, analyte, format!("E{}", i + 1))
                .sample_type(format!("X{}", i + 1))
                .sample(*name)
                .fi_value(evaluate(*conc, &truth()))
                .build(),
        );
    }
    rows
}

fn setup(run: &str, analyte: &str) -> AnalyteSetup {
    AnalyteSetup::new(run, analyte).with_top_concentration(TOP)
}

#[test]
fn test_consensus_recovers_sample_concentrations() {
    let mut rows = Vec::new();
    let mut setups = Vec::new();
    for (i, run) in ["r1", "r2", "r3"].iter().enumerate() {
        rows.extend(noisy_plate(run, "IL-6", 11 + i as u64));
        setups.push(setup(run, "IL-6"));
    }

    let report = calibrate(&rows, &setups, &CalibrationOptions::default()).unwrap();
    assert_eq!(report.curves.len(), 3);
    for curve in &report.curves {
        assert_eq!(curve.quality.source, CurveSource::Fitted);
        assert!(curve.quality.r_squared.unwrap() > 0.99);
        assert_eq!(curve.points.len(), 16);
    }

    for (i, (name, conc)) in SAMPLES.iter().enumerate() {
        let consensus = report
            .consensus_for("r2", "IL-6", &format!("E{}", i + 1))
            .unwrap();
        assert_eq!(consensus.sample, *name);
        assert_eq!(consensus.contributions.len(), 3);
        assert_eq!(consensus.included, 3);
        assert_relative_eq!(consensus.mean, *conc, max_relative = 0.15);
        assert!(consensus.std.is_some());
    }
}

#[test]
fn test_analytes_are_calibrated_independently() {
    let mut rows = noisy_plate("r1", "IL-6", 1);
    rows.extend(noisy_plate("r1", "IL-10", 2));
    let setups = [setup("r1", "IL-6"), setup("r1", "IL-10")];

    let report = calibrate(&rows, &setups, &CalibrationOptions::default()).unwrap();
    let analytes: Vec<&str> = report.curves.iter().map(|c| c.analyte.as_str()).collect();
    assert_eq!(analytes, vec!["IL-10", "IL-6"]);

    // one curve per analyte, so a single contribution and no spread
    let consensus = report.consensus_for("r1", "IL-10", "E2").unwrap();
    assert_eq!(consensus.contributions.len(), 1);
    assert_eq!(consensus.std, None);
}

#[test]
fn test_per_run_donor_overrides_default() {
    let mut rows = noisy_plate("r1", "IL-6", 3);
    rows.extend(noisy_plate("r2", "IL-6", 4));
    rows.extend(
        noisy_plate("r3", "IL-6", 5)
            .into_iter()
            .filter(|r| r.well_type() == WellType::Sample),
    );
    let setups = [
        setup("r1", "IL-6").with_curve("FI = 30 + (18000 - 30) / ((1 + (Conc / 300)^-0,95))^1"),
        setup("r2", "IL-6").with_curve("FI = 25 + (17500 - 25) / ((1 + (Conc / 310)^-0,9))^1,1"),
        AnalyteSetup::new("r3", "IL-6"),
    ];
    let fallback = FallbackPolicy::default()
        .with_default_run("r1")
        .with_donor("r3", "r2");
    let options = CalibrationOptions::default().with_fallback(fallback);

    let report = calibrate(&rows, &setups, &options).unwrap();
    let borrowed = report.curve("r3", "IL-6").unwrap();
    assert_eq!(
        borrowed.quality.source,
        CurveSource::Borrowed {
            from_run: "r2".into()
        }
    );
    assert_eq!(borrowed.params, report.curve("r2", "IL-6").unwrap().params);
    assert!(borrowed.points.is_empty());
    assert!(report
        .estimates_for("r3", "IL-6")
        .all(|e| e.curve_run == "r2"));
}

#[test]
fn test_donor_must_own_its_curve() {
    // r2 and r3 both lack a standard; r3 points at r2, which has nothing to lend
    let mut rows = noisy_plate("r1", "IL-6", 6);
    for run in ["r2", "r3"] {
        rows.extend(
            noisy_plate(run, "IL-6", 7)
                .into_iter()
                .filter(|r| r.well_type() == WellType::Sample),
        );
    }
    let setups = [
        setup("r1", "IL-6").with_curve("FI = 30 + (18000 - 30) / ((1 + (Conc / 300)^-0,95))^1"),
        AnalyteSetup::new("r2", "IL-6"),
        AnalyteSetup::new("r3", "IL-6"),
    ];
    let fallback = FallbackPolicy::default()
        .with_donor("r2", "r1")
        .with_donor("r3", "r2");
    let options = CalibrationOptions::default().with_fallback(fallback);

    let report = calibrate(&rows, &setups, &options).unwrap();
    assert!(report.curve("r2", "IL-6").unwrap().quality.source.is_borrowed());
    assert!(report.curve("r3", "IL-6").is_none());
    assert!(report
        .warnings_for("r3", "IL-6")
        .any(|w| matches!(w, Warning::PairExcluded { .. })));
}
