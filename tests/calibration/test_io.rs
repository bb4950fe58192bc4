//! CSV in, CSV out
//!
//! Tests cover:
//! - Tidy plate and setup readers
//! - Options loaded from JSON
//! - Curve and sample writers

use lumicurve::calibration::*;
use lumicurve::data::*;
use lumicurve::LumicurveError;

const PLATE: &str = "\
run,analyte,well,type,sample,fi,bound
r1,IL-6,A1,S1,,\"17381,2\",
r1,IL-6,A2,S2,,\"14127,9\",
r1,IL-6,G1,C1,,\"5180,4\",
r1,IL-6,D1,X1,P-01,\"3302,5\",25-250
r1,IL-6,D2,X2,P-02,OOR <,
r1,IL-6,D3,X3,P-03,bubble,
r1,TNF-a,A1,S1,,912,
";

const SETUP: &str = "\
Run,Analyte,Top,C1,C2,Curve
r1,IL-6,10000,50-200,500-2000,\"FI = 30 + (18000 - 30) / ((1 + (Conc / 300)^-0,95))^1\"
";

fn run_plate(options: &CalibrationOptions) -> Result<CalibrationReport, LumicurveError> {
    let rows = read_plate_rows_from_reader(PLATE.as_bytes())?;
    let setups = read_analyte_setups_from_reader(SETUP.as_bytes())?;
    Ok(calibrate(&rows, &setups, options)?)
}

#[test]
fn test_plate_from_csv() {
    let options = CalibrationOptions::default();
    let report = run_plate(&options).unwrap();

    assert_eq!(report.curves.len(), 1);
    assert_eq!(report.estimates.len(), 6);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.analyte == "TNF-a" && w.warning == Warning::UnknownAnalyte));

    let flagged = report.estimate("r1", "IL-6", "D3").unwrap();
    assert_eq!(flagged.reading, FiReading::InstrumentFlagged);
    assert_eq!(flagged.output_concentration(&options.sentinels), -3.0);

    let bounded = report.estimate("r1", "IL-6", "D1").unwrap();
    assert!(bounded.coff.is_some());
}

#[test]
fn test_options_from_json_drive_sentinels() {
    let options = CalibrationOptions::from_json_str(
        r#"{ "sentinels": { "below_range": -20.0 }, "aggregation": { "min_fpos": 0.0 } }"#,
    )
    .unwrap();
    let report = run_plate(&options).unwrap();

    let records = report.sample_records(&options.sentinels);
    let below = records.iter().find(|r| r.well == "D2").unwrap();
    assert_eq!(below.concentration, -20.0);
    assert_eq!(below.conc_mean, None);
}

#[test]
fn test_written_records_parse_back() {
    let options = CalibrationOptions::default();
    let report = run_plate(&options).unwrap();

    let mut curves = Vec::new();
    write_curve_records(&mut curves, &report.curve_records()).unwrap();
    let mut reader = csv::Reader::from_reader(curves.as_slice());
    let parsed: Vec<CurveRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();
    assert_eq!(parsed, report.curve_records());

    let mut samples = Vec::new();
    write_sample_records(&mut samples, &report.sample_records(&options.sentinels)).unwrap();
    let text = String::from_utf8(samples).unwrap();
    assert_eq!(text.lines().count(), 1 + report.estimates.len());
    assert!(text.starts_with("Run,Analyte,Well,Type,Sample,FI,conc,Fpos,Coff,concMean,concStd,FposMean"));
}

#[test]
fn test_invalid_setup_number() {
    let setup = "run,analyte,top\nr1,IL-6,lots\n";
    let err = read_analyte_setups_from_reader(setup.as_bytes()).unwrap_err();
    assert!(matches!(err, DataError::InvalidNumber { .. }));
    assert!(matches!(LumicurveError::from(err), LumicurveError::DataError(_)));
}
