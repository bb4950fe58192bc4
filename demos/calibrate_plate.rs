//! Calibrate a plate export
//!
//! Reads a tidy plate CSV and an analyte setup CSV, fits one curve per
//! (run, analyte) and prints the curve and sample tables to stdout.
//!
//! Run with: `cargo run --example calibrate_plate -- plate.csv setup.csv [options.json]`
//!
//! Without arguments a synthetic two-run plate is calibrated instead, with the
//! second run borrowing the first run's curve.

use anyhow::{Context, Result};
use lumicurve::calibration::{
    calibrate, write_curve_records, write_sample_records, CalibrationOptions,
};
use lumicurve::curve::{evaluate, CurveParameters};
use lumicurve::data::{read_analyte_setups, read_plate_rows, AnalyteSetup, PlateRow};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let (rows, setups, options) = match args.as_slice() {
        [plate, setup, rest @ ..] => {
            let rows = read_plate_rows(plate).with_context(|| format!("reading {}", plate))?;
            let setups = read_analyte_setups(setup).with_context(|| format!("reading {}", setup))?;
            let options = match rest.first() {
                Some(path) => CalibrationOptions::from_json_file(path)
                    .with_context(|| format!("loading options from {}", path))?,
                None => CalibrationOptions::default(),
            };
            (rows, setups, options)
        }
        _ => {
            println!("=== synthetic plate (pass plate.csv setup.csv to use your own) ===\n");
            let (rows, setups) = synthetic_plate();
            let options = CalibrationOptions::default().with_default_fallback_run("run_01");
            (rows, setups, options)
        }
    };

    let report = calibrate(&rows, &setups, &options)?;

    if !report.warnings.is_empty() {
        println!("--- warnings ---");
        for warning in &report.warnings {
            println!("{}", warning);
        }
        println!();
    }

    println!("--- curves ---");
    write_curve_records(std::io::stdout(), &report.curve_records())?;
    println!("\n--- samples ---");
    write_sample_records(std::io::stdout(), &report.sample_records(&options.sentinels))?;

    Ok(())
}

/// Two runs of IL-6; only the first carries standards
fn synthetic_plate() -> (Vec<PlateRow>, Vec<AnalyteSetup>) {
    let truth = CurveParameters::new(30.0, 18000.0, 300.0, -0.95, 1.0);
    let mut rows = Vec::new();

    let mut conc = 10000.0;
    for n in 1..=8 {
        let fi = if n == 8 { evaluate(0.1, &truth) } else { evaluate(conc, &truth) };
        rows.push(
            PlateRow::builder("run_01", "IL-6", format!("A{}", n))
                .sample_type(format!("S{}", n))
                .fi_value(fi)
                .build(),
        );
        conc /= 4.0;
    }

    for run in ["run_01", "run_02"] {
        for (i, sample_conc) in [80.0, 400.0, 1500.0].iter().enumerate() {
            rows.push(
                PlateRow::builder(run, "IL-6", format!("D{}", i + 1))
                    .sample_type(format!("X{}", i + 1))
                    .sample(format!("P-{:02}", i + 1))
                    .fi_value(evaluate(*sample_conc, &truth))
                    .build(),
            );
        }
        rows.push(
            PlateRow::builder(run, "IL-6", "D4")
                .sample_type("X4")
                .sample("P-04")
                .fi("OOR >")
                .build(),
        );
    }

    let setups = vec![
        AnalyteSetup::new("run_01", "IL-6").with_top_concentration(10000.0),
        AnalyteSetup::new("run_02", "IL-6"),
    ];
    (rows, setups)
}
