//! Flat output records and CSV writers

use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::io::Write;

use super::batch::CalibrationReport;
use super::types::{ConcentrationEstimate, ConsensusEstimate, StandardCurve};
use crate::curve::round_to;
use crate::data::{DataError, SentinelCodes};

/// Decimal places of R² in curve records
pub const R_SQUARED_DECIMALS: i32 = 6;

/// One row per calibrated curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveRecord {
    #[serde(rename = "Run")]
    pub run: String,
    #[serde(rename = "Analyte")]
    pub analyte: String,
    /// `A | B | C | D | E`
    #[serde(rename = "Params")]
    pub params: String,
    #[serde(rename = "R2")]
    pub r_squared: Option<f64>,
    #[serde(rename = "ConcMin")]
    pub conc_min: f64,
    #[serde(rename = "ConcMax")]
    pub conc_max: f64,
    #[serde(rename = "Fmin")]
    pub f_min: f64,
    #[serde(rename = "Fmax")]
    pub f_max: f64,
    #[serde(rename = "StMax")]
    pub saturation_reach: Option<f64>,
    #[serde(rename = "C1fit")]
    pub c1_fit: Option<f64>,
    #[serde(rename = "C2fit")]
    pub c2_fit: Option<f64>,
    #[serde(rename = "Source")]
    pub source: String,
}

impl From<&StandardCurve> for CurveRecord {
    fn from(curve: &StandardCurve) -> Self {
        let quality = &curve.quality;
        CurveRecord {
            run: curve.run.clone(),
            analyte: curve.analyte.clone(),
            params: curve.params.to_record(),
            r_squared: quality.r_squared.map(|r| round_to(r, R_SQUARED_DECIMALS)),
            conc_min: quality.band.conc_min,
            conc_max: quality.band.conc_max,
            f_min: quality.band.f_min,
            f_max: quality.band.f_max,
            saturation_reach: quality.saturation_reach,
            c1_fit: quality.control_fit(1),
            c2_fit: quality.control_fit(2),
            source: quality.source.to_string(),
        }
    }
}

/// One row per resolved well
///
/// `conc` carries the sentinel code for marker readings. The consensus
/// columns are empty when no cross-run estimate exists for the well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    #[serde(rename = "Run")]
    pub run: String,
    #[serde(rename = "Analyte")]
    pub analyte: String,
    #[serde(rename = "Well")]
    pub well: String,
    #[serde(rename = "Type")]
    pub sample_type: String,
    #[serde(rename = "Sample")]
    pub sample: String,
    #[serde(rename = "FI")]
    pub fi: Option<f64>,
    #[serde(rename = "conc")]
    pub concentration: f64,
    #[serde(rename = "Fpos")]
    pub fpos: Option<f64>,
    #[serde(rename = "Coff")]
    pub coff: Option<f64>,
    #[serde(rename = "concMean")]
    pub conc_mean: Option<f64>,
    #[serde(rename = "concStd")]
    pub conc_std: Option<f64>,
    #[serde(rename = "FposMean")]
    pub fpos_mean: Option<f64>,
}

impl SampleRecord {
    pub fn new(
        estimate: &ConcentrationEstimate,
        consensus: Option<&ConsensusEstimate>,
        codes: &SentinelCodes,
    ) -> Self {
        SampleRecord {
            run: estimate.run.clone(),
            analyte: estimate.analyte.clone(),
            well: estimate.well.clone(),
            sample_type: estimate.sample_type.clone(),
            sample: estimate.sample.clone(),
            fi: estimate.reading.value(),
            concentration: estimate.output_concentration(codes),
            fpos: estimate.fpos,
            coff: estimate.coff,
            conc_mean: consensus.map(|c| c.mean),
            conc_std: consensus.and_then(|c| c.std),
            fpos_mean: consensus.and_then(|c| c.fpos_mean),
        }
    }
}

impl CalibrationReport {
    pub fn curve_records(&self) -> Vec<CurveRecord> {
        self.curves.iter().map(CurveRecord::from).collect()
    }

    pub fn sample_records(&self, codes: &SentinelCodes) -> Vec<SampleRecord> {
        self.estimates
            .iter()
            .map(|e| SampleRecord::new(e, self.consensus_for(&e.run, &e.analyte, &e.well), codes))
            .collect()
    }
}

fn write_records<W: Write, T: Serialize>(writer: W, records: &[T]) -> Result<(), DataError> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(writer);
    for record in records {
        writer
            .serialize(record)
            .map_err(|e| DataError::CSVError(e.to_string()))?;
    }
    writer.flush().map_err(|e| DataError::CSVError(e.to_string()))
}

/// Write curve records as CSV with a header row
pub fn write_curve_records<W: Write>(writer: W, records: &[CurveRecord]) -> Result<(), DataError> {
    write_records(writer, records)
}

/// Write sample records as CSV with a header row
pub fn write_sample_records<W: Write>(writer: W, records: &[SampleRecord]) -> Result<(), DataError> {
    write_records(writer, records)
}
