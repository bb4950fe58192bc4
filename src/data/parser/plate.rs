use csv::{ReaderBuilder, StringRecord};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

use crate::data::{parse_decimal, AnalyteSetup, ConcentrationRange, DataError, PlateRow};

/// A row of the tidy plate file, before interpretation
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "lowercase")]
struct RawPlateRow {
    run: String,
    analyte: String,
    well: String,
    #[serde(rename = "type")]
    sample_type: String,
    #[serde(default)]
    sample: Option<String>,
    #[serde(default)]
    fi: Option<String>,
    #[serde(default)]
    bound: Option<String>,
}

impl RawPlateRow {
    fn into_row(self) -> PlateRow {
        let bound = self
            .bound
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .and_then(|raw| match ConcentrationRange::parse(raw) {
                Ok(range) => Some(range),
                Err(e) => {
                    tracing::warn!(run = %self.run, well = %self.well, "Ignoring sample bound: {}", e);
                    None
                }
            });

        PlateRow {
            run: self.run,
            analyte: self.analyte,
            well: self.well,
            sample_type: self.sample_type,
            sample: self.sample.filter(|s| !s.trim().is_empty()),
            fi: self.fi.unwrap_or_default(),
            bound,
        }
    }
}

/// A row of the analyte setup file
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "lowercase")]
struct RawSetup {
    run: String,
    analyte: String,
    #[serde(default)]
    top: Option<String>,
    #[serde(default)]
    c1: Option<String>,
    #[serde(default)]
    c2: Option<String>,
    #[serde(default)]
    curve: Option<String>,
}

impl RawSetup {
    fn into_setup(self) -> Result<AnalyteSetup, DataError> {
        let top_concentration = match self.top.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_decimal(raw).ok_or_else(|| DataError::InvalidNumber {
                raw: raw.to_string(),
                column: "top".to_string(),
            })?),
        };
        let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());

        Ok(AnalyteSetup {
            run: self.run,
            analyte: self.analyte,
            top_concentration,
            c1_range: non_empty(self.c1),
            c2_range: non_empty(self.c2),
            curve: non_empty(self.curve),
        })
    }
}

fn lowercase_reader<R: Read>(reader: R) -> Result<csv::Reader<R>, DataError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|e| DataError::CSVError(e.to_string()))?
        .iter()
        .map(|h| h.to_lowercase())
        .collect::<Vec<_>>();
    reader.set_headers(StringRecord::from(headers));
    Ok(reader)
}

/// Read tidy plate rows from any reader
///
/// Expected columns (case-insensitive): `run`, `analyte`, `well`, `type`,
/// and optionally `sample`, `fi`, `bound`. FI cells are kept verbatim.
pub fn read_plate_rows_from_reader<R: Read>(reader: R) -> Result<Vec<PlateRow>, DataError> {
    let mut reader = lowercase_reader(reader)?;
    reader
        .deserialize::<RawPlateRow>()
        .map(|row| {
            row.map(RawPlateRow::into_row)
                .map_err(|e| DataError::CSVError(e.to_string()))
        })
        .collect()
}

/// Read tidy plate rows from a CSV file
///
/// # Example
///
/// ```rust,no_run
/// use lumicurve::data::parser::read_plate_rows;
///
/// let rows = read_plate_rows("path/to/plate.csv").unwrap();
/// println!("{} wells", rows.len());
/// ```
pub fn read_plate_rows(path: impl AsRef<Path>) -> Result<Vec<PlateRow>, DataError> {
    let file = std::fs::File::open(path.as_ref()).map_err(|e| DataError::CSVError(e.to_string()))?;
    read_plate_rows_from_reader(file)
}

/// Read analyte setups from any reader
///
/// Expected columns (case-insensitive): `run`, `analyte`, and optionally
/// `top`, `c1`, `c2`, `curve`.
pub fn read_analyte_setups_from_reader<R: Read>(reader: R) -> Result<Vec<AnalyteSetup>, DataError> {
    let mut reader = lowercase_reader(reader)?;
    let mut setups = Vec::new();
    for row in reader.deserialize::<RawSetup>() {
        let raw = row.map_err(|e| DataError::CSVError(e.to_string()))?;
        setups.push(raw.into_setup()?);
    }
    Ok(setups)
}

/// Read analyte setups from a CSV file
pub fn read_analyte_setups(path: impl AsRef<Path>) -> Result<Vec<AnalyteSetup>, DataError> {
    let file = std::fs::File::open(path.as_ref()).map_err(|e| DataError::CSVError(e.to_string()))?;
    read_analyte_setups_from_reader(file)
}
