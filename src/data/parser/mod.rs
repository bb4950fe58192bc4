//! CSV readers for tidy plate exports and analyte setup tables

mod plate;

pub use plate::{
    read_analyte_setups, read_analyte_setups_from_reader, read_plate_rows,
    read_plate_rows_from_reader,
};
