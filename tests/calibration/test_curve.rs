//! Tests for the public curve model and parameter records
//!
//! Tests cover:
//! - Instrument curve descriptions
//! - Pipe-delimited parameter records
//! - Inversion at and beyond the asymptotes

use approx::assert_relative_eq;
use lumicurve::curve::*;

#[test]
fn test_documented_descriptions_decode() {
    let five = CurveParameters::from_curve_description(
        "Std. Curve: FI = 27,863 + (7268,64 - 27,863) / ((1 + (Conc / 101819)^-1,51961))^0,62292",
    )
    .unwrap();
    assert_eq!(
        five.to_array(),
        [27.863, 7268.64, 101819.0, -1.51961, 0.62292]
    );

    let four = CurveParameters::from_curve_description(
        "Std. Curve: FI = 48,6354 + (12224,4 - 48,6354) / (1 + (Conc / 915,213)^-1,26429)",
    )
    .unwrap();
    assert_eq!(four.to_array(), [48.6354, 12224.4, 915.213, -1.26429, 1.0]);
}

#[test]
fn test_pipe_record_round_trip() {
    let params: CurveParameters = "27.863 | 7268.64 | 101819 | -1.52 | 0.623".parse().unwrap();
    assert_eq!(params.to_array(), [27.863, 7268.64, 101819.0, -1.52, 0.623]);
    assert_eq!(params.to_record(), "27.863 | 7268.64 | 101819 | -1.52 | 0.623");

    let rounded = CurveParameters::new(27.86349, 7268.6401, 101819.0, -1.51961, 0.62292);
    assert_eq!(rounded.to_record(), "27.863 | 7268.64 | 101819 | -1.52 | 0.623");
}

#[test]
fn test_malformed_records_are_rejected() {
    assert!("1 | 2 | 3 | 4".parse::<CurveParameters>().is_err());
    assert!("1 | 2 | x | 4 | 5".parse::<CurveParameters>().is_err());
}

#[test]
fn test_inversion_is_defined_everywhere() {
    let params = CurveParameters::new(27.863, 7268.64, 101819.0, -1.51961, 0.62292);
    for fi in [-100.0, 0.0, 27.863, 500.0, 7268.64, 9000.0, f64::INFINITY] {
        let conc = invert(fi, &params);
        assert!(conc.is_finite(), "FI {} gave {}", fi, conc);
        assert!(conc >= 0.0);
        assert!(floor_concentration(conc, 0.01) > 0.0);
    }
}

#[test]
fn test_band_matches_confidence_fraction() {
    let params = CurveParameters::new(48.6354, 12224.4, 915.213, -1.26429, 1.0);
    let band = ConfidenceBand::new(&params, 0.8);
    let range = params.dynamic_range();

    assert_relative_eq!(band.f_min, params.a + 0.1 * range, epsilon = 1e-9);
    assert_relative_eq!(band.f_max, params.b - 0.1 * range, epsilon = 1e-9);
    // 4PL: the band is symmetric around C on the log scale
    assert_relative_eq!(
        (band.conc_min * band.conc_max).sqrt(),
        params.c,
        max_relative = 1e-3
    );
}
