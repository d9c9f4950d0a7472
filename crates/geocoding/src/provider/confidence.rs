//! Mapping from each provider's match vocabulary to precision and confidence.
//!
//! | Provider vocabulary | Precision | Confidence |
//! |---------------------|-----------|------------|
//! | Google `ROOFTOP` | Rooftop | 0.95 |
//! | Google `RANGE_INTERPOLATED` | Interpolated | 0.85 |
//! | Google `GEOMETRIC_CENTER` | Approximate | 0.70 |
//! | Google `APPROXIMATE` | Approximate | 0.50 |
//! | Google `partial_match` | unchanged | -0.10, floor 0.40, `Partial` |
//! | Census address match | Interpolated | 0.85 |
//! | Nominatim house / building | Rooftop | 0.90 |
//! | Nominatim street | Approximate | 0.70 |
//! | Nominatim place / area | Approximate | 0.50 |
//!
//! Anything under 0.60 is reported as `Partial`.
//!
//! Several matches for one address are ambiguous, and the call fails as an
//! empty result, unless they all lie within [`SAME_PLACE_TOLERANCE_DEG`] of
//! the first. Google's first result also stands when it is a full match and
//! every other result is a partial match or has a lower-confidence
//! location type.

use crate::models::Precision;

/// Census matches are interpolated along TIGER address ranges.
pub const CENSUS_MATCH: (Precision, f64) = (Precision::Interpolated, 0.85);

/// About 100 m of latitude; matches closer than this are one place.
pub const SAME_PLACE_TOLERANCE_DEG: f64 = 0.001;

const PARTIAL_MATCH_PENALTY: f64 = 0.10;
const PARTIAL_MATCH_FLOOR: f64 = 0.40;

/// Google `geometry.location_type`.
pub fn google_location_type(location_type: &str) -> (Precision, f64) {
    match location_type {
        "ROOFTOP" => (Precision::Rooftop, 0.95),
        "RANGE_INTERPOLATED" => (Precision::Interpolated, 0.85),
        "GEOMETRIC_CENTER" => (Precision::Approximate, 0.70),
        _ => (Precision::Approximate, 0.50),
    }
}

/// Confidence after Google flags the match as partial.
pub fn google_partial_match(confidence: f64) -> f64 {
    (confidence - PARTIAL_MATCH_PENALTY).max(PARTIAL_MATCH_FLOOR)
}

/// Whether every `(lat, lon)` lies within tolerance of the first.
pub fn same_place(points: &[(f64, f64)]) -> bool {
    match points.split_first() {
        Some(((lat, lon), rest)) => rest.iter().all(|(other_lat, other_lon)| {
            (other_lat - lat).abs() <= SAME_PLACE_TOLERANCE_DEG
                && (other_lon - lon).abs() <= SAME_PLACE_TOLERANCE_DEG
        }),
        None => true,
    }
}

/// Nominatim `category`/`type`/`addresstype` of the top hit.
pub fn nominatim_place(category: &str, place_type: &str, address_type: &str) -> (Precision, f64) {
    const ADDRESS_LEVEL: &[&str] = &["house", "building", "house_number"];
    const STREET_LEVEL: &[&str] = &["road", "street"];

    if category == "building"
        || ADDRESS_LEVEL.contains(&place_type)
        || ADDRESS_LEVEL.contains(&address_type)
    {
        (Precision::Rooftop, 0.90)
    } else if category == "highway"
        || STREET_LEVEL.contains(&place_type)
        || STREET_LEVEL.contains(&address_type)
    {
        (Precision::Approximate, 0.70)
    } else {
        (Precision::Approximate, 0.50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_google_location_types() {
        assert_eq!(google_location_type("ROOFTOP"), (Precision::Rooftop, 0.95));
        assert_eq!(
            google_location_type("RANGE_INTERPOLATED"),
            (Precision::Interpolated, 0.85)
        );
        assert_eq!(google_location_type("APPROXIMATE").1, 0.50);
        assert_eq!(google_location_type("SOMETHING_NEW").1, 0.50);
    }

    #[test]
    fn test_partial_match_penalty_has_floor() {
        assert!((google_partial_match(0.95) - 0.85).abs() < 1e-9);
        assert_eq!(google_partial_match(0.45), 0.40);
    }

    #[test]
    fn test_same_place() {
        assert!(same_place(&[]));
        assert!(same_place(&[(39.9526, -75.1652)]));
        assert!(same_place(&[(39.9526, -75.1652), (39.9530, -75.1650)]));
        assert!(!same_place(&[(39.9526, -75.1652), (40.4406, -79.9959)]));
    }

    #[test]
    fn test_nominatim_levels() {
        assert_eq!(nominatim_place("building", "yes", "building").0, Precision::Rooftop);
        assert_eq!(nominatim_place("place", "house", "place").1, 0.90);
        assert_eq!(nominatim_place("highway", "residential", "road").1, 0.70);
        assert_eq!(nominatim_place("boundary", "administrative", "city").1, 0.50);
        assert_eq!(nominatim_place("place", "postcode", "postcode").1, 0.50);
    }
}
