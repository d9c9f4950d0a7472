//! OpenStreetMap Nominatim geocoder.
//!
//! Free, keyless search. The public instance allows roughly one request per
//! second and rejects clients that do not send an identifying User-Agent.
//!
//! API documentation: https://nominatim.org/release-docs/latest/api/Search/

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::models::{AddressComponents, FailureKind, GeocodeResult, Provider};
use crate::provider::confidence::nominatim_place;
use crate::provider::http::{get_json, timed, CallFailure};
use crate::provider::GeocodingProvider;
use crate::registry::RateLimitConfig;

pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_USER_AGENT: &str = concat!("landscout-geocoding/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// API Response Structures
// ============================================================================

/// One entry of the `jsonv2` search response. Coordinates arrive as strings.
#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
    display_name: Option<String>,
    #[serde(default)]
    category: String,
    #[serde(rename = "type", default)]
    place_type: String,
    #[serde(default)]
    addresstype: String,
    #[serde(default)]
    address: Option<PlaceAddress>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PlaceAddress {
    house_number: Option<String>,
    road: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    state: Option<String>,
    postcode: Option<String>,
    country_code: Option<String>,
}

impl From<PlaceAddress> for AddressComponents {
    fn from(address: PlaceAddress) -> Self {
        Self {
            street_number: address.house_number,
            street_name: address.road,
            city: address
                .city
                .or(address.town)
                .or(address.village)
                .or(address.hamlet),
            state: address.state,
            postal_code: address.postcode,
            country: address.country_code.map(|c| c.to_uppercase()),
        }
    }
}

fn parse_coordinate(value: &str, name: &str) -> Result<f64, CallFailure> {
    value.trim().parse::<f64>().map_err(|_| {
        CallFailure::new(
            FailureKind::Malformed,
            format!("unparseable {} '{}'", name, value),
        )
    })
}

fn to_result(places: Vec<Place>) -> Result<GeocodeResult, CallFailure> {
    let best = places
        .into_iter()
        .next()
        .ok_or_else(|| CallFailure::empty("no results"))?;

    let latitude = parse_coordinate(&best.lat, "latitude")?;
    let longitude = parse_coordinate(&best.lon, "longitude")?;
    let (precision, confidence) =
        nominatim_place(&best.category, &best.place_type, &best.addresstype);

    Ok(
        GeocodeResult::located(Provider::Nominatim, latitude, longitude, confidence, precision)
            .with_formatted_address(best.display_name)
            .with_components(best.address.map(Into::into).unwrap_or_default()),
    )
}

// ============================================================================
// NominatimProvider
// ============================================================================

/// OpenStreetMap Nominatim provider.
pub struct NominatimProvider {
    client: Client,
    base_url: String,
    user_agent: String,
}

impl NominatimProvider {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, user_agent)
    }

    pub fn with_base_url(base_url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
        }
    }

    async fn fetch(&self, address: &str, timeout: Duration) -> Result<GeocodeResult, CallFailure> {
        let url = format!("{}/search", self.base_url);
        debug!("Nominatim request: /search");

        let request = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[
                ("q", address),
                ("format", "jsonv2"),
                ("addressdetails", "1"),
                ("limit", "1"),
            ])
            .timeout(timeout);

        let places: Vec<Place> = get_json(Provider::Nominatim, request).await?;
        to_result(places)
    }
}

#[async_trait]
impl GeocodingProvider for NominatimProvider {
    fn id(&self) -> Provider {
        Provider::Nominatim
    }

    /// Usage policy of the public instance: at most one request per second.
    fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            refill_per_second: 1.0,
            burst_capacity: 3.0,
        }
    }

    async fn geocode(&self, address: &str, timeout: Duration) -> GeocodeResult {
        timed(Provider::Nominatim, self.fetch(address, timeout)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeocodeStatus, Precision};

    fn parse(json: &str) -> Result<GeocodeResult, CallFailure> {
        let places: Vec<Place> = serde_json::from_str(json).unwrap();
        to_result(places)
    }

    #[test]
    fn test_house_level_result() {
        let result = parse(
            r#"[{
                "place_id": 1, "lat": "39.9526", "lon": "-75.1652",
                "category": "place", "type": "house", "addresstype": "place",
                "display_name": "1400, John F Kennedy Boulevard, Philadelphia, PA 19107, United States",
                "address": {
                    "house_number": "1400", "road": "John F Kennedy Boulevard",
                    "city": "Philadelphia", "state": "Pennsylvania",
                    "postcode": "19107", "country_code": "us"
                }
            }]"#,
        )
        .unwrap();

        assert_eq!(result.status, GeocodeStatus::Success);
        assert_eq!(result.precision, Some(Precision::Rooftop));
        assert_eq!(result.confidence_score, 0.90);
        assert_eq!(result.coordinates(), Some((39.9526, -75.1652)));
        assert_eq!(result.components.street_number.as_deref(), Some("1400"));
        assert_eq!(result.components.country.as_deref(), Some("US"));
    }

    #[test]
    fn test_city_level_result_is_partial() {
        let result = parse(
            r#"[{
                "lat": "40.0", "lon": "-75.0",
                "category": "boundary", "type": "administrative", "addresstype": "city",
                "display_name": "Springfield",
                "address": {"town": "Springfield"}
            }]"#,
        )
        .unwrap();

        assert_eq!(result.status, GeocodeStatus::Partial);
        assert_eq!(result.confidence_score, 0.50);
        assert_eq!(result.components.city.as_deref(), Some("Springfield"));
    }

    #[test]
    fn test_empty_array_is_empty_result() {
        let failure = parse("[]").unwrap_err();
        assert_eq!(failure.kind, FailureKind::EmptyResult);
    }

    #[test]
    fn test_bad_coordinate_is_malformed() {
        let failure = parse(r#"[{"lat": "north", "lon": "-75.0"}]"#).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Malformed);
    }
}
