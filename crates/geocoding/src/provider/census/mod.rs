//! US Census Bureau geocoder.
//!
//! Free, keyless one-line address lookup against the TIGER/Line address
//! ranges. Coordinates are interpolated along the matched street segment.
//!
//! API documentation: https://geocoding.geo.census.gov/geocoder/Geocoding_Services_API.html

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::models::{AddressComponents, GeocodeResult, Provider};
use crate::provider::confidence::{same_place, CENSUS_MATCH};
use crate::provider::http::{get_json, timed, CallFailure};
use crate::provider::GeocodingProvider;
use crate::registry::RateLimitConfig;

pub const DEFAULT_BASE_URL: &str = "https://geocoding.geo.census.gov";
const ENDPOINT: &str = "/geocoder/locations/onelineaddress";
const BENCHMARK: &str = "Public_AR_Current";

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct CensusResponse {
    result: CensusResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CensusResult {
    #[serde(default)]
    address_matches: Vec<AddressMatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressMatch {
    matched_address: Option<String>,
    coordinates: Coordinates,
    #[serde(default)]
    address_components: CensusComponents,
}

/// x is longitude, y is latitude.
#[derive(Debug, Deserialize)]
struct Coordinates {
    x: f64,
    y: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CensusComponents {
    pre_direction: Option<String>,
    street_name: Option<String>,
    suffix_type: Option<String>,
    suffix_direction: Option<String>,
    city: Option<String>,
    state: Option<String>,
    zip: Option<String>,
}

impl CensusComponents {
    fn street(&self) -> Option<String> {
        let parts: Vec<&str> = [
            &self.pre_direction,
            &self.street_name,
            &self.suffix_type,
            &self.suffix_direction,
        ]
        .into_iter()
        .filter_map(|p| p.as_deref())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// The Census response has no house number field; take it from the matched address.
fn leading_house_number(matched: &str) -> Option<String> {
    matched
        .split_whitespace()
        .next()
        .filter(|token| token.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

fn to_result(response: CensusResponse) -> Result<GeocodeResult, CallFailure> {
    let matches = response.result.address_matches;
    let points: Vec<(f64, f64)> = matches
        .iter()
        .map(|m| (m.coordinates.y, m.coordinates.x))
        .collect();
    if !same_place(&points) {
        return Err(CallFailure::empty(format!(
            "ambiguous: {} address matches",
            matches.len()
        )));
    }

    let best = matches
        .into_iter()
        .next()
        .ok_or_else(|| CallFailure::empty("no address match"))?;

    let (precision, confidence) = CENSUS_MATCH;
    let components = AddressComponents {
        street_number: best.matched_address.as_deref().and_then(leading_house_number),
        street_name: best.address_components.street(),
        city: non_empty(best.address_components.city),
        state: non_empty(best.address_components.state),
        postal_code: non_empty(best.address_components.zip),
        country: Some("US".to_string()),
    };

    Ok(GeocodeResult::located(
        Provider::Census,
        best.coordinates.y,
        best.coordinates.x,
        confidence,
        precision,
    )
    .with_formatted_address(best.matched_address)
    .with_components(components))
}

// ============================================================================
// CensusProvider
// ============================================================================

/// US Census Bureau geocoding provider.
pub struct CensusProvider {
    client: Client,
    base_url: String,
}

impl CensusProvider {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn fetch(&self, address: &str, timeout: Duration) -> Result<GeocodeResult, CallFailure> {
        let url = format!("{}{}", self.base_url, ENDPOINT);
        debug!("Census request: {}", ENDPOINT);

        let request = self
            .client
            .get(&url)
            .query(&[
                ("address", address),
                ("benchmark", BENCHMARK),
                ("format", "json"),
            ])
            .timeout(timeout);

        let response: CensusResponse = get_json(Provider::Census, request).await?;
        to_result(response)
    }
}

impl Default for CensusProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GeocodingProvider for CensusProvider {
    fn id(&self) -> Provider {
        Provider::Census
    }

    fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            refill_per_second: 10.0,
            burst_capacity: 5.0,
        }
    }

    async fn geocode(&self, address: &str, timeout: Duration) -> GeocodeResult {
        timed(Provider::Census, self.fetch(address, timeout)).await
    }
}
