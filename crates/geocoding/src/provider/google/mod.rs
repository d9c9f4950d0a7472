//! Google Maps Geocoding API provider.
//!
//! Commercial, keyed, and billed per request, so it sits last in the default
//! order and carries a daily quota. Errors are reported both through HTTP
//! status and through the `status` field of a 200 response.
//!
//! API documentation: https://developers.google.com/maps/documentation/geocoding/requests-geocoding

mod models;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::models::{FailureKind, GeocodeResult, Provider};
use crate::provider::confidence::{google_location_type, google_partial_match, same_place};
use crate::provider::http::{get_json, timed, CallFailure};
use crate::provider::GeocodingProvider;
use crate::registry::RateLimitConfig;

use models::{GeocodeResponse, GoogleResult};

pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com";
const ENDPOINT: &str = "/maps/api/geocode/json";

/// Default daily request cap.
pub const DEFAULT_DAILY_QUOTA: u32 = 2500;

fn status_failure(response: &GeocodeResponse) -> CallFailure {
    let detail = response
        .error_message
        .clone()
        .unwrap_or_else(|| response.status.clone());

    let kind = match response.status.as_str() {
        "ZERO_RESULTS" => FailureKind::EmptyResult,
        "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" => FailureKind::Throttled,
        "REQUEST_DENIED" => FailureKind::HttpStatus(403),
        "INVALID_REQUEST" => FailureKind::HttpStatus(400),
        _ => FailureKind::HttpStatus(500),
    };

    if kind != FailureKind::EmptyResult {
        warn!("Google geocode refused: {} ({})", response.status, detail);
    }
    CallFailure::new(kind, format!("{}: {}", response.status, detail))
}

/// Several results are ambiguous unless they are one place, or the first is
/// a full match that outranks every other.
fn is_ambiguous(results: &[GoogleResult]) -> bool {
    let Some((top, rest)) = results.split_first() else {
        return false;
    };
    if rest.is_empty() {
        return false;
    }
    if top.partial_match {
        return true;
    }

    let points: Vec<(f64, f64)> = results
        .iter()
        .map(|r| (r.geometry.location.lat, r.geometry.location.lng))
        .collect();
    let top_confidence = google_location_type(&top.geometry.location_type).1;
    let outranks_rest = rest.iter().all(|r| {
        r.partial_match || google_location_type(&r.geometry.location_type).1 < top_confidence
    });

    !(same_place(&points) || outranks_rest)
}

fn to_result(response: GeocodeResponse) -> Result<GeocodeResult, CallFailure> {
    if response.status != "OK" {
        return Err(status_failure(&response));
    }

    if is_ambiguous(&response.results) {
        return Err(CallFailure::empty(format!(
            "ambiguous: {} results",
            response.results.len()
        )));
    }

    let best = response
        .results
        .into_iter()
        .next()
        .ok_or_else(|| CallFailure::empty("OK status with no results"))?;

    let (precision, mut confidence) = google_location_type(&best.geometry.location_type);
    if best.partial_match {
        confidence = google_partial_match(confidence);
    }

    let components = best.components();
    let result = GeocodeResult::located(
        Provider::Google,
        best.geometry.location.lat,
        best.geometry.location.lng,
        confidence,
        precision,
    )
    .with_formatted_address(best.formatted_address)
    .with_components(components);

    Ok(if best.partial_match {
        result.into_partial()
    } else {
        result
    })
}

// ============================================================================
// GoogleProvider
// ============================================================================

/// Google Geocoding API provider.
pub struct GoogleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    daily_quota: u32,
}

impl GoogleProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            daily_quota: DEFAULT_DAILY_QUOTA,
        }
    }

    pub fn with_daily_quota(mut self, daily_quota: u32) -> Self {
        self.daily_quota = daily_quota;
        self
    }

    async fn fetch(&self, address: &str, timeout: Duration) -> Result<GeocodeResult, CallFailure> {
        let url = format!("{}{}", self.base_url, ENDPOINT);
        debug!("Google request: {}", ENDPOINT);

        let request = self
            .client
            .get(&url)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .timeout(timeout);

        let response: GeocodeResponse = get_json(Provider::Google, request).await?;
        to_result(response)
    }
}

#[async_trait]
impl GeocodingProvider for GoogleProvider {
    fn id(&self) -> Provider {
        Provider::Google
    }

    fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            refill_per_second: 50.0,
            burst_capacity: 10.0,
        }
    }

    fn daily_quota(&self) -> Option<u32> {
        Some(self.daily_quota)
    }

    async fn geocode(&self, address: &str, timeout: Duration) -> GeocodeResult {
        timed(Provider::Google, self.fetch(address, timeout)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeocodeStatus, Precision};

    fn parse(json: &str) -> Result<GeocodeResult, CallFailure> {
        to_result(serde_json::from_str(json).unwrap())
    }

    const ROOFTOP: &str = r#"{
        "status": "OK",
        "results": [{
            "formatted_address": "1600 Amphitheatre Pkwy, Mountain View, CA 94043, USA",
            "address_components": [
                {"long_name": "1600", "short_name": "1600", "types": ["street_number"]},
                {"long_name": "Amphitheatre Parkway", "short_name": "Amphitheatre Pkwy", "types": ["route"]},
                {"long_name": "Mountain View", "short_name": "Mountain View", "types": ["locality", "political"]},
                {"long_name": "California", "short_name": "CA", "types": ["administrative_area_level_1", "political"]},
                {"long_name": "United States", "short_name": "US", "types": ["country", "political"]},
                {"long_name": "94043", "short_name": "94043", "types": ["postal_code"]}
            ],
            "geometry": {
                "location": {"lat": 37.4224764, "lng": -122.0842499},
                "location_type": "ROOFTOP"
            },
            "place_id": "ChIJ2eUgeAK6j4ARbn5u_wAGqWA",
            "types": ["street_address"]
        }]
    }"#;

    #[test]
    fn test_rooftop_result() {
        let result = parse(ROOFTOP).unwrap();

        assert_eq!(result.status, GeocodeStatus::Success);
        assert_eq!(result.precision, Some(Precision::Rooftop));
        assert_eq!(result.confidence_score, 0.95);
        assert_eq!(result.components.street_name.as_deref(), Some("Amphitheatre Parkway"));
        assert_eq!(result.components.state.as_deref(), Some("CA"));
        assert_eq!(result.components.country.as_deref(), Some("US"));
        assert_eq!(result.components.postal_code.as_deref(), Some("94043"));
    }

    #[test]
    fn test_partial_match_downgrades() {
        let result = parse(
            r#"{
                "status": "OK",
                "results": [{
                    "formatted_address": "Main St, Springfield, IL, USA",
                    "geometry": {
                        "location": {"lat": 39.8, "lng": -89.6},
                        "location_type": "RANGE_INTERPOLATED"
                    },
                    "partial_match": true
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(result.status, GeocodeStatus::Partial);
        assert!((result.confidence_score - 0.75).abs() < 1e-9);
    }

    fn result_json(lat: f64, lng: f64, location_type: &str, partial: bool) -> String {
        format!(
            r#"{{"formatted_address": "Main St", "geometry": {{"location": {{"lat": {}, "lng": {}}}, "location_type": "{}"}}, "partial_match": {}}}"#,
            lat, lng, location_type, partial
        )
    }

    fn parse_results(results: &[String]) -> Result<GeocodeResult, CallFailure> {
        parse(&format!(r#"{{"status": "OK", "results": [{}]}}"#, results.join(",")))
    }

    #[test]
    fn test_equally_ranked_distinct_results_are_ambiguous() {
        let failure = parse_results(&[
            result_json(39.80, -89.65, "ROOFTOP", false),
            result_json(42.10, -72.59, "ROOFTOP", false),
        ])
        .unwrap_err();
        assert_eq!(failure.kind, FailureKind::EmptyResult);
        assert!(failure.message.contains("ambiguous"));
    }

    #[test]
    fn test_partial_top_of_several_is_ambiguous() {
        let failure = parse_results(&[
            result_json(39.80, -89.65, "ROOFTOP", true),
            result_json(42.10, -72.59, "APPROXIMATE", false),
        ])
        .unwrap_err();
        assert_eq!(failure.kind, FailureKind::EmptyResult);
    }

    #[test]
    fn test_top_result_outranking_the_rest_stands() {
        let result = parse_results(&[
            result_json(39.80, -89.65, "ROOFTOP", false),
            result_json(42.10, -72.59, "GEOMETRIC_CENTER", false),
            result_json(41.00, -80.00, "ROOFTOP", true),
        ])
        .unwrap();
        assert_eq!(result.latitude, Some(39.80));
        assert_eq!(result.status, GeocodeStatus::Success);
    }

    #[test]
    fn test_zero_results_is_empty() {
        let failure = parse(r#"{"status": "ZERO_RESULTS", "results": []}"#).unwrap_err();
        assert_eq!(failure.kind, FailureKind::EmptyResult);
    }

    #[test]
    fn test_over_query_limit_is_throttled() {
        let failure = parse(
            r#"{"status": "OVER_QUERY_LIMIT", "results": [], "error_message": "You have exceeded your daily request quota"}"#,
        )
        .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Throttled);
        assert!(failure.message.contains("daily request quota"));
    }

    #[test]
    fn test_request_denied_fails_over() {
        let failure = parse(r#"{"status": "REQUEST_DENIED", "results": []}"#).unwrap_err();
        assert_eq!(failure.kind, FailureKind::HttpStatus(403));
    }
}
