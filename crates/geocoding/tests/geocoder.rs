//! End-to-end fallback through a configured geocoder.

use std::collections::HashMap;

use landscout_geocoding::{
    BatchOptions, FailureKind, GeocodeStatus, GeocoderConfig, HierarchicalGeocoder, Provider,
};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ADDRESS: &str = "1600 Amphitheatre Pkwy, Mountain View, CA";

struct Upstreams {
    census: MockServer,
    nominatim: MockServer,
    google: MockServer,
}

impl Upstreams {
    async fn start() -> Self {
        Self {
            census: MockServer::start().await,
            nominatim: MockServer::start().await,
            google: MockServer::start().await,
        }
    }

    fn geocoder(&self, extra: &[(&str, &str)]) -> HierarchicalGeocoder {
        let mut vars: HashMap<String, String> = [
            ("GEOCODER_PROVIDERS", "census,nominatim,google".to_string()),
            ("GEOCODER_CENSUS_URL", self.census.uri()),
            ("GEOCODER_NOMINATIM_URL", self.nominatim.uri()),
            ("GEOCODER_GOOGLE_URL", self.google.uri()),
            ("GEOCODER_GOOGLE_API_KEY", "test-key".to_string()),
            ("GEOCODER_BACKOFF_BASE_MS", "1".to_string()),
            ("GEOCODER_REQUEST_TIMEOUT_MS", "1000".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        for (key, value) in extra {
            vars.insert(format!("GEOCODER_{}", key), value.to_string());
        }

        GeocoderConfig::from_lookup(|key| vars.get(key).cloned())
            .build()
            .unwrap()
    }
}

fn google_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": "OK",
        "results": [{
            "formatted_address": "1600 Amphitheatre Pkwy, Mountain View, CA 94043, USA",
            "address_components": [],
            "geometry": {
                "location": {"lat": 37.4224764, "lng": -122.0842499},
                "location_type": "ROOFTOP"
            }
        }]
    }))
}

#[tokio::test]
async fn falls_back_to_google_and_caches() {
    let upstreams = Upstreams::start().await;

    // Census is down: both attempts fail.
    Mock::given(method("GET"))
        .and(path("/geocoder/locations/onelineaddress"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&upstreams.census)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&upstreams.nominatim)
        .await;
    Mock::given(method("GET"))
        .and(path("/maps/api/geocode/json"))
        .and(query_param("key", "test-key"))
        .respond_with(google_ok())
        .expect(1)
        .mount(&upstreams.google)
        .await;

    let geocoder = upstreams.geocoder(&[]);

    let first = geocoder.geocode_address(ADDRESS).await;
    assert_eq!(first.status, GeocodeStatus::Success);
    assert_eq!(first.provider, Provider::Google);
    assert!(!first.cached);

    let second = geocoder.geocode_address(ADDRESS).await;
    assert!(second.cached);
    assert_eq!(second.provider, Provider::Cache);
    assert_eq!(second.coordinates(), first.coordinates());

    let stats = geocoder.stats();
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.successes, 2);
    assert_eq!(stats.success_rate, 1.0);
    assert_eq!(stats.per_provider_success.get(&Provider::Google), Some(&1));
    assert!(stats.per_provider_failure.contains_key(&Provider::Census));
    assert_eq!(stats.quota_used[&Provider::Google].used_today, 1);
    assert_eq!(
        stats.circuit_breakers[&Provider::Census].consecutive_failures,
        2
    );
}

#[tokio::test]
async fn all_providers_failing_reports_the_trail() {
    let upstreams = Upstreams::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"result": {"addressMatches": []}})),
        )
        .mount(&upstreams.census)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&upstreams.nominatim)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&upstreams.google)
        .await;

    let geocoder = upstreams.geocoder(&[]);
    let result = geocoder.geocode_address("nowhere at all").await;

    assert_eq!(result.status, GeocodeStatus::Failed);
    assert!(!result.has_coordinates());
    assert_eq!(result.failure, Some(FailureKind::Throttled));

    let trail = result.error.unwrap();
    assert!(trail.starts_with("CENSUS: ERROR"));
    assert!(trail.contains("NOMINATIM: ERROR"));
    assert!(trail.contains("GOOGLE: ERROR"));

    let stats = geocoder.stats();
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.success_rate, 0.0);
}

#[tokio::test]
async fn exhausted_quota_skips_google() {
    let upstreams = Upstreams::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"result": {"addressMatches": []}})),
        )
        .mount(&upstreams.census)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&upstreams.nominatim)
        .await;
    Mock::given(method("GET"))
        .respond_with(google_ok())
        .expect(1)
        .mount(&upstreams.google)
        .await;

    let geocoder = upstreams.geocoder(&[("GOOGLE_DAILY_QUOTA", "1")]);

    assert!(geocoder.geocode_address("first").await.is_success());

    let second = geocoder.geocode_address("second").await;
    assert!(!second.is_success());
    assert!(second
        .error
        .unwrap()
        .contains("GOOGLE: SKIPPED (QuotaExceeded)"));
}

#[tokio::test]
async fn batch_through_configured_geocoder() {
    let upstreams = Upstreams::start().await;
    Mock::given(method("GET"))
        .and(path("/geocoder/locations/onelineaddress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "addressMatches": [{
                    "matchedAddress": "10 MAIN ST, SPRINGFIELD, IL, 62701",
                    "coordinates": {"x": -89.65, "y": 39.80},
                    "addressComponents": {"streetName": "MAIN", "suffixType": "ST"}
                }]
            }
        })))
        .expect(3)
        .mount(&upstreams.census)
        .await;

    let geocoder = upstreams.geocoder(&[("PROVIDERS", "census")]);
    let options = BatchOptions::new(2, 2).without_cache();

    let results = geocoder
        .geocode_batch(&["10 Main St", "", "10 Main St", "10 Main St"], &options)
        .await;

    assert_eq!(results.len(), 4);
    assert!(results[0].is_success());
    assert_eq!(results[1].failure, Some(FailureKind::Malformed));
    assert!(results[2].is_success());
    assert!(results[3].is_success());
}
