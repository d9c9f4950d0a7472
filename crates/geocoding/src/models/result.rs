use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{FailureKind, GeocodeStatus, Precision, Provider};

/// Confidence below which a located result is reported as `Partial`.
pub const PARTIAL_CONFIDENCE_CEILING: f64 = 0.60;

/// Structured address parts returned by a provider.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressComponents {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Result of geocoding one address.
///
/// Failures are data, not errors: every outcome, including circuit-open and
/// quota exhaustion, is carried in `status`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub formatted_address: Option<String>,
    #[serde(flatten)]
    pub components: AddressComponents,
    /// 0.0 to 1.0.
    pub confidence_score: f64,
    pub provider: Provider,
    pub status: GeocodeStatus,
    pub precision: Option<Precision>,
    pub response_time_ms: f64,
    pub cached: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GeocodeResult {
    /// A located result. Status is derived from the confidence score.
    pub fn located(
        provider: Provider,
        latitude: f64,
        longitude: f64,
        confidence_score: f64,
        precision: Precision,
    ) -> Self {
        let confidence_score = confidence_score.clamp(0.0, 1.0);
        let status = if confidence_score >= PARTIAL_CONFIDENCE_CEILING {
            GeocodeStatus::Success
        } else {
            GeocodeStatus::Partial
        };

        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            formatted_address: None,
            components: AddressComponents::default(),
            confidence_score,
            provider,
            status,
            precision: Some(precision),
            response_time_ms: 0.0,
            cached: false,
            timestamp: Utc::now(),
            failure: None,
            error: None,
        }
    }

    /// A provider-level failure with no coordinates.
    pub fn failed(provider: Provider, failure: FailureKind, message: impl Into<String>) -> Self {
        Self {
            failure: Some(failure),
            error: Some(message.into()),
            ..Self::empty(provider, GeocodeStatus::Failed)
        }
    }

    /// A result for a provider that was never called.
    pub fn skipped(provider: Provider, status: GeocodeStatus) -> Self {
        Self::empty(provider, status)
    }

    fn empty(provider: Provider, status: GeocodeStatus) -> Self {
        Self {
            latitude: None,
            longitude: None,
            formatted_address: None,
            components: AddressComponents::default(),
            confidence_score: 0.0,
            provider,
            status,
            precision: None,
            response_time_ms: 0.0,
            cached: false,
            timestamp: Utc::now(),
            failure: None,
            error: None,
        }
    }

    pub fn with_formatted_address(mut self, formatted: Option<String>) -> Self {
        self.formatted_address = formatted.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_components(mut self, components: AddressComponents) -> Self {
        self.components = components;
        self
    }

    /// Downgrade a located result to `Partial`.
    pub fn into_partial(mut self) -> Self {
        if self.status == GeocodeStatus::Success {
            self.status = GeocodeStatus::Partial;
        }
        self
    }

    pub fn with_response_time(mut self, millis: f64) -> Self {
        self.response_time_ms = millis;
        self
    }

    /// Re-label a stored result as served from the cache.
    pub fn into_cached(mut self) -> Self {
        self.provider = Provider::Cache;
        self.cached = true;
        self
    }

    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_usable() && self.has_coordinates()
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_located_status_follows_confidence() {
        let rooftop = GeocodeResult::located(Provider::Google, 40.0, -75.0, 0.95, Precision::Rooftop);
        assert_eq!(rooftop.status, GeocodeStatus::Success);
        assert_eq!(rooftop.coordinates(), Some((40.0, -75.0)));

        let area = GeocodeResult::located(Provider::Nominatim, 40.0, -75.0, 0.5, Precision::Approximate);
        assert_eq!(area.status, GeocodeStatus::Partial);
        assert!(area.is_success());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let result = GeocodeResult::located(Provider::Census, 1.0, 1.0, 1.7, Precision::Interpolated);
        assert_eq!(result.confidence_score, 1.0);
    }

    #[test]
    fn test_failed_has_no_coordinates() {
        let result = GeocodeResult::failed(Provider::Census, FailureKind::Timeout, "timed out");
        assert_eq!(result.status, GeocodeStatus::Failed);
        assert!(!result.has_coordinates());
        assert_eq!(result.confidence_score, 0.0);
        assert!(!result.is_success());
    }

    #[test]
    fn test_into_cached_keeps_coordinates() {
        let result = GeocodeResult::located(Provider::Google, 39.9, -75.1, 0.95, Precision::Rooftop);
        let cached = result.clone().into_cached();
        assert_eq!(cached.provider, Provider::Cache);
        assert!(cached.cached);
        assert_eq!(cached.coordinates(), result.coordinates());
    }

    #[test]
    fn test_json_shape() {
        let result = GeocodeResult::located(Provider::Google, 39.9, -75.1, 0.95, Precision::Rooftop)
            .with_components(AddressComponents {
                city: Some("Philadelphia".to_string()),
                ..Default::default()
            });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["city"], "Philadelphia");
        assert_eq!(json["provider"], "GOOGLE");
        assert_eq!(json["status"], "SUCCESS");
        assert!(json.get("failure").is_none());

        let back: GeocodeResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
