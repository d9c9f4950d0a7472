//! Geocoding provider trait definitions.
//!
//! This module defines the core `GeocodingProvider` trait that all
//! geocoding adapters must implement.

use std::time::Duration;

use async_trait::async_trait;

use crate::models::{GeocodeResult, Provider};
use crate::registry::RateLimitConfig;

/// Trait for geocoding providers.
///
/// Implement this trait to add support for a new geocoding service.
/// The geocoder uses the provider's rate limit and quota to gate calls;
/// priority is the order in which providers are handed to the geocoder.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
///
/// use async_trait::async_trait;
/// use landscout_geocoding::provider::GeocodingProvider;
/// use landscout_geocoding::{GeocodeResult, Precision, Provider};
///
/// struct FixedProvider;
///
/// #[async_trait]
/// impl GeocodingProvider for FixedProvider {
///     fn id(&self) -> Provider {
///         Provider::Census
///     }
///
///     async fn geocode(&self, address: &str, timeout: Duration) -> GeocodeResult {
///         GeocodeResult::located(Provider::Census, 39.95, -75.16, 0.85, Precision::Interpolated)
///     }
/// }
/// ```
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    /// Which provider this adapter talks to.
    ///
    /// Used for logging, circuit breaker tracking, quota and statistics.
    fn id(&self) -> Provider;

    /// Token bucket settings applied to calls to this provider.
    fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig::default()
    }

    /// Daily request cap, if the provider is metered.
    fn daily_quota(&self) -> Option<u32> {
        None
    }

    /// Perform one geocoding call.
    ///
    /// # Arguments
    ///
    /// * `address` - The normalized address, sent as-is
    /// * `timeout` - Upper bound for the whole HTTP exchange
    ///
    /// # Returns
    ///
    /// A located result, or a `Failed` result carrying a [`FailureKind`].
    /// Implementations never retry and never panic on bad responses.
    ///
    /// [`FailureKind`]: crate::models::FailureKind
    async fn geocode(&self, address: &str, timeout: Duration) -> GeocodeResult;
}
