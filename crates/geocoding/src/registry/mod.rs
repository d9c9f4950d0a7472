//! Geocoding orchestration.
//!
//! This module provides the hierarchical geocoder and the shared state that
//! protects the providers it calls:
//! - Provider fallback in priority order
//! - Rate limiting, circuit breaking and daily quotas per provider
//! - Result validation
//! - Batch fan-out under a concurrency cap
//! - Process-wide statistics

mod batch;
mod circuit_breaker;
mod diagnostics;
mod geocoder;
mod quota;
mod rate_limiter;
mod stats;
mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{BatchOptions, DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONCURRENT};
pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitState, MAX_COOLDOWN,
};
pub use diagnostics::{GeocodeDiagnostics, ProviderAttempt, SkipReason};
pub use geocoder::{
    GeocoderSettings, HierarchicalGeocoder, DEFAULT_BACKOFF_BASE, DEFAULT_REQUEST_TIMEOUT,
};
pub use quota::{QuotaTracker, QuotaUsage};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use stats::{CircuitSnapshot, GeocoderStats, StatsSnapshot};
pub use validator::{ResultValidator, ValidatorConfig};
