//! Landscout Geocoding Crate
//!
//! This crate turns free-form postal addresses into coordinates for the
//! Landscout property pipeline, falling back across several geocoding
//! services.
//!
//! # Overview
//!
//! The geocoding crate supports:
//! - Multiple providers: US Census, Nominatim (OpenStreetMap), Google
//! - Ordered fallback from the cheapest provider to the most expensive
//! - Rate limiting, circuit breaking and daily quotas per provider
//! - Result caching in memory or Redis
//! - Concurrent batch geocoding with order-preserving output
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |    Caller        | --> |  GeocodeRequest  |  (address + options)
//! +------------------+     +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |   CacheStore     |  (memory / Redis)
//!                          +------------------+
//!                                  | miss
//!                                  v
//!                      +-----------------------+
//!                      | HierarchicalGeocoder  |  (breaker, quota, rate limit)
//!                      +-----------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |    Provider      |  (Census, Nominatim, Google)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |  GeocodeResult   |  (coordinates or failure)
//!                          +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`HierarchicalGeocoder`] - Provider fallback, caching and statistics
//! - [`GeocodeRequest`] - Per-call options (cache use, retries)
//! - [`GeocodeResult`] - Common result shape for every provider
//! - [`GeocoderConfig`] - Environment-driven setup
//! - [`BatchOptions`] - Chunking, concurrency and deadline for batches
//! - [`StatsSnapshot`] - Point-in-time counters, breaker and quota state

pub mod cache;
pub mod config;
pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;

// Re-export all public types from models
pub use models::{
    AddressComponents, FailureKind, GeocodeRequest, GeocodeResult, GeocodeStatus, Precision,
    Provider,
};

// Re-export error and config types
pub use config::GeocoderConfig;
pub use errors::{CacheError, GeocodeError};

// Re-export cache types
pub use cache::{CacheStore, MemoryCacheStore, RedisCacheStore};

// Re-export provider types
pub use provider::{CensusProvider, GeocodingProvider, GoogleProvider, NominatimProvider};

// Re-export registry types
pub use registry::{
    BatchOptions, CircuitBreaker, CircuitState, GeocodeDiagnostics, HierarchicalGeocoder,
    QuotaTracker, RateLimiter, ResultValidator, SkipReason, StatsSnapshot, ValidatorConfig,
};
