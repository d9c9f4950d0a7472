//! Geocode result caching.
//!
//! - `memory` - In-process moka cache (`MemoryCacheStore`)
//! - `redis_store` - Networked Redis cache (`RedisCacheStore`)
//!
//! Keys are the lowercase hex MD5 of the exact address bytes, so two
//! differently cased or punctuated addresses are different entries.
//! Backends report failures as [`CacheError`]; the geocoder treats any
//! error as a miss.

mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::CacheError;
use crate::models::GeocodeResult;

pub use self::memory::{MemoryCacheStore, DEFAULT_CACHE_CAPACITY};
pub use self::redis_store::RedisCacheStore;

/// Default time-to-live for cached results: 7 days.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Longest time-to-live a store will honor: 10 years.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Stable cache key for a normalized address.
pub fn cache_key(address: &str) -> String {
    format!("{:x}", md5::compute(address.as_bytes()))
}

/// Key/value store for geocode results.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a result. `Ok(None)` is a miss, including expired entries.
    async fn get(&self, address: &str) -> Result<Option<GeocodeResult>, CacheError>;

    /// Store a result, replacing any earlier entry for the address.
    async fn put(&self, address: &str, result: &GeocodeResult, ttl: Duration)
        -> Result<(), CacheError>;
}
