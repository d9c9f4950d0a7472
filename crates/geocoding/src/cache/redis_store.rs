//! Redis-backed geocode cache.
//!
//! Values are JSON `GeocodeResult`s stored with `SET key value EX ttl`.
//! Every round-trip is bounded by a short timeout so that a slow or
//! unreachable server costs at most that much per lookup.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use redis::AsyncCommands;
use tokio::time::timeout;

use super::{cache_key, CacheStore, MAX_CACHE_TTL};
use crate::errors::CacheError;
use crate::models::GeocodeResult;

pub const DEFAULT_KEY_PREFIX: &str = "geocode";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(250);

/// Cache store talking to a Redis server.
#[derive(Clone)]
pub struct RedisCacheStore {
    client: redis::Client,
    prefix: String,
    timeout: Duration,
}

impl RedisCacheStore {
    /// Parse the URL. No connection is made until the first lookup.
    pub fn new(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn key(&self, address: &str) -> String {
        format!("{}:{}", self.prefix, cache_key(address))
    }

    async fn read(&self, key: String) -> Result<Option<String>, CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(key).await?;
        Ok(payload)
    }

    async fn write(&self, key: String, payload: String, ttl_secs: u64) -> Result<(), CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(key, payload, ttl_secs).await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, address: &str) -> Result<Option<GeocodeResult>, CacheError> {
        let key = self.key(address);
        let payload = timeout(self.timeout, self.read(key))
            .await
            .map_err(|_| CacheError::Timeout)??;

        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        address: &str,
        result: &GeocodeResult,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = self.key(address);
        let payload = serde_json::to_string(result)?;
        // EX 0 is rejected by the server
        let ttl_secs = ttl.min(MAX_CACHE_TTL).as_secs().max(1);

        timeout(self.timeout, self.write(key, payload, ttl_secs))
            .await
            .map_err(|_| CacheError::Timeout)??;
        debug!("Cached geocode for {} ({}s)", cache_key(address), ttl_secs);
        Ok(())
    }
}
