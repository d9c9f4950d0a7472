//! In-memory geocode cache with TTL using moka

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;

use super::{cache_key, CacheStore, DEFAULT_CACHE_TTL, MAX_CACHE_TTL};
use crate::errors::CacheError;
use crate::models::GeocodeResult;

/// Default maximum number of cached addresses.
pub const DEFAULT_CACHE_CAPACITY: u64 = 100_000;

#[derive(Clone)]
struct CachedEntry {
    result: GeocodeResult,
    expires_at: Instant,
}

/// In-process cache store.
///
/// Each entry carries its own `expires_at`; the moka-level TTL is only an
/// upper bound so that memory is reclaimed.
pub struct MemoryCacheStore {
    cache: Cache<String, CachedEntry>,
    max_ttl: Duration,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(max_capacity: u64) -> Self {
        Self::with_settings(max_capacity, DEFAULT_CACHE_TTL)
    }

    /// `max_ttl` bounds how long any entry can live, whatever `put` asks for.
    /// It is itself capped at [`MAX_CACHE_TTL`].
    pub fn with_settings(max_capacity: u64, max_ttl: Duration) -> Self {
        let max_ttl = max_ttl.min(MAX_CACHE_TTL);
        Self {
            cache: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(max_ttl)
                .build(),
            max_ttl,
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, address: &str) -> Result<Option<GeocodeResult>, CacheError> {
        let key = cache_key(address);
        match self.cache.get(&key).await {
            Some(entry) if Instant::now() < entry.expires_at => Ok(Some(entry.result)),
            Some(_) => {
                self.cache.invalidate(&key).await;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        address: &str,
        result: &GeocodeResult,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl.min(self.max_ttl))
            .ok_or_else(|| CacheError::Unavailable(format!("TTL {:?} out of range", ttl)))?;
        let entry = CachedEntry {
            result: result.clone(),
            expires_at,
        };
        self.cache.insert(cache_key(address), entry).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Precision, Provider};

    fn located() -> GeocodeResult {
        GeocodeResult::located(Provider::Census, 39.95, -75.16, 0.85, Precision::Interpolated)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryCacheStore::new();
        store
            .put("1 Main St", &located(), Duration::from_secs(60))
            .await
            .unwrap();

        let hit = store.get("1 Main St").await.unwrap().unwrap();
        assert_eq!(hit.coordinates(), Some((39.95, -75.16)));
        assert!(store.get("1 MAIN ST").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let store = MemoryCacheStore::new();
        store
            .put("1 Main St", &located(), Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get("1 Main St").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_ttl_is_capped() {
        let store = MemoryCacheStore::with_settings(10, Duration::from_secs(u64::MAX));
        store
            .put("1 Main St", &located(), Duration::from_secs(u64::MAX))
            .await
            .unwrap();

        assert!(store.get("1 Main St").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let store = MemoryCacheStore::new();
        let ttl = Duration::from_secs(60);
        store.put("addr", &located(), ttl).await.unwrap();

        let newer = GeocodeResult::located(Provider::Google, 1.0, 2.0, 0.95, Precision::Rooftop);
        store.put("addr", &newer, ttl).await.unwrap();

        let hit = store.get("addr").await.unwrap().unwrap();
        assert_eq!(hit.provider, Provider::Google);
    }
}
