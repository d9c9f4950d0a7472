//! Token bucket rate limiter for geocoding providers.
//!
//! Implements per-provider rate limiting using the token bucket algorithm.
//! Each provider gets its own bucket with configurable capacity and refill rate.
//! The limiter never waits: callers decide whether to wait, fall back to
//! another provider, or give up.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::models::Provider;

/// Default refill rate: 1 request per second.
const DEFAULT_REFILL_PER_SECOND: f64 = 1.0;

/// Default bucket capacity (allows bursting).
const DEFAULT_BUCKET_CAPACITY: f64 = 3.0;

/// Token bucket for a single provider.
#[derive(Debug)]
struct TokenBucket {
    /// Current number of available tokens.
    tokens: f64,
    /// Last time the bucket was refilled.
    last_refill: Instant,
    /// Token refill rate (tokens per second).
    rate: f64,
    /// Maximum bucket capacity.
    capacity: f64,
}

impl TokenBucket {
    fn with_config(config: &RateLimitConfig, now: Instant) -> Self {
        Self {
            tokens: config.burst_capacity,
            last_refill: now,
            rate: config.refill_per_second,
            capacity: config.burst_capacity,
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self, now: Instant) {
        if now <= self.last_refill {
            return;
        }
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Try to take a token. State changes only by the refill on failure.
    fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Calculate the wait time until a token becomes available.
    fn time_until_available(&mut self, now: Instant) -> Duration {
        self.refill(now);

        if self.tokens >= 1.0 {
            Duration::ZERO
        } else if self.rate <= 0.0 {
            Duration::MAX
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Duration::from_secs_f64(tokens_needed / self.rate)
        }
    }
}

/// Rate limiter configuration for a provider.
#[derive(Clone, Debug, PartialEq)]
pub struct RateLimitConfig {
    /// Tokens added per second.
    pub refill_per_second: f64,
    /// Maximum burst capacity.
    pub burst_capacity: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            refill_per_second: DEFAULT_REFILL_PER_SECOND,
            burst_capacity: DEFAULT_BUCKET_CAPACITY,
        }
    }
}

/// Token bucket rate limiter for multiple providers.
///
/// Thread-safe rate limiter that maintains per-provider token buckets.
/// Buckets are created on-demand with default settings, or can be
/// pre-configured with custom limits. Every check runs inside one short
/// critical section, so concurrent callers never spend the same token.
pub struct RateLimiter {
    /// Per-provider token buckets.
    buckets: Mutex<HashMap<Provider, TokenBucket>>,
    /// Per-provider configuration overrides.
    configs: Mutex<HashMap<Provider, RateLimitConfig>>,
}

impl RateLimiter {
    /// Create a new rate limiter with default settings.
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            configs: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the buckets mutex, recovering from poison if necessary.
    ///
    /// The worst case after a poisoned lock is slightly incorrect rate
    /// limiting, which is better than panicking.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<Provider, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter buckets mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Lock the configs mutex, recovering from poison if necessary.
    fn lock_configs(&self) -> MutexGuard<'_, HashMap<Provider, RateLimitConfig>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure rate limits for a specific provider.
    pub fn configure(&self, provider: Provider, config: RateLimitConfig) {
        let mut configs = self.lock_configs();
        configs.insert(provider, config);
        drop(configs); // Release configs lock before acquiring buckets lock

        // Reset the bucket if it already exists
        let mut buckets = self.lock_buckets();
        buckets.remove(&provider);
    }

    /// Try to acquire a token without waiting.
    ///
    /// Returns true if a token was acquired, false if rate limited.
    pub fn try_acquire(&self, provider: Provider) -> bool {
        self.try_acquire_at(provider, Instant::now())
    }

    /// [`try_acquire`](Self::try_acquire) against an explicit clock reading.
    pub fn try_acquire_at(&self, provider: Provider, now: Instant) -> bool {
        let config = self.config_for(provider);
        let mut buckets = self.lock_buckets();

        let bucket = buckets
            .entry(provider)
            .or_insert_with(|| TokenBucket::with_config(&config, now));

        let acquired = bucket.try_acquire(now);
        if !acquired {
            debug!(
                "Rate limiter: no token for '{}' ({:.2} available)",
                provider, bucket.tokens
            );
        }
        acquired
    }

    /// How long until the next token for this provider.
    pub fn time_until_available(&self, provider: Provider) -> Duration {
        self.time_until_available_at(provider, Instant::now())
    }

    /// [`time_until_available`](Self::time_until_available) against an explicit clock reading.
    pub fn time_until_available_at(&self, provider: Provider, now: Instant) -> Duration {
        let mut buckets = self.lock_buckets();

        match buckets.get_mut(&provider) {
            Some(bucket) => bucket.time_until_available(now),
            None => Duration::ZERO,
        }
    }

    /// Get the remaining tokens for a provider.
    pub fn remaining_tokens(&self, provider: Provider) -> f64 {
        let mut buckets = self.lock_buckets();

        if let Some(bucket) = buckets.get_mut(&provider) {
            bucket.refill(Instant::now());
            bucket.tokens
        } else {
            self.config_for(provider).burst_capacity
        }
    }

    /// Reset the rate limiter for a provider.
    pub fn reset(&self, provider: Provider) {
        let mut buckets = self.lock_buckets();
        buckets.remove(&provider);
    }

    fn config_for(&self, provider: Provider) -> RateLimitConfig {
        self.lock_configs()
            .get(&provider)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
