//! Hierarchical geocoder.
//!
//! The geocoder owns the shared protection state and walks the provider list:
//! - Cache lookup first, when the request allows it
//! - Providers strictly in priority order, first usable answer wins
//! - Each attempt gated by circuit breaker, daily quota and rate limiter
//! - Retry with exponential backoff for transient transport failures
//! - Result validation before an answer is accepted
//!
//! Nothing here returns an error. Every outcome is a [`GeocodeResult`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::diagnostics::{GeocodeDiagnostics, SkipReason};
use super::{
    CallPermit, CircuitBreaker, CircuitState, GeocoderStats, QuotaTracker, RateLimitConfig,
    RateLimiter, ResultValidator, StatsSnapshot,
};
use crate::cache::{CacheStore, DEFAULT_CACHE_TTL};
use crate::errors::RetryClass;
use crate::models::{
    FailureKind, GeocodeRequest, GeocodeResult, GeocodeStatus, Provider, DEFAULT_MAX_RETRIES,
};
use crate::provider::GeocodingProvider;

/// Default timeout for a single provider call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Default delay before the first retry; doubled on each further retry.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(250);

const MAX_BACKOFF_DOUBLINGS: u32 = 10;

/// Timing settings for the geocoder.
#[derive(Clone, Debug, PartialEq)]
pub struct GeocoderSettings {
    pub request_timeout: Duration,
    pub backoff_base: Duration,
    pub cache_ttl: Duration,
    /// Attempts per provider for [`HierarchicalGeocoder::geocode_address`].
    pub max_retries: u32,
}

impl Default for GeocoderSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            backoff_base: DEFAULT_BACKOFF_BASE,
            cache_ttl: DEFAULT_CACHE_TTL,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// What happened when one provider was tried.
enum ProviderOutcome {
    Located(GeocodeResult),
    Skipped,
    Failed,
}

/// Geocoder that falls back through providers in priority order.
pub struct HierarchicalGeocoder {
    providers: Vec<Arc<dyn GeocodingProvider>>,
    cache: Option<Arc<dyn CacheStore>>,
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    quota: QuotaTracker,
    validator: ResultValidator,
    stats: GeocoderStats,
    settings: GeocoderSettings,
}

impl HierarchicalGeocoder {
    /// Create a geocoder over `providers`, highest priority first.
    ///
    /// Rate limits and daily quotas are taken from each provider.
    pub fn new(providers: Vec<Arc<dyn GeocodingProvider>>) -> Self {
        let rate_limiter = RateLimiter::new();
        let quota = QuotaTracker::new();

        for provider in &providers {
            rate_limiter.configure(provider.id(), provider.rate_limit());
            if let Some(daily_limit) = provider.daily_quota() {
                quota.configure(provider.id(), daily_limit);
            }
        }

        Self {
            providers,
            cache: None,
            rate_limiter,
            circuit_breaker: CircuitBreaker::new(),
            quota,
            validator: ResultValidator::new(),
            stats: GeocoderStats::new(),
            settings: GeocoderSettings::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreaker) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    /// Replace the default result checks, e.g. to warn on results without an address.
    pub fn with_validator(mut self, validator: ResultValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_settings(mut self, settings: GeocoderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Override the rate limit a provider declared for itself.
    pub fn with_rate_limit(self, provider: Provider, config: RateLimitConfig) -> Self {
        self.rate_limiter.configure(provider, config);
        self
    }

    /// Override the daily quota a provider declared for itself.
    pub fn with_daily_quota(self, provider: Provider, daily_limit: u32) -> Self {
        self.quota.configure(provider, daily_limit);
        self
    }

    /// Geocode a single address, using the cache and the configured retries.
    pub async fn geocode_address(&self, address: &str) -> GeocodeResult {
        let request = GeocodeRequest::new(address).with_max_retries(self.settings.max_retries);
        self.geocode(&request).await
    }

    /// Geocode one request.
    ///
    /// Tries, in order:
    /// 1. The cache (if enabled for this request)
    /// 2. Each provider in priority order, skipping those whose circuit is
    ///    open, whose quota is exhausted or that are rate limited
    /// 3. Up to `max_retries` attempts per provider for transient failures
    ///
    /// The first usable answer is cached and returned. When every provider
    /// fails, the result has no coordinates and its `error` is the attempt trail.
    pub async fn geocode(&self, request: &GeocodeRequest) -> GeocodeResult {
        let started = Instant::now();
        self.stats.record_request();

        let address = request.address.as_str();
        if address.trim().is_empty() {
            self.stats.record_failure();
            return GeocodeResult::failed(
                self.primary_provider(),
                FailureKind::Malformed,
                "empty address",
            );
        }

        if request.use_cache {
            if let Some(hit) = self.cached(address).await {
                self.stats.record_cache_hit();
                return hit.into_cached().with_response_time(elapsed_ms(started));
            }
        }

        let mut diagnostics = GeocodeDiagnostics::new();

        for provider in &self.providers {
            let id = provider.id();
            match self
                .try_provider(provider.as_ref(), address, request.attempts(), &mut diagnostics)
                .await
            {
                ProviderOutcome::Located(result) => {
                    self.stats.record_provider_success(id);
                    let result = result.with_response_time(elapsed_ms(started));
                    if request.use_cache {
                        self.store(address, &result).await;
                    }
                    debug!("Geocode trail: {}", diagnostics.summary());
                    return result;
                }
                ProviderOutcome::Skipped => {}
                ProviderOutcome::Failed => self.stats.record_provider_failure(id),
            }
        }

        self.stats.record_failure();
        let summary = diagnostics.summary();
        warn!("All providers failed: {}", summary);

        let provider = diagnostics
            .last()
            .map(|attempt| attempt.provider)
            .unwrap_or_else(|| self.primary_provider());
        let mut result = GeocodeResult::skipped(provider, exhausted_status(&diagnostics));
        result.failure = diagnostics.last_failure();
        result.error = Some(if summary.is_empty() {
            "no providers configured".to_string()
        } else {
            summary
        });
        result.with_response_time(elapsed_ms(started))
    }

    /// Try one provider, retrying transient failures.
    async fn try_provider(
        &self,
        provider: &dyn GeocodingProvider,
        address: &str,
        attempts: u32,
        diagnostics: &mut GeocodeDiagnostics,
    ) -> ProviderOutcome {
        let id = provider.id();

        let mut permit = match self.acquire(id) {
            Ok(permit) => permit,
            Err(reason) => {
                debug!("Skipping provider '{}': {:?}", id, reason);
                diagnostics.record_skip(id, reason);
                return ProviderOutcome::Skipped;
            }
        };

        let mut attempt = 1;
        loop {
            // Dropping this future mid-call drops the permit and frees a trial
            let result = self
                .validator
                .check(provider.geocode(address, self.settings.request_timeout).await);

            if result.is_success() {
                permit.record_success();
                diagnostics.record_success(id);
                info!(
                    "Geocoded with '{}' ({:?}, confidence {:.2})",
                    id, result.status, result.confidence_score
                );
                return ProviderOutcome::Located(result);
            }

            let failure = result.failure.unwrap_or(FailureKind::EmptyResult);
            let retry = match failure.retry_class() {
                RetryClass::WithBackoff => {
                    permit.record_failure();
                    true
                }
                RetryClass::FailoverWithPenalty => {
                    permit.record_failure();
                    false
                }
                RetryClass::NextProvider => {
                    permit.record_empty();
                    false
                }
            };

            let message = result
                .error
                .clone()
                .unwrap_or_else(|| format!("{:?}", failure));

            if !retry || attempt >= attempts {
                debug!(
                    "Provider '{}' failed after {} attempt(s): {}",
                    id, attempt, message
                );
                diagnostics.record_error(id, failure, message);
                return ProviderOutcome::Failed;
            }

            let delay = self.backoff(attempt);
            debug!(
                "Provider '{}' attempt {} failed ({}), retrying in {:?}",
                id, attempt, message, delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;

            // A retry needs fresh capacity like any other call
            permit = match self.acquire(id) {
                Ok(permit) => permit,
                Err(reason) => {
                    debug!("Retry of '{}' blocked: {:?}", id, reason);
                    diagnostics.record_error(id, failure, message);
                    return ProviderOutcome::Failed;
                }
            };
        }
    }

    /// Pass the breaker, quota and rate limiter gates in that order.
    ///
    /// A later denial hands back whatever the earlier gates granted; a
    /// HalfOpen trial goes back when the permit is dropped.
    fn acquire(&self, provider: Provider) -> Result<CallPermit<'_>, SkipReason> {
        let permit = self
            .circuit_breaker
            .admit(provider)
            .ok_or(SkipReason::CircuitOpen)?;

        if !self.quota.try_consume(provider) {
            return Err(SkipReason::QuotaExceeded);
        }

        if !self.rate_limiter.try_acquire(provider) {
            self.quota.refund(provider);
            return Err(SkipReason::RateLimited);
        }

        Ok(permit)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(MAX_BACKOFF_DOUBLINGS);
        self.settings.backoff_base.saturating_mul(1 << doublings)
    }

    async fn cached(&self, address: &str) -> Option<GeocodeResult> {
        let cache = self.cache.as_ref()?;
        match cache.get(address).await {
            Ok(Some(hit)) if hit.is_success() => Some(hit),
            Ok(_) => None,
            Err(e) => {
                warn!("Cache lookup failed, treating as miss: {}", e);
                None
            }
        }
    }

    async fn store(&self, address: &str, result: &GeocodeResult) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache.put(address, result, self.settings.cache_ttl).await {
            warn!("Cache write failed, result not cached: {}", e);
        }
    }

    pub(super) fn primary_provider(&self) -> Provider {
        self.providers
            .first()
            .map(|p| p.id())
            .unwrap_or(Provider::Cache)
    }

    /// Provider ids in priority order.
    pub fn providers(&self) -> Vec<Provider> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub fn settings(&self) -> &GeocoderSettings {
        &self.settings
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    /// Current circuit state for a provider.
    pub fn circuit_state(&self, provider: Provider) -> CircuitState {
        self.circuit_breaker.state(provider)
    }

    /// Manually close a provider's circuit.
    pub fn reset_circuit(&self, provider: Provider) {
        self.circuit_breaker.reset(provider);
    }

    /// Counters plus current breaker and quota state.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats
            .snapshot(&self.circuit_breaker.metrics(), self.quota.all_usage())
    }

    /// Zero the request counters. Breaker and quota state are kept.
    pub fn reset_stats(&self) {
        self.stats.reset();
        info!("Geocoder statistics reset");
    }
}

/// Status of a result when no provider produced an answer.
///
/// If no provider was called and every skip had the same cause, that cause
/// is reported; otherwise the request simply failed.
fn exhausted_status(diagnostics: &GeocodeDiagnostics) -> GeocodeStatus {
    if diagnostics.any_called() {
        return GeocodeStatus::Failed;
    }

    let reasons = diagnostics.skip_reasons();
    match reasons.first() {
        Some((_, first)) if reasons.iter().all(|(_, r)| r == first) => first.status(),
        _ => GeocodeStatus::Failed,
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
