//! Environment-driven geocoder configuration.
//!
//! All variables are prefixed `GEOCODER_`. Unset or unparseable values fall
//! back to their defaults. An unusable provider setup or an out-of-range
//! duration is an error at build time.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{
    CacheStore, MemoryCacheStore, RedisCacheStore, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL,
    MAX_CACHE_TTL,
};
use crate::errors::GeocodeError;
use crate::models::{Provider, DEFAULT_MAX_RETRIES};
use crate::provider::{census, google, nominatim};
use crate::provider::{CensusProvider, GeocodingProvider, GoogleProvider, NominatimProvider};
use crate::registry::{
    BatchOptions, CircuitBreaker, CircuitBreakerConfig, GeocoderSettings, HierarchicalGeocoder,
    RateLimitConfig, ResultValidator, ValidatorConfig, DEFAULT_BACKOFF_BASE, DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONCURRENT,
    DEFAULT_REQUEST_TIMEOUT, MAX_COOLDOWN,
};

const PREFIX: &str = "GEOCODER_";

/// Partial rate limit override; unset fields keep the provider's default.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RateLimitOverride {
    pub refill_per_second: Option<f64>,
    pub burst_capacity: Option<f64>,
}

impl RateLimitOverride {
    fn apply(&self, base: RateLimitConfig) -> RateLimitConfig {
        RateLimitConfig {
            refill_per_second: self.refill_per_second.unwrap_or(base.refill_per_second),
            burst_capacity: self.burst_capacity.unwrap_or(base.burst_capacity),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GeocoderConfig {
    /// Provider names in priority order, as written in `GEOCODER_PROVIDERS`.
    pub providers: Vec<String>,
    pub google_api_key: Option<String>,
    pub google_daily_quota: u32,
    pub nominatim_user_agent: String,
    pub census_url: String,
    pub nominatim_url: String,
    pub google_url: String,
    /// Redis cache; the in-memory cache is used when unset.
    pub redis_url: Option<String>,
    pub cache_ttl: Duration,
    pub cache_capacity: u64,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limits: BTreeMap<Provider, RateLimitOverride>,
    pub batch_size: usize,
    pub max_concurrent: usize,
    pub validator: ValidatorConfig,
}

impl GeocoderConfig {
    /// Read configuration from the process environment (and `.env`, if present).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which receives full variable names.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}{}", PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let parse = |name: &str| var(name).and_then(|v| v.parse::<u64>().ok());
        let flag = |name: &str| {
            var(name).and_then(|v| match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => Some(true),
                "0" | "false" | "no" => Some(false),
                _ => None,
            })
        };

        let google_api_key = var("GOOGLE_API_KEY");
        let providers = match lookup(&format!("{}PROVIDERS", PREFIX)) {
            Some(list) => list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => default_order(google_api_key.is_some()),
        };

        let defaults = CircuitBreakerConfig::default();
        let validator_defaults = ValidatorConfig::default();
        let circuit_breaker = CircuitBreakerConfig {
            failure_threshold: parse("BREAKER_THRESHOLD")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.failure_threshold),
            empty_result_threshold: parse("BREAKER_EMPTY_THRESHOLD")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.empty_result_threshold),
            cooldown: parse("BREAKER_COOLDOWN_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cooldown),
        };

        let mut rate_limits = BTreeMap::new();
        for provider in Provider::NETWORK {
            let positive = |name: String| {
                var(&name)
                    .and_then(|v| v.parse::<f64>().ok())
                    .filter(|v| v.is_finite() && *v > 0.0)
            };
            let limit = RateLimitOverride {
                refill_per_second: positive(format!("{}_RATE_PER_SEC", provider)),
                burst_capacity: positive(format!("{}_BURST", provider)),
            };
            if limit != RateLimitOverride::default() {
                rate_limits.insert(provider, limit);
            }
        }

        Self {
            providers,
            google_api_key,
            google_daily_quota: parse("GOOGLE_DAILY_QUOTA")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(google::DEFAULT_DAILY_QUOTA),
            nominatim_user_agent: var("NOMINATIM_USER_AGENT")
                .unwrap_or_else(|| nominatim::DEFAULT_USER_AGENT.to_string()),
            census_url: var("CENSUS_URL").unwrap_or_else(|| census::DEFAULT_BASE_URL.to_string()),
            nominatim_url: var("NOMINATIM_URL")
                .unwrap_or_else(|| nominatim::DEFAULT_BASE_URL.to_string()),
            google_url: var("GOOGLE_URL").unwrap_or_else(|| google::DEFAULT_BASE_URL.to_string()),
            redis_url: var("REDIS_URL"),
            cache_ttl: parse("CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CACHE_TTL),
            cache_capacity: parse("CACHE_CAPACITY").unwrap_or(DEFAULT_CACHE_CAPACITY),
            request_timeout: parse("REQUEST_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            max_retries: parse("MAX_RETRIES")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(DEFAULT_MAX_RETRIES),
            backoff_base: parse("BACKOFF_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_BACKOFF_BASE),
            circuit_breaker,
            rate_limits,
            batch_size: parse("BATCH_SIZE")
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(DEFAULT_BATCH_SIZE),
            max_concurrent: parse("MAX_CONCURRENT")
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(DEFAULT_MAX_CONCURRENT),
            validator: ValidatorConfig {
                reject_null_island: flag("REJECT_NULL_ISLAND")
                    .unwrap_or(validator_defaults.reject_null_island),
                warn_on_missing_address: flag("WARN_MISSING_ADDRESS")
                    .unwrap_or(validator_defaults.warn_on_missing_address),
            },
        }
    }

    /// Parse the provider list into priority order.
    pub fn provider_order(&self) -> Result<Vec<Provider>, GeocodeError> {
        if self.providers.is_empty() {
            return Err(GeocodeError::Config(
                "GEOCODER_PROVIDERS lists no providers".to_string(),
            ));
        }

        let mut order = Vec::with_capacity(self.providers.len());
        for name in &self.providers {
            let provider = Provider::from_str(name)
                .map_err(|_| GeocodeError::UnknownProvider(name.clone()))?;
            if provider == Provider::Cache {
                return Err(GeocodeError::Config(
                    "CACHE is not a network provider".to_string(),
                ));
            }
            if order.contains(&provider) {
                return Err(GeocodeError::Config(format!("{} is listed twice", provider)));
            }
            order.push(provider);
        }
        Ok(order)
    }

    /// Batch defaults from `GEOCODER_BATCH_SIZE` and `GEOCODER_MAX_CONCURRENT`.
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            batch_size: self.batch_size,
            max_concurrent: self.max_concurrent,
            max_retries: self.max_retries,
            ..Default::default()
        }
    }

    /// Reject durations and thresholds the geocoder cannot work with.
    pub fn validate(&self) -> Result<(), GeocodeError> {
        if self.cache_ttl.is_zero() || self.cache_ttl > MAX_CACHE_TTL {
            return Err(GeocodeError::Config(format!(
                "GEOCODER_CACHE_TTL_SECS must be between 1 and {}",
                MAX_CACHE_TTL.as_secs()
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(GeocodeError::Config(
                "GEOCODER_REQUEST_TIMEOUT_MS must be positive".to_string(),
            ));
        }
        if self.circuit_breaker.cooldown > MAX_COOLDOWN {
            return Err(GeocodeError::Config(format!(
                "GEOCODER_BREAKER_COOLDOWN_SECS must be at most {}",
                MAX_COOLDOWN.as_secs()
            )));
        }
        if self.circuit_breaker.failure_threshold == 0
            || self.circuit_breaker.empty_result_threshold == 0
        {
            return Err(GeocodeError::Config(
                "breaker thresholds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Build a geocoder with the configured providers, cache and limits.
    pub fn build(&self) -> Result<HierarchicalGeocoder, GeocodeError> {
        self.validate()?;
        let order = self.provider_order()?;

        let mut providers: Vec<Arc<dyn GeocodingProvider>> = Vec::with_capacity(order.len());
        for provider in order {
            providers.push(self.provider(provider)?);
        }

        let cache: Arc<dyn CacheStore> = match &self.redis_url {
            Some(url) => Arc::new(RedisCacheStore::new(url)?),
            None => Arc::new(MemoryCacheStore::with_settings(
                self.cache_capacity,
                self.cache_ttl,
            )),
        };

        let overrides: Vec<(Provider, RateLimitConfig)> = providers
            .iter()
            .filter_map(|p| {
                self.rate_limits
                    .get(&p.id())
                    .map(|o| (p.id(), o.apply(p.rate_limit())))
            })
            .collect();

        let mut geocoder = HierarchicalGeocoder::new(providers)
            .with_cache(cache)
            .with_circuit_breaker(CircuitBreaker::with_config(self.circuit_breaker.clone()))
            .with_validator(ResultValidator::with_config(self.validator.clone()))
            .with_settings(GeocoderSettings {
                request_timeout: self.request_timeout,
                backoff_base: self.backoff_base,
                cache_ttl: self.cache_ttl,
                max_retries: self.max_retries,
            });

        for (provider, limit) in overrides {
            geocoder = geocoder.with_rate_limit(provider, limit);
        }

        Ok(geocoder)
    }

    fn provider(&self, provider: Provider) -> Result<Arc<dyn GeocodingProvider>, GeocodeError> {
        let provider: Arc<dyn GeocodingProvider> = match provider {
            Provider::Census => Arc::new(CensusProvider::with_base_url(&self.census_url)),
            Provider::Nominatim => Arc::new(NominatimProvider::with_base_url(
                &self.nominatim_url,
                &self.nominatim_user_agent,
            )),
            Provider::Google => {
                let api_key =
                    self.google_api_key
                        .as_deref()
                        .ok_or_else(|| GeocodeError::MissingCredentials {
                            provider: Provider::Google.to_string(),
                        })?;
                Arc::new(
                    GoogleProvider::with_base_url(&self.google_url, api_key)
                        .with_daily_quota(self.google_daily_quota),
                )
            }
            Provider::Cache => {
                return Err(GeocodeError::Config(
                    "CACHE is not a network provider".to_string(),
                ))
            }
        };
        Ok(provider)
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

/// Census, then Nominatim, then Google when a key is available.
fn default_order(has_google_key: bool) -> Vec<String> {
    Provider::NETWORK
        .iter()
        .filter(|p| has_google_key || **p != Provider::Google)
        .map(|p| p.as_str().to_lowercase())
        .collect()
}
