//! Process-wide geocoding counters.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use log::warn;
use serde::Serialize;

use super::circuit_breaker::{CircuitMetrics, CircuitState};
use super::quota::QuotaUsage;
use crate::models::Provider;

#[derive(Debug, Default)]
struct Counters {
    total_requests: u64,
    cache_hits: u64,
    successes: u64,
    failures: u64,
    per_provider_success: BTreeMap<Provider, u64>,
    per_provider_failure: BTreeMap<Provider, u64>,
}

/// Circuit state as reported in a stats snapshot.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_empty: u32,
}

impl From<&CircuitMetrics> for CircuitSnapshot {
    fn from(metrics: &CircuitMetrics) -> Self {
        Self {
            state: metrics.state,
            consecutive_failures: metrics.consecutive_failures,
            consecutive_empty: metrics.consecutive_empty,
        }
    }
}

/// Point-in-time view of the geocoder's counters and provider health.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    /// `cache_hits / total_requests`, 0 when no requests were made.
    pub cache_hit_rate: f64,
    /// Requests answered with a usable result, cache hits included.
    pub successes: u64,
    /// Requests where every provider failed or was skipped.
    pub failures: u64,
    pub success_rate: f64,
    pub per_provider_success: BTreeMap<Provider, u64>,
    pub per_provider_failure: BTreeMap<Provider, u64>,
    pub circuit_breakers: BTreeMap<Provider, CircuitSnapshot>,
    pub quota_used: BTreeMap<Provider, QuotaUsage>,
}

/// Mutex-guarded request counters.
///
/// Breaker and quota state live in their own components; they are only
/// folded in when a snapshot is taken, so `reset` never touches them.
#[derive(Default)]
pub struct GeocoderStats {
    counters: Mutex<Counters>,
}

impl GeocoderStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|poisoned| {
            warn!("Stats mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn record_request(&self) {
        self.lock_counters().total_requests += 1;
    }

    pub fn record_cache_hit(&self) {
        let mut counters = self.lock_counters();
        counters.cache_hits += 1;
        counters.successes += 1;
    }

    pub fn record_provider_success(&self, provider: Provider) {
        let mut counters = self.lock_counters();
        counters.successes += 1;
        *counters.per_provider_success.entry(provider).or_insert(0) += 1;
    }

    pub fn record_provider_failure(&self, provider: Provider) {
        *self
            .lock_counters()
            .per_provider_failure
            .entry(provider)
            .or_insert(0) += 1;
    }

    /// Count a request that ended without a usable result.
    pub fn record_failure(&self) {
        self.lock_counters().failures += 1;
    }

    pub fn reset(&self) {
        *self.lock_counters() = Counters::default();
    }

    pub fn snapshot(
        &self,
        circuits: &[CircuitMetrics],
        quotas: Vec<(Provider, QuotaUsage)>,
    ) -> StatsSnapshot {
        let counters = self.lock_counters();

        StatsSnapshot {
            total_requests: counters.total_requests,
            cache_hits: counters.cache_hits,
            cache_hit_rate: ratio(counters.cache_hits, counters.total_requests),
            successes: counters.successes,
            failures: counters.failures,
            success_rate: ratio(counters.successes, counters.total_requests),
            per_provider_success: counters.per_provider_success.clone(),
            per_provider_failure: counters.per_provider_failure.clone(),
            circuit_breakers: circuits
                .iter()
                .map(|m| (m.provider, CircuitSnapshot::from(m)))
                .collect(),
            quota_used: quotas.into_iter().collect(),
        }
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
