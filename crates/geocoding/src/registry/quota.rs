//! Daily request quotas for metered providers.
//!
//! A provider with no configured limit is never denied. Counters reset at
//! the next UTC midnight after the current window began.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::models::Provider;

#[derive(Debug)]
struct QuotaState {
    used_today: u32,
    daily_limit: u32,
    reset_at: DateTime<Utc>,
}

impl QuotaState {
    fn new(daily_limit: u32, now: DateTime<Utc>) -> Self {
        Self {
            used_today: 0,
            daily_limit,
            reset_at: next_midnight(now),
        }
    }

    /// Roll the window forward if `now` has passed `reset_at`.
    fn roll_over(&mut self, now: DateTime<Utc>) {
        if now < self.reset_at {
            return;
        }
        let days_behind = (now - self.reset_at).num_days() + 1;
        self.reset_at += Duration::days(days_behind);
        self.used_today = 0;
    }
}

fn next_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let tomorrow = today.succ_opt().unwrap_or(today);
    tomorrow
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now + Duration::days(1))
}

/// Usage of one metered provider.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuotaUsage {
    pub used_today: u32,
    pub daily_limit: u32,
    pub reset_at: DateTime<Utc>,
}

/// Per-provider daily request counter with a hard cap.
pub struct QuotaTracker {
    quotas: Mutex<HashMap<Provider, QuotaState>>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self {
            quotas: Mutex::new(HashMap::new()),
        }
    }

    fn lock_quotas(&self) -> MutexGuard<'_, HashMap<Provider, QuotaState>> {
        self.quotas.lock().unwrap_or_else(|poisoned| {
            warn!("Quota tracker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Set a daily cap for a provider. Usage in the current window is kept.
    pub fn configure(&self, provider: Provider, daily_limit: u32) {
        let now = Utc::now();
        let mut quotas = self.lock_quotas();
        quotas
            .entry(provider)
            .and_modify(|state| state.daily_limit = daily_limit)
            .or_insert_with(|| QuotaState::new(daily_limit, now));
    }

    pub fn is_metered(&self, provider: Provider) -> bool {
        self.lock_quotas().contains_key(&provider)
    }

    /// Consume one request from the provider's daily allowance.
    pub fn try_consume(&self, provider: Provider) -> bool {
        self.try_consume_at(provider, Utc::now())
    }

    /// [`try_consume`](Self::try_consume) against an explicit clock reading.
    pub fn try_consume_at(&self, provider: Provider, now: DateTime<Utc>) -> bool {
        let mut quotas = self.lock_quotas();
        let Some(state) = quotas.get_mut(&provider) else {
            return true;
        };

        if now >= state.reset_at {
            info!("Quota: daily window for '{}' reset", provider);
            state.roll_over(now);
        }

        if state.used_today >= state.daily_limit {
            debug!(
                "Quota: '{}' exhausted ({}/{})",
                provider, state.used_today, state.daily_limit
            );
            return false;
        }

        state.used_today += 1;
        true
    }

    /// Return a unit consumed for a request that was never sent.
    pub fn refund(&self, provider: Provider) {
        if let Some(state) = self.lock_quotas().get_mut(&provider) {
            state.used_today = state.used_today.saturating_sub(1);
        }
    }

    pub fn usage(&self, provider: Provider) -> Option<QuotaUsage> {
        self.usage_at(provider, Utc::now())
    }

    pub fn usage_at(&self, provider: Provider, now: DateTime<Utc>) -> Option<QuotaUsage> {
        let mut quotas = self.lock_quotas();
        let state = quotas.get_mut(&provider)?;
        state.roll_over(now);
        Some(QuotaUsage {
            used_today: state.used_today,
            daily_limit: state.daily_limit,
            reset_at: state.reset_at,
        })
    }

    /// Usage for every metered provider, ordered by provider.
    pub fn all_usage(&self) -> Vec<(Provider, QuotaUsage)> {
        let now = Utc::now();
        let mut quotas = self.lock_quotas();
        let mut usage: Vec<_> = quotas
            .iter_mut()
            .map(|(provider, state)| {
                state.roll_over(now);
                (
                    *provider,
                    QuotaUsage {
                        used_today: state.used_today,
                        daily_limit: state.daily_limit,
                        reset_at: state.reset_at,
                    },
                )
            })
            .collect();
        usage.sort_by_key(|(provider, _)| *provider);
        usage
    }
}

impl Default for QuotaTracker {
    fn default() -> Self {
        Self::new()
    }
}
