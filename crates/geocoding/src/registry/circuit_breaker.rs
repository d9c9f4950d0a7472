//! Per-provider circuit breaker for fault tolerance.
//!
//! Implements the circuit breaker pattern so that a degraded geocoding
//! provider is not hammered and does not dominate batch latency. The
//! circuit has three states:
//!
//! - **Closed**: Normal operation, requests are allowed through.
//! - **Open**: Provider is failing, requests are blocked.
//! - **HalfOpen**: Exactly one trial request is in flight.
//!
//! Transport failures and empty results are counted separately. An address
//! the provider cannot find says little about the provider's health, so
//! empty results trip the circuit only after their own, larger threshold.
//!
//! The circuit breaker is in-memory and resets on process restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Serialize;

use crate::models::Provider;

/// Default number of consecutive transport failures before opening the circuit.
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default number of consecutive empty results before opening the circuit.
const DEFAULT_EMPTY_RESULT_THRESHOLD: u32 = 10;

/// Default time to wait before transitioning from Open to HalfOpen.
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Longest cooldown a breaker accepts: one day.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - requests are allowed.
    Closed,
    /// Provider is failing - requests are blocked.
    Open,
    /// Testing recovery - a single trial is allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Internal circuit state for a single provider.
#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    /// Consecutive transport failures.
    consecutive_failures: u32,
    /// Consecutive empty or unusable results.
    consecutive_empty: u32,
    last_failure: Option<Instant>,
    /// End of the current cooldown while Open.
    opened_until: Option<Instant>,
    /// Whether the HalfOpen trial has been handed out.
    trial_in_flight: bool,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_empty: 0,
            last_failure: None,
            opened_until: None,
            trial_in_flight: false,
        }
    }

    fn open(&mut self, now: Instant, cooldown: Duration) {
        self.state = CircuitState::Open;
        self.opened_until = Some(now + cooldown);
        self.trial_in_flight = false;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.consecutive_empty = 0;
        self.opened_until = None;
        self.trial_in_flight = false;
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive transport failures before opening the circuit.
    pub failure_threshold: u32,
    /// Consecutive empty results before opening the circuit.
    pub empty_result_threshold: u32,
    /// Time to wait before probing recovery.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            empty_result_threshold: DEFAULT_EMPTY_RESULT_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Per-provider circuit breaker.
///
/// Thread-safe circuit breaker that tracks failures per provider
/// and prevents requests to failing providers. Only the boolean
/// "may I call?" answer and success/failure signals cross its boundary.
pub struct CircuitBreaker {
    circuits: Mutex<HashMap<Provider, Circuit>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default settings.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a circuit breaker with custom configuration.
    ///
    /// Cooldowns above [`MAX_COOLDOWN`] are capped.
    pub fn with_config(mut config: CircuitBreakerConfig) -> Self {
        config.cooldown = config.cooldown.min(MAX_COOLDOWN);
        Self {
            circuits: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Lock the circuits mutex, recovering from poison if necessary.
    fn lock_circuits(&self) -> MutexGuard<'_, HashMap<Provider, Circuit>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Check if a request may be sent to a provider.
    ///
    /// Returns true if the circuit is Closed, or if this caller receives the
    /// single HalfOpen trial. A caller granted the trial must report back via
    /// `record_success`, `record_failure`, `record_empty`, or `release_trial`.
    /// Prefer [`admit`](Self::admit), which reports back on drop.
    pub fn is_allowed(&self, provider: Provider) -> bool {
        self.is_allowed_at(provider, Instant::now())
    }

    /// [`is_allowed`](Self::is_allowed) against an explicit clock reading.
    pub fn is_allowed_at(&self, provider: Provider, now: Instant) -> bool {
        self.grant(provider, now).is_some()
    }

    /// Ask for permission to call a provider.
    ///
    /// The returned permit records the call's outcome. If it is dropped
    /// without one, as happens when the calling future is cancelled, a
    /// HalfOpen trial it carries is handed back.
    pub fn admit(&self, provider: Provider) -> Option<CallPermit<'_>> {
        self.admit_at(provider, Instant::now())
    }

    /// [`admit`](Self::admit) against an explicit clock reading.
    pub fn admit_at(&self, provider: Provider, now: Instant) -> Option<CallPermit<'_>> {
        self.grant(provider, now).map(|trial| CallPermit {
            breaker: self,
            provider,
            trial,
        })
    }

    /// `Some(true)` when the HalfOpen trial was handed out.
    fn grant(&self, provider: Provider, now: Instant) -> Option<bool> {
        let mut circuits = self.lock_circuits();
        let circuit = circuits.entry(provider).or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::Closed => Some(false),
            CircuitState::HalfOpen => {
                if circuit.trial_in_flight {
                    None
                } else {
                    circuit.trial_in_flight = true;
                    Some(true)
                }
            }
            CircuitState::Open => {
                let cooled_down = circuit.opened_until.map_or(true, |until| now >= until);
                if cooled_down {
                    info!(
                        "Circuit breaker: transitioning '{}' from Open to HalfOpen",
                        provider
                    );
                    circuit.state = CircuitState::HalfOpen;
                    circuit.trial_in_flight = true;
                    Some(true)
                } else {
                    None
                }
            }
        }
    }

    /// Hand back a HalfOpen trial that was granted but never used.
    pub fn release_trial(&self, provider: Provider) {
        let mut circuits = self.lock_circuits();
        if let Some(circuit) = circuits.get_mut(&provider) {
            if circuit.state == CircuitState::HalfOpen && circuit.trial_in_flight {
                debug!("Circuit breaker: trial for '{}' released unused", provider);
                circuit.trial_in_flight = false;
            }
        }
    }

    /// Record a successful request for a provider.
    ///
    /// In Closed state: resets both counters.
    /// In HalfOpen state: the trial succeeded, so the circuit closes.
    pub fn record_success(&self, provider: Provider) {
        let mut circuits = self.lock_circuits();
        let circuit = circuits.entry(provider).or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::Closed => {
                circuit.consecutive_failures = 0;
                circuit.consecutive_empty = 0;
            }
            CircuitState::HalfOpen => {
                info!(
                    "Circuit breaker: closing circuit for '{}' after successful trial",
                    provider
                );
                circuit.close();
            }
            CircuitState::Open => {
                // A call that started before the circuit opened
                debug!(
                    "Circuit breaker: late success for '{}' in Open state",
                    provider
                );
            }
        }
    }

    /// Record a transport failure for a provider.
    ///
    /// Opens the circuit once the failure threshold is reached.
    /// In HalfOpen state, a failed trial immediately reopens the circuit.
    pub fn record_failure(&self, provider: Provider) {
        self.record_failure_at(provider, Instant::now());
    }

    /// [`record_failure`](Self::record_failure) against an explicit clock reading.
    pub fn record_failure_at(&self, provider: Provider, now: Instant) {
        let mut circuits = self.lock_circuits();
        let circuit = circuits.entry(provider).or_insert_with(Circuit::new);

        circuit.consecutive_failures += 1;
        circuit.last_failure = Some(now);

        match circuit.state {
            CircuitState::Closed => {
                if circuit.consecutive_failures >= self.config.failure_threshold {
                    info!(
                        "Circuit breaker: opening circuit for '{}' after {} failures",
                        provider, circuit.consecutive_failures
                    );
                    circuit.open(now, self.config.cooldown);
                } else {
                    debug!(
                        "Circuit breaker: failure for '{}' ({}/{})",
                        provider, circuit.consecutive_failures, self.config.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                info!(
                    "Circuit breaker: reopening circuit for '{}' after failed trial",
                    provider
                );
                circuit.open(now, self.config.cooldown);
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker: additional failure for '{}' (already open)",
                    provider
                );
            }
        }
    }

    /// Record an empty or unusable result for a provider.
    ///
    /// Counted against `empty_result_threshold`, not the transport failure
    /// threshold. A HalfOpen trial answering "nothing found" proves the
    /// provider is reachable, so the circuit closes.
    pub fn record_empty(&self, provider: Provider) {
        self.record_empty_at(provider, Instant::now());
    }

    /// [`record_empty`](Self::record_empty) against an explicit clock reading.
    pub fn record_empty_at(&self, provider: Provider, now: Instant) {
        let mut circuits = self.lock_circuits();
        let circuit = circuits.entry(provider).or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::Closed => {
                circuit.consecutive_empty += 1;
                if circuit.consecutive_empty >= self.config.empty_result_threshold {
                    info!(
                        "Circuit breaker: opening circuit for '{}' after {} empty results",
                        provider, circuit.consecutive_empty
                    );
                    circuit.last_failure = Some(now);
                    circuit.open(now, self.config.cooldown);
                }
            }
            CircuitState::HalfOpen => {
                info!(
                    "Circuit breaker: closing circuit for '{}', trial reached the provider",
                    provider
                );
                circuit.close();
            }
            CircuitState::Open => {}
        }
    }

    /// Get the current state for a provider.
    pub fn state(&self, provider: Provider) -> CircuitState {
        self.lock_circuits()
            .get(&provider)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Get the consecutive transport failure count for a provider.
    pub fn failure_count(&self, provider: Provider) -> u32 {
        self.lock_circuits()
            .get(&provider)
            .map(|c| c.consecutive_failures)
            .unwrap_or(0)
    }

    /// Reset the circuit for a provider to Closed state.
    pub fn reset(&self, provider: Provider) {
        let mut circuits = self.lock_circuits();

        if let Some(circuit) = circuits.get_mut(&provider) {
            info!(
                "Circuit breaker: manually resetting circuit for '{}'",
                provider
            );
            circuit.close();
            circuit.last_failure = None;
        }
    }

    /// Reset all circuits to their initial state.
    pub fn reset_all(&self) {
        self.lock_circuits().clear();
        info!("Circuit breaker: all circuits reset");
    }

    /// Get metrics for all tracked providers, ordered by provider.
    pub fn metrics(&self) -> Vec<CircuitMetrics> {
        let circuits = self.lock_circuits();

        let mut metrics: Vec<_> = circuits
            .iter()
            .map(|(provider, circuit)| CircuitMetrics {
                provider: *provider,
                state: circuit.state,
                consecutive_failures: circuit.consecutive_failures,
                consecutive_empty: circuit.consecutive_empty,
                last_failure: circuit.last_failure,
                opened_until: circuit.opened_until,
            })
            .collect();
        metrics.sort_by_key(|m| m.provider);
        metrics
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Permission for one provider call, handed out by [`CircuitBreaker::admit`].
#[must_use = "dropping the permit releases it without recording an outcome"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    provider: Provider,
    /// Still holding the HalfOpen trial.
    trial: bool,
}

impl CallPermit<'_> {
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Whether this permit carries the HalfOpen trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record_success(mut self) {
        self.trial = false;
        self.breaker.record_success(self.provider);
    }

    pub fn record_failure(mut self) {
        self.trial = false;
        self.breaker.record_failure(self.provider);
    }

    pub fn record_empty(mut self) {
        self.trial = false;
        self.breaker.record_empty(self.provider);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.trial {
            self.breaker.release_trial(self.provider);
        }
    }
}

/// Metrics for a single circuit.
#[derive(Clone, Debug)]
pub struct CircuitMetrics {
    pub provider: Provider,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_empty: u32,
    pub last_failure: Option<Instant>,
    pub opened_until: Option<Instant>,
}
