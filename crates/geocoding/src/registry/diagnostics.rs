//! Per-call trail of provider attempts.

use std::fmt;

use crate::models::{FailureKind, GeocodeStatus, Provider};

/// Why a provider was not called.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SkipReason {
    /// Circuit breaker is open for this provider.
    CircuitOpen,
    /// Daily quota is used up.
    QuotaExceeded,
    /// Rate limiter had no token.
    RateLimited,
}

impl SkipReason {
    /// The result status reported when every provider is skipped for this reason.
    pub fn status(&self) -> GeocodeStatus {
        match self {
            Self::CircuitOpen => GeocodeStatus::CircuitOpen,
            Self::QuotaExceeded => GeocodeStatus::QuotaExceeded,
            Self::RateLimited => GeocodeStatus::RateLimited,
        }
    }
}

/// Record of a single provider attempt during a geocode.
#[derive(Clone, Debug)]
pub struct ProviderAttempt {
    pub provider: Provider,
    pub skipped: Option<SkipReason>,
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
    pub success: bool,
}

/// Ordered record of what happened to each provider in one geocode call.
#[derive(Clone, Debug, Default)]
pub struct GeocodeDiagnostics {
    pub attempts: Vec<ProviderAttempt>,
}

impl GeocodeDiagnostics {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn record_skip(&mut self, provider: Provider, reason: SkipReason) {
        self.attempts.push(ProviderAttempt {
            provider,
            skipped: Some(reason),
            failure: None,
            error: None,
            success: false,
        });
    }

    pub fn record_error(&mut self, provider: Provider, failure: FailureKind, error: String) {
        self.attempts.push(ProviderAttempt {
            provider,
            skipped: None,
            failure: Some(failure),
            error: Some(error),
            success: false,
        });
    }

    pub fn record_success(&mut self, provider: Provider) {
        self.attempts.push(ProviderAttempt {
            provider,
            skipped: None,
            failure: None,
            error: None,
            success: true,
        });
    }

    /// Summary for logging and for the error text of a failed result.
    pub fn summary(&self) -> String {
        self.attempts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Failure kind of the most recent provider that was called and failed.
    pub fn last_failure(&self) -> Option<FailureKind> {
        self.attempts.iter().rev().find_map(|a| a.failure)
    }

    /// Whether at least one provider was actually called.
    pub fn any_called(&self) -> bool {
        self.attempts.iter().any(|a| a.skipped.is_none())
    }

    /// Get all skip reasons.
    pub fn skip_reasons(&self) -> Vec<(Provider, SkipReason)> {
        self.attempts
            .iter()
            .filter_map(|a| a.skipped.map(|s| (a.provider, s)))
            .collect()
    }

    /// The most recent attempt.
    pub fn last(&self) -> Option<&ProviderAttempt> {
        self.attempts.last()
    }
}

impl fmt::Display for ProviderAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            write!(f, "{}: SUCCESS", self.provider)
        } else if let Some(skip) = &self.skipped {
            write!(f, "{}: SKIPPED ({:?})", self.provider, skip)
        } else if let Some(err) = &self.error {
            write!(f, "{}: ERROR ({})", self.provider, err)
        } else {
            write!(f, "{}: UNKNOWN", self.provider)
        }
    }
}
