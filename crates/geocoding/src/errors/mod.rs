//! Error types and retry classification for the geocoding crate.
//!
//! This module provides:
//! - [`GeocodeError`]: Initialization errors (bad configuration)
//! - [`CacheError`]: Cache backend errors, absorbed by the geocoder
//! - [`RetryClass`]: Classification for determining retry behavior
//!
//! Runtime geocoding never returns an error. Provider failures are carried
//! as [`FailureKind`] inside the result and classified here.

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

use crate::models::FailureKind;

/// Errors raised while building a geocoder.
#[derive(Error, Debug)]
pub enum GeocodeError {
    /// A configuration value is missing or invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A provider name could not be parsed.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// A provider requires credentials that were not supplied.
    #[error("Missing credentials for provider: {provider}")]
    MissingCredentials {
        /// The provider that needs credentials
        provider: String,
    },

    /// The cache backend could not be configured.
    #[error("Cache setup failed: {0}")]
    CacheSetup(#[from] CacheError),
}

/// Errors from a cache backend.
///
/// Never surfaced to geocode callers; a failing backend is treated as a miss.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Cache operation timed out")]
    Timeout,

    #[error("Cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl FailureKind {
    /// Returns the retry classification for this failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use landscout_geocoding::errors::RetryClass;
    /// use landscout_geocoding::FailureKind;
    ///
    /// assert_eq!(FailureKind::Timeout.retry_class(), RetryClass::WithBackoff);
    /// assert_eq!(FailureKind::EmptyResult.retry_class(), RetryClass::NextProvider);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Network | Self::Timeout => RetryClass::WithBackoff,
            Self::HttpStatus(code) if *code >= 500 => RetryClass::WithBackoff,
            Self::HttpStatus(_) | Self::Throttled => RetryClass::FailoverWithPenalty,
            Self::EmptyResult | Self::Malformed => RetryClass::NextProvider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failures_retry_with_backoff() {
        assert_eq!(FailureKind::Network.retry_class(), RetryClass::WithBackoff);
        assert_eq!(FailureKind::Timeout.retry_class(), RetryClass::WithBackoff);
        assert_eq!(FailureKind::HttpStatus(503).retry_class(), RetryClass::WithBackoff);
    }

    #[test]
    fn test_refusals_fail_over_with_penalty() {
        assert_eq!(
            FailureKind::Throttled.retry_class(),
            RetryClass::FailoverWithPenalty
        );
        assert_eq!(
            FailureKind::HttpStatus(403).retry_class(),
            RetryClass::FailoverWithPenalty
        );
    }

    #[test]
    fn test_empty_results_move_on_without_penalty() {
        assert_eq!(FailureKind::EmptyResult.retry_class(), RetryClass::NextProvider);
        assert_eq!(FailureKind::Malformed.retry_class(), RetryClass::NextProvider);
    }

    #[test]
    fn test_error_display() {
        let error = GeocodeError::MissingCredentials {
            provider: "GOOGLE".to_string(),
        };
        assert_eq!(format!("{}", error), "Missing credentials for provider: GOOGLE");

        let error = GeocodeError::Config("GEOCODER_PROVIDERS is empty".to_string());
        assert_eq!(
            format!("{}", error),
            "Invalid configuration: GEOCODER_PROVIDERS is empty"
        );
    }
}
