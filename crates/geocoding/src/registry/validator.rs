//! Geocode result validation.
//!
//! Checks located results from providers before they are accepted:
//! - Coordinates inside the WGS84 range
//! - Null Island (0, 0) rejected
//! - Confidence inside [0, 1]
//!
//! A result that fails a hard check is turned into a `Malformed` failure so
//! the geocoder moves on to the next provider.

use log::warn;

use crate::models::{FailureKind, GeocodeResult};

/// Validation severity levels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationSeverity {
    /// Hard failure - reject result, try next provider.
    Hard,
    /// Soft warning - accept result but log warning.
    Soft,
}

/// Validation result details.
#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub message: String,
}

/// Result validator configuration.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Whether to reject results at exactly (0, 0).
    pub reject_null_island: bool,
    /// Whether to warn when a located result has no formatted address.
    pub warn_on_missing_address: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            reject_null_island: true,
            warn_on_missing_address: false,
        }
    }
}

/// Geocode result validator.
pub struct ResultValidator {
    config: ValidatorConfig,
}

impl ResultValidator {
    pub fn new() -> Self {
        Self {
            config: ValidatorConfig::default(),
        }
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate a result.
    ///
    /// Returns the hard issues joined into one message on rejection.
    /// Results without coordinates are not checked.
    pub fn validate(&self, result: &GeocodeResult) -> Result<(), String> {
        let Some((lat, lon)) = result.coordinates() else {
            return Ok(());
        };

        let mut issues: Vec<ValidationIssue> = Vec::new();

        self.validate_coordinates(lat, lon, &mut issues);
        self.validate_confidence(result.confidence_score, &mut issues);
        self.validate_address(result, &mut issues);

        let errors: Vec<_> = issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Hard)
            .map(|i| i.message.as_str())
            .collect();

        if !errors.is_empty() {
            return Err(errors.join("; "));
        }

        for issue in issues.iter().filter(|i| i.severity == ValidationSeverity::Soft) {
            warn!("Geocode validation warning from {}: {}", result.provider, issue.message);
        }

        Ok(())
    }

    /// Validate and convert a rejected result into a `Malformed` failure.
    pub fn check(&self, result: GeocodeResult) -> GeocodeResult {
        match self.validate(&result) {
            Ok(()) => result,
            Err(message) => {
                warn!("Rejected result from {}: {}", result.provider, message);
                GeocodeResult::failed(result.provider, FailureKind::Malformed, message)
                    .with_response_time(result.response_time_ms)
            }
        }
    }

    fn validate_coordinates(&self, lat: f64, lon: f64, issues: &mut Vec<ValidationIssue>) {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            issues.push(ValidationIssue {
                severity: ValidationSeverity::Hard,
                message: format!("Latitude out of range: {}", lat),
            });
        }

        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            issues.push(ValidationIssue {
                severity: ValidationSeverity::Hard,
                message: format!("Longitude out of range: {}", lon),
            });
        }

        if self.config.reject_null_island && lat == 0.0 && lon == 0.0 {
            issues.push(ValidationIssue {
                severity: ValidationSeverity::Hard,
                message: "Coordinates at (0, 0)".to_string(),
            });
        }
    }

    fn validate_confidence(&self, confidence: f64, issues: &mut Vec<ValidationIssue>) {
        if !(0.0..=1.0).contains(&confidence) {
            issues.push(ValidationIssue {
                severity: ValidationSeverity::Hard,
                message: format!("Confidence out of range: {}", confidence),
            });
        }
    }

    fn validate_address(&self, result: &GeocodeResult, issues: &mut Vec<ValidationIssue>) {
        if self.config.warn_on_missing_address && result.formatted_address.is_none() {
            issues.push(ValidationIssue {
                severity: ValidationSeverity::Soft,
                message: "Missing formatted address".to_string(),
            });
        }
    }
}

impl Default for ResultValidator {
    fn default() -> Self {
        Self::new()
    }
}
