use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Source of a geocode result.
///
/// `Cache` marks results served from the cache store; every other variant
/// is an external provider queried over HTTP.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provider {
    Cache,
    Census,
    Nominatim,
    Google,
}

impl Provider {
    /// All network providers in their default priority order.
    pub const NETWORK: [Provider; 3] = [Provider::Census, Provider::Nominatim, Provider::Google];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "CACHE",
            Self::Census => "CENSUS",
            Self::Nominatim => "NOMINATIM",
            Self::Google => "GOOGLE",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cache" => Ok(Self::Cache),
            "census" => Ok(Self::Census),
            "nominatim" | "osm" => Ok(Self::Nominatim),
            "google" => Ok(Self::Google),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Outcome of a geocode request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeocodeStatus {
    /// Coordinates found at street or better precision.
    Success,
    /// Coordinates found, but only for part of the address or an area.
    Partial,
    Failed,
    RateLimited,
    QuotaExceeded,
    CircuitOpen,
}

impl GeocodeStatus {
    /// Whether the result carries a usable answer.
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Success | Self::Partial)
    }
}

/// Spatial precision reported by a provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Precision {
    Rooftop,
    Interpolated,
    Approximate,
}

/// Why a provider call did not produce a usable result.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Connection refused, DNS failure, reset, body read error.
    Network,
    /// The request exceeded its timeout.
    Timeout,
    /// Non-2xx response other than 429.
    HttpStatus(u16),
    /// The provider answered 429 or reported its own rate limit.
    Throttled,
    /// The provider responded but matched nothing.
    EmptyResult,
    /// The provider answered with data that could not be used.
    Malformed,
}
