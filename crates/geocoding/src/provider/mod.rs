//! Geocoding provider abstractions and implementations.
//!
//! This module contains:
//! - The `GeocodingProvider` trait that all providers implement
//! - The confidence mapping shared by the adapters
//! - Concrete provider implementations (Census, Nominatim, Google)
//!
//! # Architecture
//!
//! The provider system is designed to be:
//! - **Provider-agnostic**: The geocoder doesn't know about specific services
//! - **Extensible**: New providers can be added by implementing `GeocodingProvider`
//! - **Failure as data**: Adapters return `Failed` results, never errors or panics
//!
//! Adapters perform exactly one HTTP call per `geocode`. Retries, backoff and
//! gating live in the registry.

pub mod confidence;
mod http;
mod traits;

pub mod census;
pub mod google;
pub mod nominatim;

// Re-exports
pub use census::CensusProvider;
pub use google::GoogleProvider;
pub use nominatim::NominatimProvider;
pub use traits::GeocodingProvider;
