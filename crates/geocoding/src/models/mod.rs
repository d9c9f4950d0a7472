//! Geocoding models
//!
//! - `types` - Closed enumerations (Provider, GeocodeStatus, Precision, FailureKind)
//! - `request` - Per-call request (GeocodeRequest)
//! - `result` - Common result shape (GeocodeResult, AddressComponents)

mod request;
mod result;
mod types;

pub use request::{GeocodeRequest, DEFAULT_MAX_RETRIES};
pub use result::{AddressComponents, GeocodeResult, PARTIAL_CONFIDENCE_CEILING};
pub use types::{FailureKind, GeocodeStatus, Precision, Provider};
