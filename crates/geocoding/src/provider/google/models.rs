//! Google Geocoding API response structures.

use serde::Deserialize;

use crate::models::AddressComponents;

#[derive(Debug, Deserialize)]
pub struct GeocodeResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<GoogleResult>,
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GoogleResult {
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub address_components: Vec<AddressComponent>,
    pub geometry: Geometry,
    #[serde(default)]
    pub partial_match: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddressComponent {
    pub long_name: String,
    pub short_name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
    pub location_type: String,
}

#[derive(Debug, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl GoogleResult {
    fn component(&self, kind: &str) -> Option<&AddressComponent> {
        self.address_components
            .iter()
            .find(|c| c.types.iter().any(|t| t == kind))
    }

    fn long_name(&self, kind: &str) -> Option<String> {
        self.component(kind).map(|c| c.long_name.clone())
    }

    fn short_name(&self, kind: &str) -> Option<String> {
        self.component(kind).map(|c| c.short_name.clone())
    }

    pub fn components(&self) -> AddressComponents {
        AddressComponents {
            street_number: self.long_name("street_number"),
            street_name: self.long_name("route"),
            city: self
                .long_name("locality")
                .or_else(|| self.long_name("postal_town"))
                .or_else(|| self.long_name("sublocality")),
            state: self.short_name("administrative_area_level_1"),
            postal_code: self.long_name("postal_code"),
            country: self.short_name("country"),
        }
    }
}
