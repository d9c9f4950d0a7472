/// Default number of attempts per provider.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// A single geocode request.
///
/// The address is expected to be normalized upstream; it is used verbatim
/// both as the provider query and as the cache key source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeocodeRequest {
    pub address: String,
    pub use_cache: bool,
    /// Attempts per provider, including the first one. Zero is treated as one.
    pub max_retries: u32,
}

impl GeocodeRequest {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            use_cache: true,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}
