//! Batch geocoding.
//!
//! Every address is queued on one semaphore at once, so at most
//! `max_concurrent` geocodes run across the whole batch and a slow address
//! only ever holds its own permit. Permits are granted in input order;
//! `batch_size` groups addresses into chunks for progress logging. Results
//! are written to the slot of their input index, so output order always
//! matches input order.

use std::time::Instant;

use futures::future::join_all;
use log::{debug, warn};
use tokio::sync::Semaphore;

use super::HierarchicalGeocoder;
use crate::models::{FailureKind, GeocodeRequest, GeocodeResult, DEFAULT_MAX_RETRIES};

/// Default number of addresses per chunk.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default number of concurrent geocodes.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

const DEADLINE_EXCEEDED: &str = "deadline exceeded";

/// Options for [`HierarchicalGeocoder::geocode_batch`].
#[derive(Clone, Debug)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub max_concurrent: usize,
    pub use_cache: bool,
    pub max_retries: u32,
    /// Work still running at this instant is abandoned and reported as failed.
    pub deadline: Option<Instant>,
}

impl BatchOptions {
    pub fn new(batch_size: usize, max_concurrent: usize) -> Self {
        Self {
            batch_size,
            max_concurrent,
            ..Default::default()
        }
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            use_cache: true,
            max_retries: DEFAULT_MAX_RETRIES,
            deadline: None,
        }
    }
}

impl HierarchicalGeocoder {
    /// Geocode many addresses, returning one result per input in input order.
    ///
    /// A failing address yields a `Failed` entry and never aborts the batch.
    /// With a deadline, whatever finished in time is returned and the rest
    /// is reported as failed.
    pub async fn geocode_batch<S: AsRef<str>>(
        &self,
        addresses: &[S],
        options: &BatchOptions,
    ) -> Vec<GeocodeResult> {
        let batch_size = options.batch_size.max(1);
        let semaphore = Semaphore::new(options.max_concurrent.max(1));
        let mut slots: Vec<Option<GeocodeResult>> = vec![None; addresses.len()];

        debug!(
            "Geocoding batch of {} addresses (chunks of {}, {} concurrent)",
            addresses.len(),
            batch_size,
            options.max_concurrent.max(1)
        );

        let tasks = addresses.iter().enumerate().map(|(index, address)| {
            let request = GeocodeRequest {
                address: address.as_ref().to_string(),
                use_cache: options.use_cache,
                max_retries: options.max_retries,
            };
            let semaphore = &semaphore;

            async move {
                let work = async {
                    // Blank addresses fail without touching providers
                    if request.address.trim().is_empty() {
                        return Some(self.geocode(&request).await);
                    }
                    let _permit = semaphore.acquire().await.ok()?;
                    if index % batch_size == 0 {
                        debug!("Starting chunk {} of batch", index / batch_size);
                    }
                    Some(self.geocode(&request).await)
                };

                let outcome = match options.deadline {
                    Some(deadline) => tokio::time::timeout_at(deadline.into(), work)
                        .await
                        .ok()
                        .flatten(),
                    None => work.await,
                };
                (index, outcome)
            }
        });

        for (index, outcome) in join_all(tasks).await {
            if outcome.is_none() {
                warn!("Batch deadline passed before address {} finished", index);
            }
            slots[index] = outcome;
        }

        let provider = self.primary_provider();
        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    GeocodeResult::failed(provider, FailureKind::Timeout, DEADLINE_EXCEEDED)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::models::{GeocodeStatus, Provider};
    use crate::provider::GeocodingProvider;
    use crate::registry::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    use crate::registry::testing::MockProvider;

    fn geocoder(provider: Arc<MockProvider>) -> HierarchicalGeocoder {
        HierarchicalGeocoder::new(vec![provider as Arc<dyn GeocodingProvider>])
    }

    fn addresses(results: &[GeocodeResult]) -> Vec<Option<&str>> {
        results
            .iter()
            .map(|r| r.formatted_address.as_deref())
            .collect()
    }

    #[tokio::test]
    async fn test_output_order_matches_input() {
        let census = Arc::new(
            MockProvider::new(Provider::Census).with_delay_for("B", Duration::from_millis(50)),
        );
        let geocoder = geocoder(census);

        let results = geocoder
            .geocode_batch(&["A", "B", "C"], &BatchOptions::new(10, 3))
            .await;

        assert_eq!(addresses(&results), vec![Some("A"), Some("B"), Some("C")]);
    }

    #[tokio::test]
    async fn test_failed_entry_does_not_abort_batch() {
        let census = Arc::new(MockProvider::new(Provider::Census));
        let geocoder = geocoder(census.clone());

        let results = geocoder
            .geocode_batch(&["A", "", "C"], &BatchOptions::default())
            .await;

        let statuses: Vec<_> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                GeocodeStatus::Success,
                GeocodeStatus::Failed,
                GeocodeStatus::Success
            ]
        );
        assert_eq!(census.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrency_cap_across_chunks() {
        let census = Arc::new(
            MockProvider::new(Provider::Census).with_delay(Duration::from_millis(20)),
        );
        let geocoder = geocoder(census.clone());
        let input: Vec<String> = (0..12).map(|i| format!("{} Main St", i)).collect();

        let results = geocoder
            .geocode_batch(&input, &BatchOptions::new(5, 3).without_cache())
            .await;

        assert_eq!(results.len(), 12);
        assert!(results.iter().all(|r| r.is_success()));
        assert_eq!(census.calls(), 12);
        assert_eq!(census.max_in_flight(), 3);
    }

    #[tokio::test]
    async fn test_deadline_keeps_finished_results() {
        let census = Arc::new(
            MockProvider::new(Provider::Census).with_delay_for("slow", Duration::from_secs(5)),
        );
        let geocoder = geocoder(census);

        let started = Instant::now();
        let options = BatchOptions::new(10, 3).with_deadline(started + Duration::from_millis(200));
        let results = geocoder
            .geocode_batch(&["A", "slow", "C"], &options)
            .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(results[0].is_success());
        assert!(results[2].is_success());
        assert_eq!(results[1].status, GeocodeStatus::Failed);
        assert_eq!(results[1].error.as_deref(), Some("deadline exceeded"));
    }

    #[tokio::test]
    async fn test_slow_address_does_not_hold_back_next_chunk() {
        let census = Arc::new(
            MockProvider::new(Provider::Census)
                .with_delay(Duration::from_millis(100))
                .with_delay_for("slow", Duration::from_millis(500)),
        );
        let geocoder = geocoder(census.clone());

        let results = geocoder
            .geocode_batch(&["slow", "A", "B", "C"], &BatchOptions::new(2, 4).without_cache())
            .await;

        assert!(results.iter().all(|r| r.is_success()));
        assert_eq!(census.max_in_flight(), 4);
    }

    #[tokio::test]
    async fn test_deadline_during_trial_releases_circuit() {
        let census = Arc::new(
            MockProvider::new(Provider::Census).with_delay_for("slow", Duration::from_secs(5)),
        );
        let geocoder = geocoder(census.clone()).with_circuit_breaker(CircuitBreaker::with_config(
            CircuitBreakerConfig {
                failure_threshold: 1,
                cooldown: Duration::ZERO,
                ..Default::default()
            },
        ));
        geocoder.circuit_breaker().record_failure(Provider::Census);

        let options =
            BatchOptions::default().with_deadline(Instant::now() + Duration::from_millis(100));
        let results = geocoder.geocode_batch(&["slow"], &options).await;
        assert_eq!(results[0].failure, Some(FailureKind::Timeout));

        let later = geocoder.geocode_address("1 Main St").await;
        assert!(later.is_success());
        assert_eq!(census.calls(), 2);
        assert_eq!(geocoder.circuit_state(Provider::Census), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_duplicates_hit_cache() {
        let census = Arc::new(MockProvider::new(Provider::Census));
        let geocoder = geocoder(census.clone()).with_cache(Arc::new(MemoryCacheStore::new()));

        let results = geocoder
            .geocode_batch(&["A", "A"], &BatchOptions::new(1, 1))
            .await;

        assert!(!results[0].cached);
        assert!(results[1].cached);
        assert_eq!(census.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let geocoder = geocoder(Arc::new(MockProvider::new(Provider::Census)));
        let results = geocoder
            .geocode_batch::<&str>(&[], &BatchOptions::default())
            .await;
        assert!(results.is_empty());
    }
}
