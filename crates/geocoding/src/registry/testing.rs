//! Scriptable provider for registry tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::RateLimitConfig;
use crate::models::{FailureKind, GeocodeResult, Precision, Provider};
use crate::provider::GeocodingProvider;

pub const LAT: f64 = 39.9526;
pub const LON: f64 = -75.1652;

#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    Locate { lat: f64, lon: f64, confidence: f64 },
    Fail(FailureKind),
}

impl Behavior {
    pub fn located() -> Self {
        Self::Locate {
            lat: LAT,
            lon: LON,
            confidence: 0.9,
        }
    }
}

pub struct MockProvider {
    id: Provider,
    default: Behavior,
    script: Mutex<VecDeque<Behavior>>,
    delays: HashMap<String, Duration>,
    delay: Duration,
    daily_quota: Option<u32>,
    rate_limit: RateLimitConfig,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProvider {
    pub fn new(id: Provider) -> Self {
        Self {
            id,
            default: Behavior::located(),
            script: Mutex::new(VecDeque::new()),
            delays: HashMap::new(),
            delay: Duration::ZERO,
            daily_quota: None,
            rate_limit: RateLimitConfig {
                refill_per_second: 10_000.0,
                burst_capacity: 10_000.0,
            },
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing(id: Provider, kind: FailureKind) -> Self {
        Self {
            default: Behavior::Fail(kind),
            ..Self::new(id)
        }
    }

    /// Answer the next call with `behavior`, then fall back to the default.
    pub fn then(self, behavior: Behavior) -> Self {
        self.script.lock().unwrap().push_back(behavior);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_delay_for(mut self, address: &str, delay: Duration) -> Self {
        self.delays.insert(address.to_string(), delay);
        self
    }

    pub fn with_daily_quota(mut self, daily_quota: u32) -> Self {
        self.daily_quota = Some(daily_quota);
        self
    }

    pub fn with_rate_limit(mut self, refill_per_second: f64, burst_capacity: f64) -> Self {
        self.rate_limit = RateLimitConfig {
            refill_per_second,
            burst_capacity,
        };
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeocodingProvider for MockProvider {
    fn id(&self) -> Provider {
        self.id
    }

    fn rate_limit(&self) -> RateLimitConfig {
        self.rate_limit.clone()
    }

    fn daily_quota(&self) -> Option<u32> {
        self.daily_quota
    }

    async fn geocode(&self, address: &str, _timeout: Duration) -> GeocodeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let delay = self.delays.get(address).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match behavior {
            Behavior::Locate {
                lat,
                lon,
                confidence,
            } => GeocodeResult::located(self.id, lat, lon, confidence, Precision::Rooftop)
                .with_formatted_address(Some(address.to_string())),
            Behavior::Fail(kind) => GeocodeResult::failed(self.id, kind, format!("{:?}", kind)),
        }
    }
}
