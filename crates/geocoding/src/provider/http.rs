//! Shared HTTP plumbing for the provider adapters.

use std::time::Instant;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::models::{FailureKind, GeocodeResult, Provider};

/// A failed provider call, before it is turned into a result.
#[derive(Debug)]
pub(crate) struct CallFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl CallFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self::new(FailureKind::EmptyResult, message)
    }

    pub fn into_result(self, provider: Provider) -> GeocodeResult {
        GeocodeResult::failed(provider, self.kind, self.message)
    }
}

/// The URL is dropped from the error first; its query can carry an API key.
fn transport_failure(provider: Provider, error: reqwest::Error) -> CallFailure {
    let error = error.without_url();
    if error.is_timeout() {
        CallFailure::new(FailureKind::Timeout, "request timed out")
    } else {
        warn!("{} request failed: {}", provider, error);
        CallFailure::new(FailureKind::Network, format!("request failed: {}", error))
    }
}

/// Send a request and decode a JSON body.
///
/// Maps every failure mode to a [`FailureKind`]: transport errors to
/// `Network`/`Timeout`, 429 to `Throttled`, other non-2xx statuses to
/// `HttpStatus`, and undecodable bodies to `Malformed`.
pub(crate) async fn get_json<T: DeserializeOwned>(
    provider: Provider,
    request: RequestBuilder,
) -> Result<T, CallFailure> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_failure(provider, e))?;

    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(CallFailure::new(
            FailureKind::Throttled,
            format!("{} answered 429 Too Many Requests", provider),
        ));
    }

    if !status.is_success() {
        return Err(CallFailure::new(
            FailureKind::HttpStatus(status.as_u16()),
            format!("HTTP {}", status),
        ));
    }

    let body = response
        .text()
        .await
        .map_err(|e| transport_failure(provider, e))?;

    serde_json::from_str(&body).map_err(|e| {
        warn!("{} returned an unreadable body: {}", provider, e);
        CallFailure::new(FailureKind::Malformed, format!("failed to parse response: {}", e))
    })
}

/// Run an adapter body and stamp the elapsed time on whatever it produced.
pub(crate) async fn timed<F>(provider: Provider, call: F) -> GeocodeResult
where
    F: std::future::Future<Output = Result<GeocodeResult, CallFailure>>,
{
    let started = Instant::now();
    let result = match call.await {
        Ok(result) => result,
        Err(failure) => {
            debug!("{} geocode failed: {}", provider, failure.message);
            failure.into_result(provider)
        }
    };
    result.with_response_time(started.elapsed().as_secs_f64() * 1000.0)
}
