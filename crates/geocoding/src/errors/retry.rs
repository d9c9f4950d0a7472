/// Classification for retry policy.
///
/// Used by the geocoder to decide what to do after a provider call fails.
///
/// # Behavior Summary
///
/// | Class | Retry Same Provider? | Try Next Provider? | Circuit Breaker |
/// |-------|----------------------|--------------------|-----------------|
/// | `WithBackoff` | Yes, up to `max_retries` | Yes, once retries run out | Failure per attempt |
/// | `FailoverWithPenalty` | No | Yes | Failure |
/// | `NextProvider` | No | Yes | Empty-result counter only |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Transient transport error (timeout, connection failure, 5xx).
    ///
    /// The same provider is retried with exponential backoff, and every
    /// failed attempt counts toward opening its circuit.
    WithBackoff,

    /// The provider refused the request (429, other 4xx).
    ///
    /// Retrying right away would be refused again, so the geocoder moves
    /// on, recording a circuit breaker failure.
    FailoverWithPenalty,

    /// The provider worked but had nothing useful for this address.
    ///
    /// Not a malfunction: only the breaker's separate empty-result counter
    /// is incremented.
    NextProvider,
}
