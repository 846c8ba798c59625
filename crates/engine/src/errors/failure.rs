/// Classification of a provider failure.
///
/// Used to decide whether a failed call counts against the provider's
/// circuit breaker. Either way the failure stays soft: it is recorded as a
/// provider gap and never aborts sibling calls.
///
/// # Behavior Summary
///
/// | Class | Recorded as gap? | Record Circuit Breaker Failure? |
/// |-------|------------------|--------------------------------|
/// | `Penalize` | Yes | Yes (affects future requests) |
/// | `Neutral` | Yes | No |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureClass {
    /// Transient or provider-side failure: timeout, HTTP 429, bad payload,
    /// transport error. After enough of these the circuit opens and the
    /// provider is temporarily excluded from selection.
    Penalize,

    /// The provider was never really exercised (no credentials, unsupported
    /// capability, cancelled by the caller). No penalty is recorded.
    Neutral,
}
