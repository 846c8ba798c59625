//! Provider registry module.
//!
//! This module decides which providers take part in a fanout:
//! - Provider registration and eligibility per domain and capability
//! - Sliding-window rate limiting per provider
//! - Circuit breaking for fault tolerance
//! - Skip diagnostics for providers left out

mod circuit_breaker;
mod rate_limiter;
#[allow(clippy::module_inception)]
mod registry;
mod skip_reason;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitState};
pub use rate_limiter::RateLimiter;
pub use registry::{ProviderRegistry, ProviderSelection, ProviderStatus};
pub use skip_reason::{SelectionDiagnostics, SkipReason};
