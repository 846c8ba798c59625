//! Error types and failure classification for the analysis engine.
//!
//! This module provides:
//! - [`EngineError`]: The only errors a caller of the engine ever sees (rejected requests)
//! - [`ValidationError`]: Why a request failed format validation
//! - [`ProviderError`]: Typed failures returned by provider adapters (always soft)
//! - [`FailureClass`]: Classification for circuit breaker bookkeeping
//! - [`CacheBackendError`] and [`TelemetryError`]: collaborator failures that are
//!   logged and swallowed by the engine

mod failure;

pub use failure::FailureClass;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable code attached to a rejected request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectCode {
    ValidationError,
    NoProvidersForCapability,
}

impl RejectCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NoProvidersForCapability => "NO_PROVIDERS_FOR_CAPABILITY",
        }
    }
}

impl std::fmt::Display for RejectCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal errors that reject an analysis request.
///
/// Everything else that can go wrong during an analysis (provider failures,
/// timeouts, cache backend errors) degrades into lower confidence on the
/// result instead of surfacing here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The request failed format validation.
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// Not a single registered provider serves the domain for any of the
    /// requested capabilities.
    #[error("No providers registered for domain '{domain}' and capabilities {capabilities:?}")]
    NoProvidersForCapability {
        domain: String,
        capabilities: Vec<String>,
    },
}

impl EngineError {
    /// Returns the machine-readable code for this rejection.
    pub fn code(&self) -> RejectCode {
        match self {
            Self::Validation(_) => RejectCode::ValidationError,
            Self::NoProvidersForCapability { .. } => RejectCode::NoProvidersForCapability,
        }
    }
}

/// Request validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Subject must not be empty")]
    EmptySubject,

    #[error("Subject '{subject}' is not a valid identifier for domain '{domain}'")]
    MalformedSubject { subject: String, domain: String },

    #[error("Domain must not be empty")]
    EmptyDomain,

    #[error("At least one capability must be requested")]
    NoCapabilities,

    #[error("Capability name '{0}' is malformed")]
    MalformedCapability(String),

    #[error("Unknown depth '{0}', expected basic, detailed or comprehensive")]
    UnknownDepth(String),

    #[error("Timeframe '{0}' is malformed, expected e.g. 24h, 7d, 12w, 6m, 1y or all")]
    MalformedTimeframe(String),
}

/// Typed failures returned by provider adapters.
///
/// None of these reach the caller: the fanout executor records them in a
/// `ProviderCallResult` and the result metadata lists them as provider gaps.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Provider cannot serve the request right now (missing credentials,
    /// unauthorized, disabled).
    #[error("Provider unavailable: {provider} - {reason}")]
    Unavailable { provider: String, reason: String },

    /// Local quota exhausted or the provider answered HTTP 429.
    #[error("Rate limited: {provider}")]
    RateLimited { provider: String },

    /// The call did not complete within the per-call timeout.
    #[error("Timeout: {provider}")]
    Timeout { provider: String },

    /// The provider answered, but the response was unusable.
    #[error("Bad response from {provider}: {message}")]
    BadResponse { provider: String, message: String },

    /// Transport-level failure.
    #[error("Network error from {provider}: {message}")]
    Network { provider: String, message: String },

    /// The provider does not implement the requested capability.
    #[error("{provider} does not support capability '{capability}'")]
    Unsupported { provider: String, capability: String },

    /// The request was cancelled or hit its deadline before this call finished.
    #[error("Cancelled: {provider}")]
    Cancelled { provider: String },
}

impl ProviderError {
    /// Returns the failure classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use vantage_engine::errors::{FailureClass, ProviderError};
    ///
    /// let error = ProviderError::Timeout { provider: "P1".to_string() };
    /// assert_eq!(error.failure_class(), FailureClass::Penalize);
    ///
    /// let error = ProviderError::Cancelled { provider: "P1".to_string() };
    /// assert_eq!(error.failure_class(), FailureClass::Neutral);
    /// ```
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout { .. }
            | Self::BadResponse { .. }
            | Self::Network { .. } => FailureClass::Penalize,

            Self::Unavailable { .. } | Self::Unsupported { .. } | Self::Cancelled { .. } => {
                FailureClass::Neutral
            }
        }
    }

    /// Short machine-readable kind used in result metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "unavailable",
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout { .. } => "timeout",
            Self::BadResponse { .. } => "bad_response",
            Self::Network { .. } => "network",
            Self::Unsupported { .. } => "unsupported",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let provider = err
            .url()
            .and_then(|u| u.host_str())
            .unwrap_or("unknown")
            .to_string();
        if err.is_timeout() {
            ProviderError::Timeout { provider }
        } else if err.is_decode() {
            ProviderError::BadResponse {
                provider,
                message: err.to_string(),
            }
        } else {
            ProviderError::Network {
                provider,
                message: err.to_string(),
            }
        }
    }
}

/// Errors from the persistent cache tier. Logged, then treated as a miss.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheBackendError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Cache backend query failed: {0}")]
    Query(String),

    #[error("Cached payload could not be (de)serialized: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CacheBackendError {
    fn from(err: serde_json::Error) -> Self {
        CacheBackendError::Serialization(err.to_string())
    }
}

/// Telemetry sink failure. Never propagated to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Telemetry sink failed: {0}")]
pub struct TelemetryError(pub String);

/// Configuration loading errors (catalog, provider definitions).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}
