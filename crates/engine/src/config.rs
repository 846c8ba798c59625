//! Engine configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::Volatility;
use crate::errors::ConfigError;
use crate::registry::CircuitBreakerConfig;

/// Longest cache lifetime a config may ask for.
pub const MAX_TTL_SECS: u64 = 30 * 24 * 60 * 60;
/// Longest per-call timeout or request deadline a config may ask for.
pub const MAX_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// Cache lifetimes per volatility class, in seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TtlConfig {
    pub volatile_secs: u64,
    pub standard_secs: u64,
    pub stable_secs: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            volatile_secs: 5 * 60,
            standard_secs: 30 * 60,
            stable_secs: 60 * 60,
        }
    }
}

impl TtlConfig {
    pub fn for_volatility(&self, volatility: Volatility) -> Duration {
        let secs = match volatility {
            Volatility::Volatile => self.volatile_secs,
            Volatility::Standard => self.standard_secs,
            Volatility::Stable => self.stable_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Tunables for one engine instance.
///
/// Every field has a default, so a JSON config only needs the values it
/// overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Maximum number of entries held in the in-process cache tier.
    pub l1_capacity: usize,
    pub ttl: TtlConfig,
    pub per_call_timeout_ms: u64,
    /// Upper bound on a whole request, including collapsed waits.
    pub request_deadline_ms: u64,
    /// Provider calls one request may have in flight at once.
    pub max_calls_per_request: usize,
    /// Provider calls all requests together may have in flight at once.
    pub max_global_calls: usize,
    /// Maximum relative spread for numeric readings to count as agreeing.
    pub agreement_threshold: f64,
    pub single_source_penalty: f64,
    pub conflict_confidence: f64,
    pub max_recommendations: usize,
    /// Score category weights. Categories not listed weigh 1.0.
    pub category_weights: BTreeMap<String, f64>,
    /// Interval of the background expiry sweep. 0 disables it.
    pub sweep_interval_secs: u64,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 1024,
            ttl: TtlConfig::default(),
            per_call_timeout_ms: 10_000,
            request_deadline_ms: 30_000,
            max_calls_per_request: 8,
            max_global_calls: 64,
            agreement_threshold: 0.10,
            single_source_penalty: 0.3,
            conflict_confidence: 0.5,
            max_recommendations: 10,
            category_weights: BTreeMap::new(),
            sweep_interval_secs: 60,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.l1_capacity == 0 {
            return Err(ConfigError::Invalid("l1Capacity must be positive".into()));
        }
        if self.max_calls_per_request == 0 || self.max_global_calls == 0 {
            return Err(ConfigError::Invalid(
                "concurrency caps must be positive".into(),
            ));
        }
        for (name, secs) in [
            ("ttl.volatileSecs", self.ttl.volatile_secs),
            ("ttl.standardSecs", self.ttl.standard_secs),
            ("ttl.stableSecs", self.ttl.stable_secs),
        ] {
            if secs == 0 || secs > MAX_TTL_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within 1..={MAX_TTL_SECS}"
                )));
            }
        }
        for (name, ms) in [
            ("perCallTimeoutMs", self.per_call_timeout_ms),
            ("requestDeadlineMs", self.request_deadline_ms),
        ] {
            if ms == 0 || ms > MAX_TIMEOUT_MS {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within 1..={MAX_TIMEOUT_MS}"
                )));
            }
        }
        for (name, value) in [
            ("agreementThreshold", self.agreement_threshold),
            ("singleSourcePenalty", self.single_source_penalty),
            ("conflictConfidence", self.conflict_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} must be within [0, 1]")));
            }
        }
        if let Some((category, _)) = self
            .category_weights
            .iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "weight for category '{category}' must be a non-negative number"
            )));
        }
        Ok(())
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }

    /// Cap a caller-supplied deadline to the longest one a config may set.
    pub fn clamp_deadline(deadline: Duration) -> Duration {
        deadline.min(Duration::from_millis(MAX_TIMEOUT_MS))
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn category_weight(&self, category: &str) -> f64 {
        self.category_weights.get(category).copied().unwrap_or(1.0)
    }
}
