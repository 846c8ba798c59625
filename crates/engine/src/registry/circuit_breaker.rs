//! Per-provider circuit breaker.
//!
//! - **Closed**: calls go through.
//! - **Open**: the provider failed repeatedly and is skipped.
//! - **HalfOpen**: the recovery timeout elapsed; calls go through to probe
//!   whether the provider is healthy again.
//!
//! Only failures classified as [`FailureClass::Penalize`] count.
//!
//! [`FailureClass::Penalize`]: crate::errors::FailureClass::Penalize

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    /// Consecutive penalized failures before the circuit opens.
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    /// Successes in HalfOpen needed to close the circuit.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            half_open_success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    failure_count: u32,
    half_open_successes: u32,
    last_failure_ms: Option<i64>,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            half_open_successes: 0,
            last_failure_ms: None,
        }
    }
}

/// Snapshot of one provider's circuit.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitMetrics {
    pub provider: String,
    pub state: CircuitState,
    pub failure_count: u32,
}

pub struct CircuitBreaker {
    circuits: HashMap<String, Mutex<Circuit>>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new<I>(providers: I, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            circuits: providers
                .into_iter()
                .map(|provider| (provider, Mutex::new(Circuit::new())))
                .collect(),
            config,
            clock,
        }
    }

    /// Lock one provider's circuit, recovering from poison if necessary.
    fn lock(&self, provider: &str) -> Option<MutexGuard<'_, Circuit>> {
        self.circuits.get(provider).map(|circuit| {
            circuit.lock().unwrap_or_else(|poisoned| {
                warn!("Circuit breaker for '{}' was poisoned, recovering", provider);
                poisoned.into_inner()
            })
        })
    }

    /// Whether calls to the provider are allowed.
    ///
    /// Moves an Open circuit to HalfOpen once the recovery timeout elapsed.
    pub fn is_allowed(&self, provider: &str) -> bool {
        let Some(mut circuit) = self.lock(provider) else {
            return true;
        };

        match circuit.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let now = self.clock.now_millis();
                let recovered = circuit.last_failure_ms.map_or(true, |at| {
                    now - at >= self.config.recovery_timeout_ms as i64
                });
                if recovered {
                    info!(
                        "Circuit breaker: transitioning '{}' from Open to HalfOpen",
                        provider
                    );
                    circuit.state = CircuitState::HalfOpen;
                    circuit.half_open_successes = 0;
                }
                recovered
            }
        }
    }

    pub fn record_success(&self, provider: &str) {
        let Some(mut circuit) = self.lock(provider) else {
            return;
        };

        match circuit.state {
            CircuitState::Closed => {
                circuit.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                circuit.half_open_successes += 1;
                debug!(
                    "Circuit breaker: success for '{}' in HalfOpen ({}/{})",
                    provider, circuit.half_open_successes, self.config.half_open_success_threshold
                );
                if circuit.half_open_successes >= self.config.half_open_success_threshold {
                    info!("Circuit breaker: closing circuit for '{}'", provider);
                    *circuit = Circuit::new();
                }
            }
            CircuitState::Open => {
                // a call dispatched before the circuit opened
                debug!(
                    "Circuit breaker: late success for '{}' while Open",
                    provider
                );
            }
        }
    }

    pub fn record_failure(&self, provider: &str) {
        let Some(mut circuit) = self.lock(provider) else {
            return;
        };

        circuit.failure_count += 1;
        circuit.last_failure_ms = Some(self.clock.now_millis());

        match circuit.state {
            CircuitState::Closed => {
                if circuit.failure_count >= self.config.failure_threshold {
                    info!(
                        "Circuit breaker: opening circuit for '{}' after {} failures",
                        provider, circuit.failure_count
                    );
                    circuit.state = CircuitState::Open;
                } else {
                    debug!(
                        "Circuit breaker: failure for '{}' ({}/{})",
                        provider, circuit.failure_count, self.config.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                info!(
                    "Circuit breaker: reopening circuit for '{}' after failure in HalfOpen",
                    provider
                );
                circuit.state = CircuitState::Open;
                circuit.half_open_successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self, provider: &str) -> CircuitState {
        self.lock(provider)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn reset(&self, provider: &str) {
        if let Some(mut circuit) = self.lock(provider) {
            info!("Circuit breaker: manually resetting circuit for '{}'", provider);
            *circuit = Circuit::new();
        }
    }

    pub fn metrics(&self) -> Vec<CircuitMetrics> {
        let mut metrics: Vec<_> = self
            .circuits
            .keys()
            .filter_map(|provider| {
                self.lock(provider).map(|circuit| CircuitMetrics {
                    provider: provider.clone(),
                    state: circuit.state,
                    failure_count: circuit.failure_count,
                })
            })
            .collect();
        metrics.sort_by(|a, b| a.provider.cmp(&b.provider));
        metrics
    }
}
