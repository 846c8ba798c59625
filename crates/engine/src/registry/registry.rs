//! Provider registry.
//!
//! Holds the provider adapters registered at process start and decides,
//! per request, which of them are eligible:
//! - capability and domain match
//! - credentials present
//! - circuit breaker not open
//! - rate-limit quota left

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use log::debug;
use serde::Serialize;

use super::{
    CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitState, RateLimiter,
    SelectionDiagnostics, SkipReason,
};
use crate::clock::Clock;
use crate::errors::{ConfigError, FailureClass, ProviderError};
use crate::provider::{AnalysisProvider, ProviderDescriptor, DEFAULT_RELIABILITY};

/// Eligible providers for one request, plus the ones that were skipped.
pub struct ProviderSelection {
    pub eligible: Vec<Arc<dyn AnalysisProvider>>,
    pub diagnostics: SelectionDiagnostics,
}

/// Provider descriptor plus live state, as reported to operators.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    #[serde(flatten)]
    pub descriptor: ProviderDescriptor,
    pub available: bool,
    pub circuit: CircuitState,
    /// Consecutive penalized failures counted by the circuit breaker.
    pub failure_count: u32,
    /// `None` for providers without a quota.
    pub remaining_quota: Option<u32>,
}

pub struct ProviderRegistry {
    /// Sorted by provider id.
    providers: Vec<Arc<dyn AnalysisProvider>>,
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
}

impl ProviderRegistry {
    pub fn new(
        providers: Vec<Arc<dyn AnalysisProvider>>,
        circuit_config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for provider in &providers {
            if !seen.insert(provider.id().to_string()) {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' registered twice",
                    provider.id()
                )));
            }
            if let Some(quota) = provider.descriptor().quota {
                if quota.calls == 0 || quota.window_ms == 0 {
                    return Err(ConfigError::Invalid(format!(
                        "quota of provider '{}' needs positive calls and window",
                        provider.id()
                    )));
                }
            }
        }

        let mut providers = providers;
        providers.sort_by(|a, b| a.id().cmp(b.id()));

        let rate_limiter = RateLimiter::new(
            providers
                .iter()
                .filter_map(|p| p.descriptor().quota.map(|quota| (p.id().to_string(), quota))),
            clock.clone(),
        );
        let circuit_breaker = CircuitBreaker::new(
            providers.iter().map(|p| p.id().to_string()),
            circuit_config,
            clock,
        );

        Ok(Self {
            providers,
            rate_limiter,
            circuit_breaker,
        })
    }

    pub fn providers(&self) -> &[Arc<dyn AnalysisProvider>] {
        &self.providers
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn AnalysisProvider>> {
        self.providers.iter().find(|p| p.id() == id)
    }

    /// Whether any provider is registered for the domain and capability,
    /// regardless of credentials, circuit state or quota.
    pub fn registered_for(&self, domain: &str, capability: &str) -> bool {
        self.providers.iter().any(|p| {
            let descriptor = p.descriptor();
            descriptor.serves_domain(domain) && descriptor.supports(capability)
        })
    }

    /// Providers that can serve at least one of the capabilities right now.
    ///
    /// Exclusions are soft: each skipped provider is recorded with its
    /// reason. Quota is only peeked here; it is consumed per call at
    /// dispatch.
    pub fn available_providers(
        &self,
        domain: &str,
        capabilities: &BTreeSet<String>,
    ) -> ProviderSelection {
        let mut eligible = Vec::new();
        let mut diagnostics = SelectionDiagnostics::default();

        for provider in &self.providers {
            let descriptor = provider.descriptor();
            if !descriptor.serves_domain(domain)
                || !capabilities.iter().any(|c| descriptor.supports(c))
            {
                continue;
            }

            let id: Cow<'static, str> = Cow::Owned(provider.id().to_string());
            if !provider.is_available() {
                diagnostics.record_skip(id, SkipReason::MissingCredentials);
            } else if !self.circuit_breaker.is_allowed(provider.id()) {
                diagnostics.record_skip(id, SkipReason::CircuitOpen);
            } else if !self.rate_limiter.has_quota(provider.id()) {
                diagnostics.record_skip(id, SkipReason::RateLimited);
            } else {
                eligible.push(provider.clone());
            }
        }

        if !diagnostics.is_empty() {
            debug!("Provider selection for '{}': {}", domain, diagnostics.summary());
        }

        ProviderSelection {
            eligible,
            diagnostics,
        }
    }

    /// Consume one unit of the provider's quota.
    pub fn try_acquire(&self, provider: &str) -> bool {
        self.rate_limiter.try_acquire(provider)
    }

    /// Feed a call outcome into the circuit breaker.
    pub fn record_outcome<T>(&self, provider: &str, outcome: &Result<T, ProviderError>) {
        match outcome {
            Ok(_) => self.circuit_breaker.record_success(provider),
            Err(e) => match e.failure_class() {
                FailureClass::Penalize => self.circuit_breaker.record_failure(provider),
                FailureClass::Neutral => {}
            },
        }
    }

    pub fn reliability(&self, provider: &str, capability: &str) -> u8 {
        self.get(provider)
            .map(|p| p.descriptor().reliability_for(capability))
            .unwrap_or(DEFAULT_RELIABILITY)
    }

    pub fn statuses(&self) -> Vec<ProviderStatus> {
        let circuits: HashMap<String, CircuitMetrics> = self
            .circuit_breaker
            .metrics()
            .into_iter()
            .map(|m| (m.provider.clone(), m))
            .collect();

        self.providers
            .iter()
            .map(|p| {
                let circuit = circuits.get(p.id());
                ProviderStatus {
                    descriptor: p.descriptor().clone(),
                    available: p.is_available(),
                    circuit: circuit.map_or(CircuitState::Closed, |m| m.state),
                    failure_count: circuit.map_or(0, |m| m.failure_count),
                    remaining_quota: self.rate_limiter.remaining(p.id()),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{MetricSet, ProviderPayload, ProviderRequest};
    use crate::provider::RateQuota;

    struct StaticProvider {
        descriptor: ProviderDescriptor,
    }

    #[async_trait]
    impl AnalysisProvider for StaticProvider {
        fn descriptor(&self) -> &ProviderDescriptor {
            &self.descriptor
        }

        async fn fetch(
            &self,
            _request: &ProviderRequest<'_>,
        ) -> Result<ProviderPayload, ProviderError> {
            Ok(ProviderPayload::from(MetricSet::new()))
        }
    }

    fn provider(descriptor: ProviderDescriptor) -> Arc<dyn AnalysisProvider> {
        Arc::new(StaticProvider { descriptor })
    }

    fn registry(providers: Vec<Arc<dyn AnalysisProvider>>) -> ProviderRegistry {
        ProviderRegistry::new(
            providers,
            CircuitBreakerConfig {
                failure_threshold: 1,
                ..Default::default()
            },
            Arc::new(ManualClock::at_epoch()),
        )
        .unwrap()
    }

    fn caps(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_selection_filters_domain_and_capability() {
        let registry = registry(vec![
            provider(ProviderDescriptor::new("SCAN", ["tokens"]).with_domains(["ethereum"])),
            provider(ProviderDescriptor::new("SEO", ["seo"]).with_domains(["web"])),
            provider(ProviderDescriptor::new("ANY", ["tokens", "seo"])),
        ]);

        let selection = registry.available_providers("ethereum", &caps(&["tokens"]));
        let ids: Vec<_> = selection.eligible.iter().map(|p| p.id().to_string()).collect();
        assert_eq!(ids, vec!["ANY", "SCAN"]);
        assert!(selection.diagnostics.is_empty());

        assert!(registry.registered_for("web", "seo"));
        // ANY has no domain restriction
        assert!(registry.registered_for("web", "tokens"));
        assert!(!registry.registered_for("solana", "contract"));
    }

    #[test]
    fn test_soft_exclusions_are_recorded() {
        let registry = registry(vec![
            provider(ProviderDescriptor::new("NOKEY", ["tokens"]).with_credentials(false)),
            provider(ProviderDescriptor::new("BROKEN", ["tokens"])),
            provider(
                ProviderDescriptor::new("BUSY", ["tokens"])
                    .with_quota(RateQuota::new(1, Duration::from_secs(60))),
            ),
            provider(ProviderDescriptor::new("OK", ["tokens"])),
        ]);

        registry.record_outcome::<()>(
            "BROKEN",
            &Err(ProviderError::Timeout {
                provider: "BROKEN".to_string(),
            }),
        );
        assert!(registry.try_acquire("BUSY"));

        let selection = registry.available_providers("ethereum", &caps(&["tokens"]));
        let ids: Vec<_> = selection.eligible.iter().map(|p| p.id().to_string()).collect();
        assert_eq!(ids, vec!["OK"]);

        let reasons: Vec<_> = selection
            .diagnostics
            .skipped
            .iter()
            .map(|(id, reason)| (id.to_string(), reason.clone()))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("BROKEN".to_string(), SkipReason::CircuitOpen),
                ("BUSY".to_string(), SkipReason::RateLimited),
                ("NOKEY".to_string(), SkipReason::MissingCredentials),
            ]
        );

        // skipped providers still count as registered
        assert!(registry.registered_for("ethereum", "tokens"));
    }

    #[test]
    fn test_neutral_failures_do_not_trip_circuit() {
        let registry = registry(vec![provider(ProviderDescriptor::new("P1", ["tokens"]))]);
        registry.record_outcome::<()>(
            "P1",
            &Err(ProviderError::Cancelled {
                provider: "P1".to_string(),
            }),
        );
        let status = &registry.statuses()[0];
        assert_eq!(status.circuit, CircuitState::Closed);
        assert_eq!(status.failure_count, 0);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = ProviderRegistry::new(
            vec![
                provider(ProviderDescriptor::new("P1", ["tokens"])),
                provider(ProviderDescriptor::new("P1", ["seo"])),
            ],
            CircuitBreakerConfig::default(),
            Arc::new(ManualClock::at_epoch()),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_provider_without_quota_is_unlimited() {
        let registry = registry(vec![provider(ProviderDescriptor::new("FREE", ["tokens"]))]);

        for _ in 0..1_000 {
            assert!(registry.try_acquire("FREE"));
        }
        let selection = registry.available_providers("ethereum", &caps(&["tokens"]));
        assert_eq!(selection.eligible.len(), 1);
        assert!(selection.diagnostics.is_empty());

        let status = &registry.statuses()[0];
        assert_eq!(status.remaining_quota, None);
        let json = serde_json::to_value(status).unwrap();
        assert!(json.get("quota").is_none());
    }

    #[test]
    fn test_empty_quota_rejected() {
        let result = ProviderRegistry::new(
            vec![provider(
                ProviderDescriptor::new("P1", ["tokens"]).with_quota(RateQuota::per_minute(0)),
            )],
            CircuitBreakerConfig::default(),
            Arc::new(ManualClock::at_epoch()),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_statuses() {
        let registry = registry(vec![provider(
            ProviderDescriptor::new("P1", ["tokens"]).with_quota(RateQuota::per_minute(5)),
        )]);
        registry.try_acquire("P1");

        let statuses = registry.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].remaining_quota, Some(4));
        assert_eq!(statuses[0].circuit, CircuitState::Closed);

        registry.record_outcome::<()>(
            "P1",
            &Err(ProviderError::Timeout {
                provider: "P1".to_string(),
            }),
        );
        let statuses = registry.statuses();
        assert_eq!(statuses[0].circuit, CircuitState::Open);
        assert_eq!(statuses[0].failure_count, 1);

        let json = serde_json::to_value(&statuses[0]).unwrap();
        assert_eq!(json["name"], "P1");
        assert_eq!(json["remainingQuota"], 4);
        assert_eq!(json["failureCount"], 1);
    }
}
