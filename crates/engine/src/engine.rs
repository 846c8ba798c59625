//! The analysis engine.
//!
//! Ties the pieces together:
//! validate → cache lookup → (leader) select providers → fan out →
//! consolidate → score → recommend → write through.
//!
//! One instance is built at process start with [`AnalysisEngineBuilder`] and
//! shared by cloning; clones share the cache, the registry state and the
//! global concurrency ceiling.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cache::{CacheKey, CacheLookup, CacheManager, CacheStats, PersistentStore, Role};
use crate::catalog::CapabilityCatalog;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::consolidate::{ConsolidationPolicy, ResponseConsolidator};
use crate::errors::{ConfigError, EngineError};
use crate::fanout::{CancelHandle, FanoutExecutor, FanoutOutcome};
use crate::models::{
    AnalysisRequest, AnalysisResult, EngineRequest, Overview, ResultMetadata, SectionStatus,
};
use crate::provider::AnalysisProvider;
use crate::registry::{ProviderRegistry, ProviderStatus, SelectionDiagnostics};
use crate::scoring::{RecommendationGenerator, RecommendationRule, ScoreEngine};
use crate::telemetry::{emit, LogTelemetry, Telemetry, TelemetryEvent};

/// Per-request knobs.
#[derive(Clone, Debug, Default)]
pub struct AnalyzeOptions {
    /// Overrides the configured request deadline.
    pub deadline: Option<Duration>,
    pub cancel: Option<CancelHandle>,
}

impl AnalyzeOptions {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

struct EngineInner {
    config: EngineConfig,
    catalog: CapabilityCatalog,
    registry: ProviderRegistry,
    executor: FanoutExecutor,
    recommendations: RecommendationGenerator,
    telemetry: Arc<dyn Telemetry>,
    clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct AnalysisEngine {
    inner: Arc<EngineInner>,
    cache: Arc<CacheManager>,
}

impl AnalysisEngine {
    pub fn builder() -> AnalysisEngineBuilder {
        AnalysisEngineBuilder::default()
    }

    pub async fn analyze(&self, request: EngineRequest) -> Result<AnalysisResult, EngineError> {
        self.analyze_with(request, AnalyzeOptions::default()).await
    }

    /// Run one analysis.
    ///
    /// Only the two rejection cases surface as errors; provider failures,
    /// timeouts, cancellation and cache backend trouble all come back as a
    /// result with lower confidence.
    pub async fn analyze_with(
        &self,
        request: EngineRequest,
        options: AnalyzeOptions,
    ) -> Result<AnalysisResult, EngineError> {
        let started = Instant::now();
        let request = match self.admit(request) {
            Ok(request) => request,
            Err(e) => {
                debug!("Rejected analysis request: {}", e);
                self.emit(TelemetryEvent::RequestRejected {
                    code: e.code(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let key = CacheKey::for_request(&request);
        let ttl = self.ttl_for(&request);
        let budget = options
            .deadline
            .map(EngineConfig::clamp_deadline)
            .unwrap_or_else(|| self.inner.config.request_deadline());
        let deadline = started + budget;

        let inner = Arc::clone(&self.inner);
        let leader_request = request.clone();
        let leader_cancel = options.cancel.clone();
        let lookup = self
            .cache
            .get_or_compute(&key, ttl, move || {
                async move {
                    inner
                        .compute(&leader_request, deadline, leader_cancel.as_ref())
                        .await
                }
                .boxed()
            })
            .await;

        let result = match lookup {
            CacheLookup::Hit { entry } => {
                self.emit(TelemetryEvent::CacheHit {
                    key: key.to_string(),
                    tier: entry.tier,
                });
                let mut result = entry.result;
                result.metadata.cache_hit = true;
                result.metadata.cache_tier = Some(entry.tier);
                result.metadata.collapsed = false;
                result
            }
            CacheLookup::Pending { computation, role } => {
                let shared = match role {
                    Role::Leader => {
                        self.emit(TelemetryEvent::CacheMiss {
                            key: key.to_string(),
                        });
                        computation.await
                    }
                    Role::Follower => {
                        self.emit(TelemetryEvent::RequestCollapsed {
                            key: key.to_string(),
                        });
                        match tokio::time::timeout_at(deadline, computation).await {
                            Ok(shared) => shared,
                            Err(_) => {
                                info!("Collapsed wait on {} hit its deadline", key);
                                let mut result = self.inner.assemble(
                                    &request,
                                    &FanoutOutcome {
                                        results: Vec::new(),
                                        truncated: true,
                                    },
                                    &SelectionDiagnostics::default(),
                                );
                                result.metadata.collapsed = true;
                                return Ok(self.finish(&key, result, started));
                            }
                        }
                    }
                };

                match shared {
                    Some(result) => {
                        let mut result = (*result).clone();
                        result.metadata.collapsed = role == Role::Follower;
                        result
                    }
                    None => {
                        warn!("Shared computation for {} failed, computing inline", key);
                        self.inner
                            .compute(&request, deadline, options.cancel.as_ref())
                            .await
                    }
                }
            }
        };

        Ok(self.finish(&key, result, started))
    }

    fn finish(&self, key: &CacheKey, mut result: AnalysisResult, started: Instant) -> AnalysisResult {
        result.metadata.processing_time_ms = started.elapsed().as_millis() as u64;
        self.emit(TelemetryEvent::AnalysisCompleted {
            key: key.to_string(),
            confidence: result.overview.confidence,
            partial: result.metadata.partial,
            processing_time_ms: result.metadata.processing_time_ms,
        });
        result
    }

    /// Validate the request and apply the fatal no-provider check.
    fn admit(&self, request: EngineRequest) -> Result<AnalysisRequest, EngineError> {
        let domain = request.domain.trim().to_ascii_lowercase();
        let subject_kind = self.inner.catalog.subject_kind(&domain);
        let request = AnalysisRequest::validate(request, subject_kind)?;

        let unserved: Vec<String> = request
            .capabilities()
            .iter()
            .filter(|c| !self.inner.registry.registered_for(request.domain(), c))
            .cloned()
            .collect();

        if unserved.len() == request.capabilities().len() {
            return Err(EngineError::NoProvidersForCapability {
                domain: request.domain().to_string(),
                capabilities: unserved,
            });
        }
        if !unserved.is_empty() {
            debug!(
                "No providers for {:?} on '{}', sections will be unavailable",
                unserved,
                request.domain()
            );
        }
        Ok(request)
    }

    /// Shortest TTL among the requested capabilities.
    fn ttl_for(&self, request: &AnalysisRequest) -> Duration {
        let ttl = &self.inner.config.ttl;
        request
            .capabilities()
            .iter()
            .map(|c| ttl.for_volatility(self.inner.catalog.volatility(c)))
            .min()
            .unwrap_or_else(|| ttl.for_volatility(Default::default()))
    }

    fn emit(&self, event: TelemetryEvent) {
        emit(self.inner.telemetry.as_ref(), event);
    }

    /// Registered providers with their live circuit and quota state.
    pub fn providers(&self) -> Vec<ProviderStatus> {
        self.inner.registry.statuses()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn catalog(&self) -> &CapabilityCatalog {
        &self.inner.catalog
    }

    /// Start the periodic expiry sweep, unless disabled in the config.
    pub fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        self.inner
            .config
            .sweep_interval()
            .map(|interval| self.cache.spawn_sweeper(interval))
    }
}

impl EngineInner {
    async fn compute(
        &self,
        request: &AnalysisRequest,
        deadline: Instant,
        cancel: Option<&CancelHandle>,
    ) -> AnalysisResult {
        let selection = self
            .registry
            .available_providers(request.domain(), request.capabilities());
        for (provider, reason) in &selection.diagnostics.skipped {
            emit(
                self.telemetry.as_ref(),
                TelemetryEvent::ProviderSkipped {
                    provider: provider.to_string(),
                    reason: reason.as_str().to_string(),
                },
            );
        }

        let plan = FanoutExecutor::plan(&selection.eligible, request.capabilities());
        debug!(
            "Fanning out {} calls to {} providers for '{}'",
            plan.len(),
            selection.eligible.len(),
            request.subject()
        );
        let outcome = self
            .executor
            .execute(&self.registry, request, plan, deadline, cancel)
            .await;

        for call in &outcome.results {
            emit(
                self.telemetry.as_ref(),
                TelemetryEvent::ProviderCall {
                    provider: call.provider.clone(),
                    capability: call.capability.clone(),
                    outcome: call.outcome_label().to_string(),
                    latency_ms: call.latency.as_millis() as u64,
                },
            );
        }

        self.assemble(request, &outcome, &selection.diagnostics)
    }

    /// Consolidate call results and derive scores and recommendations.
    fn assemble(
        &self,
        request: &AnalysisRequest,
        outcome: &FanoutOutcome,
        diagnostics: &SelectionDiagnostics,
    ) -> AnalysisResult {
        let consolidated = ResponseConsolidator::new(
            &self.catalog,
            ConsolidationPolicy::from(&self.config),
        )
        .consolidate(request, &outcome.results, |provider, capability| {
            self.registry.reliability(provider, capability)
        });

        let score = ScoreEngine::new(&self.catalog, &self.config.category_weights)
            .score(&consolidated.sections);
        let recommendations = self.recommendations.generate(&consolidated.sections, &score);

        let sections_unavailable = consolidated
            .sections
            .values()
            .filter(|s| s.status == SectionStatus::Unavailable)
            .count();
        let confidence = consolidated.confidence();

        let mut provider_gaps = diagnostics.gaps();
        provider_gaps.extend(consolidated.gaps);

        AnalysisResult {
            overview: Overview {
                subject: request.subject().to_string(),
                domain: request.domain().to_string(),
                depth: request.depth(),
                timeframe: request.timeframe().map(str::to_string),
                capabilities: request.capabilities().iter().cloned().collect(),
                generated_at: self.clock.now(),
                confidence,
                sections_available: consolidated.sections.len() - sections_unavailable,
                sections_unavailable,
            },
            sections: consolidated.sections,
            score,
            recommendations,
            metadata: ResultMetadata {
                providers_used: consolidated.providers_used,
                provider_gaps,
                partial: outcome.truncated,
                conflicts: consolidated.conflicts,
                ..Default::default()
            },
        }
    }
}

/// Builds an [`AnalysisEngine`].
pub struct AnalysisEngineBuilder {
    config: EngineConfig,
    catalog: CapabilityCatalog,
    providers: Vec<Arc<dyn AnalysisProvider>>,
    store: Option<Arc<dyn PersistentStore>>,
    telemetry: Arc<dyn Telemetry>,
    clock: Arc<dyn Clock>,
    rules: Option<Vec<RecommendationRule>>,
}

impl Default for AnalysisEngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            catalog: CapabilityCatalog::default(),
            providers: Vec::new(),
            store: None,
            telemetry: Arc::new(LogTelemetry),
            clock: Arc::new(SystemClock),
            rules: None,
        }
    }
}

impl AnalysisEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn catalog(mut self, catalog: CapabilityCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn AnalysisProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn providers<I>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn AnalysisProvider>>,
    {
        self.providers.extend(providers);
        self
    }

    /// Persistent (L2) cache tier. Without one only L1 is used.
    pub fn persistent_store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the built-in recommendation rule table.
    pub fn rules(mut self, rules: Vec<RecommendationRule>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn build(self) -> Result<AnalysisEngine, ConfigError> {
        self.config.validate()?;

        let recommendations = match self.rules {
            Some(rules) => RecommendationGenerator::new(rules, self.config.max_recommendations)?,
            None => RecommendationGenerator::with_default_rules(self.config.max_recommendations),
        };
        let registry = ProviderRegistry::new(
            self.providers,
            self.config.circuit_breaker.clone(),
            self.clock.clone(),
        )?;
        let executor = FanoutExecutor::new(
            self.config.max_global_calls,
            self.config.max_calls_per_request,
            self.config.per_call_timeout(),
        );
        let cache = Arc::new(CacheManager::new(
            self.config.l1_capacity,
            self.store,
            self.clock.clone(),
        ));

        info!(
            "Analysis engine ready with {} providers",
            registry.providers().len()
        );

        Ok(AnalysisEngine {
            inner: Arc::new(EngineInner {
                config: self.config,
                catalog: self.catalog,
                registry,
                executor,
                recommendations,
                telemetry: self.telemetry,
                clock: self.clock,
            }),
            cache,
        })
    }
}
