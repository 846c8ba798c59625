//! Bounded-concurrency fanout.
//!
//! One call per (eligible provider, requested capability it supports). Calls
//! settle independently: every call ends as a [`ProviderCallResult`], never
//! as an error of the whole fanout. Concurrency is capped per request and by
//! an engine-wide semaphore shared by all requests.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use log::{debug, warn};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use super::call_result::ProviderCallResult;
use super::cancel::CancelHandle;
use crate::errors::ProviderError;
use crate::models::{AnalysisRequest, Capability, ProviderPayload, ProviderRequest};
use crate::provider::AnalysisProvider;
use crate::registry::ProviderRegistry;

/// A single planned provider call.
#[derive(Clone)]
pub struct PlannedCall {
    pub provider: Arc<dyn AnalysisProvider>,
    pub capability: Capability,
}

/// All call results of one fanout.
#[derive(Clone, Debug, Default)]
pub struct FanoutOutcome {
    pub results: Vec<ProviderCallResult>,
    /// Cancellation or the deadline cut the fanout short.
    pub truncated: bool,
}

pub struct FanoutExecutor {
    global: Arc<Semaphore>,
    per_request: usize,
    per_call_timeout: Duration,
}

impl FanoutExecutor {
    pub fn new(max_global_calls: usize, max_calls_per_request: usize, per_call_timeout: Duration) -> Self {
        Self {
            global: Arc::new(Semaphore::new(max_global_calls.max(1))),
            per_request: max_calls_per_request.max(1),
            per_call_timeout,
        }
    }

    /// Calls for every eligible provider and every requested capability it
    /// supports, ordered by capability then provider id.
    pub fn plan(
        eligible: &[Arc<dyn AnalysisProvider>],
        capabilities: &BTreeSet<Capability>,
    ) -> Vec<PlannedCall> {
        let mut calls = Vec::new();
        for capability in capabilities {
            for provider in eligible {
                if provider.descriptor().supports(capability) {
                    calls.push(PlannedCall {
                        provider: provider.clone(),
                        capability: capability.clone(),
                    });
                }
            }
        }
        calls
    }

    /// Run the planned calls until all settle, the deadline passes, or the
    /// request is cancelled. Calls still outstanding at that point are
    /// dropped and reported as `Cancelled`.
    pub async fn execute(
        &self,
        registry: &ProviderRegistry,
        request: &AnalysisRequest,
        plan: Vec<PlannedCall>,
        deadline: Instant,
        cancel: Option<&CancelHandle>,
    ) -> FanoutOutcome {
        let labels: Vec<(String, Capability)> = plan
            .iter()
            .map(|call| (call.provider.id().to_string(), call.capability.clone()))
            .collect();
        let mut settled = vec![false; plan.len()];
        let mut results = Vec::with_capacity(plan.len());

        let calls = stream::iter(plan.into_iter().enumerate())
            .map(|(index, call)| async move { (index, self.dispatch(registry, request, call).await) })
            .buffer_unordered(self.per_request);
        tokio::pin!(calls);

        let expired = tokio::time::sleep_until(deadline);
        tokio::pin!(expired);
        let cancelled = async {
            match cancel {
                Some(handle) => handle.cancelled().await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(cancelled);

        let mut truncated = false;
        loop {
            tokio::select! {
                biased;
                _ = &mut cancelled => {
                    debug!("Fanout cancelled with {} of {} calls settled", results.len(), labels.len());
                    truncated = true;
                    break;
                }
                _ = &mut expired => {
                    debug!("Fanout deadline hit with {} of {} calls settled", results.len(), labels.len());
                    truncated = true;
                    break;
                }
                next = calls.next() => match next {
                    Some((index, result)) => {
                        settled[index] = true;
                        results.push(result);
                    }
                    None => break,
                },
            }
        }

        if truncated {
            for (index, (provider, capability)) in labels.into_iter().enumerate() {
                if !settled[index] {
                    results.push(ProviderCallResult {
                        outcome: Err(ProviderError::Cancelled {
                            provider: provider.clone(),
                        }),
                        provider,
                        capability,
                        latency: Duration::ZERO,
                    });
                }
            }
        }

        FanoutOutcome { results, truncated }
    }

    async fn dispatch(
        &self,
        registry: &ProviderRegistry,
        request: &AnalysisRequest,
        call: PlannedCall,
    ) -> ProviderCallResult {
        let started = Instant::now();
        let provider_id = call.provider.id().to_string();
        let settle = |outcome: Result<ProviderPayload, ProviderError>| ProviderCallResult {
            provider: provider_id.clone(),
            capability: call.capability.clone(),
            outcome,
            latency: started.elapsed(),
        };

        let _permit = match self.global.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Global call semaphore closed, dropping call to '{}'", provider_id);
                return settle(
                    Err(ProviderError::Cancelled {
                        provider: provider_id.clone(),
                    }),
                );
            }
        };

        // quota is consumed right before dispatch; a denied call never reaches the network
        if !registry.try_acquire(&provider_id) {
            return settle(
                Err(ProviderError::RateLimited {
                    provider: provider_id.clone(),
                }),
            );
        }

        let provider_request = ProviderRequest {
            request,
            capability: &call.capability,
        };
        let outcome = match tokio::time::timeout(
            self.per_call_timeout,
            call.provider.fetch(&provider_request),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderError::Timeout {
                provider: provider_id.clone(),
            }),
        };

        registry.record_outcome(&provider_id, &outcome);
        let result = settle(outcome);
        debug!(
            "{} / {} -> {} in {:?}",
            result.provider,
            result.capability,
            result.outcome_label(),
            result.latency
        );
        result
    }

    pub fn available_permits(&self) -> usize {
        self.global.available_permits()
    }
}
