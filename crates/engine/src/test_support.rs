//! Fixtures shared by unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::ProviderError;
use crate::models::{
    AnalysisRequest, AnalysisResult, Depth, EngineRequest, MetricSet, MetricValue, Overview,
    ProviderPayload, ProviderRequest, ResultMetadata, ScoreBlock,
};
use crate::provider::{AnalysisProvider, ProviderDescriptor};

pub(crate) fn sample_result(subject: &str) -> AnalysisResult {
    AnalysisResult {
        overview: Overview {
            subject: subject.to_string(),
            domain: "ethereum".to_string(),
            depth: Depth::Basic,
            timeframe: None,
            capabilities: vec!["tokens".to_string()],
            generated_at: DateTime::<Utc>::UNIX_EPOCH,
            confidence: 0.0,
            sections_available: 0,
            sections_unavailable: 1,
        },
        sections: BTreeMap::new(),
        score: ScoreBlock::default(),
        recommendations: Vec::new(),
        metadata: ResultMetadata::default(),
    }
}

pub(crate) fn request(subject: &str, domain: &str, capabilities: &[&str]) -> AnalysisRequest {
    AnalysisRequest::validate(
        EngineRequest {
            subject: subject.to_string(),
            domain: domain.to_string(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        },
        None,
    )
    .expect("valid test request")
}

/// Provider answering every capability with fixed metrics (or a fixed
/// error) after an optional delay.
pub(crate) struct MockProvider {
    descriptor: ProviderDescriptor,
    delay: Duration,
    response: Result<MetricSet, ProviderError>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub(crate) fn ok(descriptor: ProviderDescriptor, metrics: &[(&str, MetricValue)]) -> Self {
        Self {
            descriptor,
            delay: Duration::ZERO,
            response: Ok(metrics
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(descriptor: ProviderDescriptor, error: ProviderError) -> Self {
        Self {
            descriptor,
            delay: Duration::ZERO,
            response: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisProvider for MockProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn fetch(&self, _request: &ProviderRequest<'_>) -> Result<ProviderPayload, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.response.clone().map(ProviderPayload::from)
    }
}
