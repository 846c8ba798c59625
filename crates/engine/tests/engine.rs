//! End-to-end behaviour of the analysis engine against scripted providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use vantage_engine::errors::ProviderError;
use vantage_engine::models::{MetricSet, ProviderPayload, ProviderRequest};
use vantage_engine::{
    AnalysisEngine, AnalysisProvider, AnalyzeOptions, CacheTier, CancelHandle, EngineConfig,
    EngineRequest, InMemoryStore, ManualClock, MetricValue, ProviderDescriptor, RateQuota,
    RejectCode, SectionStatus,
};

struct ScriptedProvider {
    descriptor: ProviderDescriptor,
    delay: Duration,
    response: Result<MetricSet, ProviderError>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn ok(descriptor: ProviderDescriptor, metrics: &[(&str, f64)]) -> Self {
        Self {
            descriptor,
            delay: Duration::ZERO,
            response: Ok(metrics
                .iter()
                .map(|(k, v)| (k.to_string(), MetricValue::Number(*v)))
                .collect()),
            calls: AtomicUsize::new(0),
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisProvider for ScriptedProvider {
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

fn tokens_descriptor(name: &str) -> ProviderDescriptor {
    ProviderDescriptor::new(name, ["tokens"]).with_domains(["ethereum"])
}

fn tokens_provider(name: &str, count: f64) -> Arc<ScriptedProvider> {
    Arc::new(ScriptedProvider::ok(
        tokens_descriptor(name),
        &[("token_count", count), ("total_value_usd", 1500.0)],
    ))
}

fn tokens_request(subject: &str) -> EngineRequest {
    EngineRequest {
        subject: subject.to_string(),
        domain: "ethereum".to_string(),
        capabilities: vec!["tokens".to_string()],
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_leaves_single_source_section() {
    let p1 = tokens_provider("P1", 12.0);
    let p2 = Arc::new(
        ScriptedProvider::ok(tokens_descriptor("P2"), &[("token_count", 12.0)])
            .delayed(Duration::from_secs(20)),
    );
    let engine = AnalysisEngine::builder()
        .provider(p1)
        .provider(p2.clone())
        .build()
        .unwrap();

    let result = engine.analyze(tokens_request("0xABC123")).await.unwrap();

    let tokens = &result.sections["tokens"];
    assert_eq!(tokens.provenance, vec!["P1".to_string()]);
    assert!(tokens.confidence < 1.0);
    assert_eq!(result.metadata.providers_used, vec!["P1".to_string()]);
    assert!(!result.metadata.partial);

    let gap = &result.metadata.provider_gaps[0];
    assert_eq!(gap.provider, "P2");
    assert_eq!(gap.reason, "timeout");
    assert_eq!(p2.calls(), 1);
}

#[tokio::test]
async fn test_cache_ttl_window() {
    let clock = Arc::new(ManualClock::at_epoch());
    let store = Arc::new(InMemoryStore::new());
    let provider = tokens_provider("P1", 12.0);
    let engine = AnalysisEngine::builder()
        .provider(provider.clone())
        .persistent_store(store.clone())
        .clock(clock.clone())
        .build()
        .unwrap();

    // t=0: miss, populates both tiers
    let first = engine.analyze(tokens_request("0xABC123")).await.unwrap();
    assert!(!first.metadata.cache_hit);
    assert_eq!(provider.calls(), 1);
    assert_eq!(store.len(), 1);
    assert_eq!(engine.cache_stats().l1_entries, 1);

    // t=100: hit, no provider calls
    clock.advance(Duration::from_secs(100));
    let second = engine.analyze(tokens_request("0xABC123")).await.unwrap();
    assert!(second.metadata.cache_hit);
    assert_eq!(second.metadata.cache_tier, Some(CacheTier::Memory));
    assert_eq!(provider.calls(), 1);
    assert!(first.same_analysis(&second));

    // t=400: expired, fresh miss
    clock.advance(Duration::from_secs(300));
    let third = engine.analyze(tokens_request("0xABC123")).await.unwrap();
    assert!(!third.metadata.cache_hit);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_persistent_tier_serves_a_fresh_engine() {
    let clock = Arc::new(ManualClock::at_epoch());
    let store = Arc::new(InMemoryStore::new());
    let provider = tokens_provider("P1", 12.0);

    let build = || {
        AnalysisEngine::builder()
            .provider(provider.clone())
            .persistent_store(store.clone())
            .clock(clock.clone())
            .build()
            .unwrap()
    };

    let first = build().analyze(tokens_request("0xABC123")).await.unwrap();

    // a new engine has an empty L1 but shares the persistent tier
    let restarted = build();
    let second = restarted.analyze(tokens_request("0xABC123")).await.unwrap();
    assert!(second.metadata.cache_hit);
    assert_eq!(second.metadata.cache_tier, Some(CacheTier::Persistent));
    assert_eq!(provider.calls(), 1);
    assert!(first.same_analysis(&second));

    let third = restarted.analyze(tokens_request("0xABC123")).await.unwrap();
    assert_eq!(third.metadata.cache_tier, Some(CacheTier::Memory));
}

#[tokio::test]
async fn test_conflict_uses_more_reliable_provider() {
    let reliable = Arc::new(ScriptedProvider::ok(
        tokens_descriptor("P1").with_reliability("tokens", 90),
        &[("token_count", 100.0)],
    ));
    let shaky = Arc::new(ScriptedProvider::ok(
        tokens_descriptor("P2").with_reliability("tokens", 40),
        &[("token_count", 50.0)],
    ));
    let engine = AnalysisEngine::builder()
        .provider(shaky)
        .provider(reliable)
        .build()
        .unwrap();

    let result = engine.analyze(tokens_request("0xABC123")).await.unwrap();

    let metric = &result.sections["tokens"].data["token_count"];
    assert!(metric.conflicted);
    assert_eq!(metric.value, MetricValue::Number(100.0));
    assert_eq!(metric.provenance, vec!["P1".to_string()]);
    assert!(result.sections["tokens"].conflicted);

    let conflict = &result.metadata.conflicts[0];
    assert_eq!(conflict.metric, "token_count");
    assert_eq!(conflict.chosen, "P1");
    assert_eq!(conflict.readings.len(), 2);
}

#[tokio::test]
async fn test_partial_failure_lowers_confidence() {
    let two_sources = AnalysisEngine::builder()
        .provider(tokens_provider("A", 12.0))
        .provider(tokens_provider("B", 12.0))
        .build()
        .unwrap();
    let both = two_sources
        .analyze(tokens_request("0xABC123"))
        .await
        .unwrap();

    let failing = Arc::new(ScriptedProvider {
        descriptor: tokens_descriptor("B"),
        delay: Duration::ZERO,
        response: Err(ProviderError::Network {
            provider: "B".to_string(),
            message: "connection reset".to_string(),
        }),
        calls: AtomicUsize::new(0),
    });
    let one_source = AnalysisEngine::builder()
        .provider(tokens_provider("A", 12.0))
        .provider(failing)
        .build()
        .unwrap();
    let single = one_source
        .analyze(tokens_request("0xABC123"))
        .await
        .unwrap();

    assert_eq!(single.sections["tokens"].provenance, vec!["A".to_string()]);
    assert!(single.sections["tokens"].confidence < both.sections["tokens"].confidence);
    assert_eq!(both.sections["tokens"].provenance, vec!["A".to_string(), "B".to_string()]);
}

#[tokio::test]
async fn test_rate_limit_bounds_calls_per_window() {
    let clock = Arc::new(ManualClock::at_epoch());
    let limited = Arc::new(ScriptedProvider::ok(
        tokens_descriptor("LIMITED").with_quota(RateQuota::per_minute(3)),
        &[("token_count", 1.0)],
    ));
    let engine = AnalysisEngine::builder()
        .provider(limited.clone())
        .clock(clock.clone())
        .build()
        .unwrap();

    // distinct subjects so nothing is served from cache
    let requests = (0..10).map(|i| engine.analyze(tokens_request(&format!("0x{:x}", 0xA00 + i))));
    let results = join_all(requests).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(limited.calls(), 3);
    let limited_out = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .filter(|r| r.sections["tokens"].status == SectionStatus::Unavailable)
        .count();
    assert_eq!(limited_out, 7);

    // next window
    clock.advance(Duration::from_secs(61));
    engine.analyze(tokens_request("0xB00")).await.unwrap();
    assert_eq!(limited.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_identical_requests_share_one_fanout() {
    let provider = Arc::new(
        ScriptedProvider::ok(tokens_descriptor("P1"), &[("token_count", 7.0)])
            .delayed(Duration::from_millis(200)),
    );
    let engine = AnalysisEngine::builder()
        .provider(provider.clone())
        .build()
        .unwrap();

    let results = join_all((0..8).map(|_| engine.analyze(tokens_request("0xABC123")))).await;
    let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(provider.calls(), 1);
    assert_eq!(results.len(), 8);
    assert!(results.iter().all(|r| r.same_analysis(&results[0])));
    assert_eq!(results.iter().filter(|r| r.metadata.collapsed).count(), 7);
    assert_eq!(engine.cache_stats().collapsed, 7);
    assert_eq!(engine.cache_stats().in_flight, 0);
}

#[tokio::test]
async fn test_second_identical_request_makes_no_calls() {
    let provider = tokens_provider("P1", 12.0);
    let engine = AnalysisEngine::builder()
        .provider(provider.clone())
        .build()
        .unwrap();

    let first = engine.analyze(tokens_request("0xABC123")).await.unwrap();
    // surrounding whitespace does not change the cache key
    let second = engine.analyze(tokens_request(" 0xABC123 ")).await.unwrap();

    assert_eq!(provider.calls(), 1);
    assert!(second.metadata.cache_hit);
    assert!(first.same_analysis(&second));
    assert_eq!(first.overview, second.overview);
}

#[tokio::test]
async fn test_rejections_carry_codes() {
    let engine = AnalysisEngine::builder()
        .provider(tokens_provider("P1", 12.0))
        .build()
        .unwrap();

    let err = engine.analyze(tokens_request("")).await.unwrap_err();
    assert_eq!(err.code(), RejectCode::ValidationError);

    let err = engine
        .analyze(tokens_request("https://example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), RejectCode::ValidationError);

    let err = engine
        .analyze(EngineRequest {
            domain: "polygon".to_string(),
            ..tokens_request("0xABC123")
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), RejectCode::NoProvidersForCapability);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_returns_partial_result() {
    let slow = Arc::new(
        ScriptedProvider::ok(tokens_descriptor("SLOW"), &[("token_count", 1.0)])
            .delayed(Duration::from_secs(5)),
    );
    let engine = AnalysisEngine::builder()
        .provider(tokens_provider("FAST", 1.0))
        .provider(slow)
        .build()
        .unwrap();

    let cancel = CancelHandle::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let result = engine
        .analyze_with(
            tokens_request("0xABC123"),
            AnalyzeOptions::default().with_cancel(cancel),
        )
        .await
        .unwrap();

    assert!(result.metadata.partial);
    assert_eq!(result.metadata.providers_used, vec!["FAST".to_string()]);
    assert_eq!(engine.cache_stats().l1_entries, 0);
}

#[tokio::test]
async fn test_score_is_in_range_and_recommendations_ranked() {
    let web = Arc::new(ScriptedProvider::ok(
        ProviderDescriptor::new("WEB", ["performance", "seo"]).with_domains(["web"]),
        &[
            ("performance_score", 35.0),
            ("first_contentful_paint_ms", 3100.0),
            ("seo_score", 55.0),
        ],
    ));
    let engine = AnalysisEngine::builder()
        .provider(web)
        .config(EngineConfig {
            max_recommendations: 3,
            ..Default::default()
        })
        .build()
        .unwrap();

    let result = engine
        .analyze(EngineRequest {
            subject: "https://example.com/pricing".to_string(),
            domain: "web".to_string(),
            capabilities: vec!["seo".to_string(), "performance".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();

    let overall = result.score.overall.unwrap();
    assert!((0.0..=100.0).contains(&overall));
    assert_eq!(result.overview.capabilities, vec!["performance", "seo"]);
    assert!(!result.recommendations.is_empty());
    assert!(result.recommendations.len() <= 3);
    for (index, rec) in result.recommendations.iter().enumerate() {
        assert_eq!(rec.rank, index + 1);
    }
    assert!(result
        .recommendations
        .windows(2)
        .all(|pair| pair[0].priority >= pair[1].priority));
}
