//! Vantage Analysis Engine
//!
//! Multi-provider analysis orchestration: given a subject (a URL, hostname or
//! chain address) and a set of requested capabilities, the engine fans out to
//! independent external data providers, tolerates partial provider failure,
//! respects per-provider rate limits, caches results at two tiers and merges
//! the provider payloads into one canonical, scored result.
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |  EngineRequest   | --> |   validation     |  (AnalysisRequest)
//! +------------------+     +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |  CacheManager    |  (L1 memory, L2 persistent,
//!                          +------------------+   request collapsing)
//!                                  | miss
//!                                  v
//!                          +------------------+
//!                          | ProviderRegistry |  (credentials, circuit,
//!                          +------------------+   rate limiter)
//!                                  |
//!                                  v
//!                          +------------------+
//!                          | FanoutExecutor   |  (bounded, settle-all)
//!                          +------------------+
//!                                  |
//!                                  v
//!                         +--------------------+
//!                         |ResponseConsolidator|  (provenance, conflicts)
//!                         +--------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          | Score + Recs     |  (pure, deterministic)
//!                          +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`AnalysisEngine`] - The entry point, built once with [`AnalysisEngineBuilder`]
//! - [`AnalysisProvider`] - Adapter trait, one implementation per data source
//! - [`PersistentStore`] - Persistent cache tier collaborator
//! - [`Telemetry`] - Fire-and-forget event sink
//! - [`AnalysisResult`] - The result contract

pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod consolidate;
pub mod engine;
pub mod errors;
pub mod fanout;
pub mod models;
pub mod provider;
pub mod registry;
pub mod scoring;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use engine::{AnalysisEngine, AnalysisEngineBuilder, AnalyzeOptions};

// Re-export the request/result contract
pub use models::{
    AnalysisRequest, AnalysisResult, CacheTier, ConsolidatedMetric, Depth, EngineRequest,
    MetricValue, ProviderPayload, ProviderRequest, Recommendation, ScoreBlock, Section,
    SectionStatus,
};

// Re-export collaborator seams
pub use cache::{CacheEntry, CacheKey, CacheStats, InMemoryStore, PersistentStore};
pub use catalog::CapabilityCatalog;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use errors::{CacheBackendError, ConfigError, EngineError, ProviderError, RejectCode};
pub use fanout::CancelHandle;
pub use provider::{AnalysisProvider, HttpJsonProvider, ProviderDescriptor, RateQuota};
pub use telemetry::{LogTelemetry, Telemetry, TelemetryEvent};
