//! The engine's result contract.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metric::MetricValue;
use super::recommendation::Recommendation;
use super::request::Depth;
use super::types::{Capability, MetricKey};

/// One consolidated metric inside a section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedMetric {
    pub value: MetricValue,
    pub confidence: f64,
    pub provenance: Vec<String>,
    #[serde(default)]
    pub conflicted: bool,
}

impl ConsolidatedMetric {
    pub fn unavailable() -> Self {
        Self {
            value: MetricValue::Unavailable,
            confidence: 0.0,
            provenance: Vec::new(),
            conflicted: false,
        }
    }
}

/// How much of a section could be filled.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionStatus {
    Available,
    Partial,
    Unavailable,
}

/// Consolidated data for one requested capability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub status: SectionStatus,
    pub data: BTreeMap<MetricKey, ConsolidatedMetric>,
    pub confidence: f64,
    /// Providers that contributed at least one metric, sorted.
    pub provenance: Vec<String>,
    pub conflicted: bool,
    /// Expected metrics no provider reported.
    pub missing: Vec<MetricKey>,
}

impl Section {
    /// A section nobody could serve.
    pub fn unavailable(missing: Vec<MetricKey>) -> Self {
        Self {
            status: SectionStatus::Unavailable,
            data: missing
                .iter()
                .map(|key| (key.clone(), ConsolidatedMetric::unavailable()))
                .collect(),
            confidence: 0.0,
            provenance: Vec::new(),
            conflicted: false,
            missing,
        }
    }
}

/// Derived scores. `overall` is `None` when no category could be scored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBlock {
    pub overall: Option<f64>,
    pub categories: BTreeMap<String, f64>,
}

/// Summary of the analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub subject: String,
    pub domain: String,
    pub depth: Depth,
    pub timeframe: Option<String>,
    pub capabilities: Vec<Capability>,
    pub generated_at: DateTime<Utc>,
    /// Mean section confidence.
    pub confidence: f64,
    pub sections_available: usize,
    pub sections_unavailable: usize,
}

/// Which cache tier served a result.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    #[default]
    Memory,
    Persistent,
}

/// A provider that did not contribute to a capability, and why.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderGap {
    pub provider: String,
    /// `None` when the provider was skipped before any capability was tried.
    pub capability: Option<Capability>,
    pub reason: String,
    pub detail: Option<String>,
}

/// One provider's reading in a conflicted metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReading {
    pub provider: String,
    pub value: MetricValue,
    pub reliability: u8,
}

/// A metric where providers disagreed beyond the agreement threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricConflict {
    pub capability: Capability,
    pub metric: MetricKey,
    pub chosen: String,
    pub readings: Vec<ConflictReading>,
}

/// Request bookkeeping. Unlike the rest of the result this legitimately
/// differs between a fresh computation and a cache hit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub providers_used: Vec<String>,
    pub provider_gaps: Vec<ProviderGap>,
    pub cache_hit: bool,
    pub cache_tier: Option<CacheTier>,
    /// This request waited on another identical request's fanout.
    pub collapsed: bool,
    /// The fanout was cut short by cancellation or deadline.
    pub partial: bool,
    pub conflicts: Vec<MetricConflict>,
    pub processing_time_ms: u64,
}

/// The complete result of an analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub overview: Overview,
    pub sections: BTreeMap<Capability, Section>,
    pub score: ScoreBlock,
    pub recommendations: Vec<Recommendation>,
    pub metadata: ResultMetadata,
}

impl AnalysisResult {
    /// Compare everything except request bookkeeping.
    pub fn same_analysis(&self, other: &AnalysisResult) -> bool {
        self.overview == other.overview
            && self.sections == other.sections
            && self.score == other.score
            && self.recommendations == other.recommendations
    }
}
