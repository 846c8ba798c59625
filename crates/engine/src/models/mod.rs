//! Analysis data models
//!
//! - `types` - Type aliases for common identifiers (ProviderId, Capability, MetricKey, Domain)
//! - `request` - Wire request (EngineRequest), validated request (AnalysisRequest), Depth
//! - `metric` - Canonical metric values and sets
//! - `payload` - Tagged raw provider payloads and their normalization
//! - `result` - The result contract (sections, score block, metadata)
//! - `recommendation` - Ranked recommendations

mod metric;
mod payload;
mod recommendation;
mod request;
mod result;
mod types;

pub use metric::{MetricSet, MetricValue};
pub use payload::{JsonPayload, ProviderPayload};
pub use recommendation::{Effort, Impact, Recommendation};
pub use request::{AnalysisRequest, Depth, EngineRequest, ProviderRequest};
pub use result::{
    AnalysisResult, CacheTier, ConflictReading, ConsolidatedMetric, MetricConflict, Overview,
    ProviderGap, ResultMetadata, ScoreBlock, Section, SectionStatus,
};
pub use types::{Capability, Domain, MetricKey, ProviderId};
