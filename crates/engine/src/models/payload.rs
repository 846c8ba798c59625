//! Raw provider payloads.
//!
//! Every provider response shape is a distinct variant of [`ProviderPayload`].
//! Normalization into canonical metrics happens here, next to the shape, so
//! the consolidator only ever sees a [`MetricSet`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::metric::{MetricSet, MetricValue};
use super::types::MetricKey;

/// A raw JSON document plus the adapter's mapping from canonical metric keys
/// to JSON pointers (RFC 6901) into that document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonPayload {
    pub document: serde_json::Value,
    pub pointers: BTreeMap<MetricKey, String>,
}

impl JsonPayload {
    fn normalize(&self) -> MetricSet {
        self.pointers
            .iter()
            .filter_map(|(key, pointer)| {
                self.document
                    .pointer(pointer)
                    .and_then(MetricValue::from_json)
                    .map(|value| (key.clone(), value))
            })
            .collect()
    }
}

/// Tagged raw response from a provider adapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProviderPayload {
    /// The adapter already produced canonical metrics.
    Metrics { metrics: MetricSet },

    /// A raw JSON response with a pointer mapping.
    Json(JsonPayload),
}

impl ProviderPayload {
    /// Normalize into canonical metrics.
    ///
    /// Metrics whose value is `Unavailable` are dropped: an adapter saying
    /// "no data" is the same as not reporting the metric.
    pub fn metrics(&self) -> MetricSet {
        let mut metrics = match self {
            Self::Metrics { metrics } => metrics.clone(),
            Self::Json(payload) => payload.normalize(),
        };
        metrics.retain(|_, value| value.is_available());
        metrics
    }
}

impl From<MetricSet> for ProviderPayload {
    fn from(metrics: MetricSet) -> Self {
        Self::Metrics { metrics }
    }
}
