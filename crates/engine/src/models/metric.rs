use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::MetricKey;

/// A canonical metric value.
///
/// `Unavailable` is the explicit "no data" marker. It is distinct from a
/// measured `Number(0.0)` and is never scored or averaged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum MetricValue {
    Number(f64),
    Flag(bool),
    Text(String),
    Unavailable,
}

impl MetricValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }

    /// Convert a JSON scalar into a metric value. Non-finite numbers, nulls,
    /// arrays and objects are not metric values.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n
                .as_f64()
                .filter(|f| f.is_finite())
                .map(MetricValue::Number),
            serde_json::Value::Bool(b) => Some(MetricValue::Flag(*b)),
            serde_json::Value::String(s) => Some(MetricValue::Text(s.clone())),
            _ => None,
        }
    }
}

/// Canonical metrics produced by normalizing one provider payload.
///
/// Ordered by key so iteration is deterministic.
pub type MetricSet = BTreeMap<MetricKey, MetricValue>;
