use serde::{Deserialize, Serialize};

/// Expected impact of acting on a recommendation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Impact {
    pub fn weight(&self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 2.0,
            Self::High => 3.0,
        }
    }
}

/// Effort needed to implement a recommendation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    Low,
    Medium,
    High,
}

impl Effort {
    pub fn weight(&self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 2.0,
            Self::High => 3.0,
        }
    }
}

/// A ranked, actionable recommendation derived from a consolidated result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Identifier of the rule that produced this recommendation.
    pub id: String,
    pub title: String,
    pub category: String,
    /// 1-based position in the final, sorted list.
    pub rank: usize,
    pub impact: Impact,
    pub effort: Effort,
    pub likelihood: f64,
    /// `impact weight × likelihood / effort weight`
    pub priority: f64,
    pub steps: Vec<String>,
}
