//! Capability catalog.
//!
//! Static description of what each capability is expected to deliver: the
//! canonical metrics (with the depth at which each becomes expected), how
//! volatile the data is (which drives cache TTL), which score category it
//! feeds and how each metric maps onto a 0-100 scale. The catalog also knows
//! which kind of subject each domain takes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::models::{Depth, MetricKey};

/// The kind of subject a domain analyses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    /// URLs and hostnames.
    Web,
    /// Chain addresses.
    Chain,
}

/// How quickly a capability's data goes stale.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Volatility {
    /// Live counts and balances.
    Volatile,
    #[default]
    Standard,
    /// Structural or contract metadata.
    Stable,
}

/// Maps a raw metric onto the 0-100 score scale.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricScale {
    /// `min` scores 0, `max` scores 100.
    Linear { min: f64, max: f64 },
    /// `min` scores 100, `max` scores 0 (lower is better).
    Inverse { min: f64, max: f64 },
    /// 100 when the flag equals `good`, 0 otherwise.
    Flag { good: bool },
}

/// An expected metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSpec {
    pub key: MetricKey,
    #[serde(default)]
    pub min_depth: Depth,
    #[serde(default)]
    pub scale: Option<MetricScale>,
}

impl MetricSpec {
    pub fn new(key: &str, min_depth: Depth, scale: Option<MetricScale>) -> Self {
        Self {
            key: key.to_string(),
            min_depth,
            scale,
        }
    }
}

/// Description of a single capability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySpec {
    /// Score category this capability feeds.
    pub category: String,
    #[serde(default)]
    pub volatility: Volatility,
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
}

impl CapabilitySpec {
    /// Metric keys expected at the given depth, in catalog order.
    pub fn expected_metrics(&self, depth: Depth) -> Vec<MetricKey> {
        self.metrics
            .iter()
            .filter(|m| m.min_depth <= depth)
            .map(|m| m.key.clone())
            .collect()
    }

    pub fn metric(&self, key: &str) -> Option<&MetricSpec> {
        self.metrics.iter().find(|m| m.key == key)
    }
}

/// The full catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityCatalog {
    #[serde(default)]
    pub domains: BTreeMap<String, SubjectKind>,
    #[serde(default)]
    pub capabilities: BTreeMap<String, CapabilitySpec>,
}

impl CapabilityCatalog {
    /// An empty catalog: every domain accepts any subject format and every
    /// capability's expected metrics are whatever providers report.
    pub fn empty() -> Self {
        Self {
            domains: BTreeMap::new(),
            capabilities: BTreeMap::new(),
        }
    }

    /// Load a catalog from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let catalog: Self = serde_json::from_str(raw)?;
        catalog.check()?;
        Ok(catalog)
    }

    fn check(&self) -> Result<(), ConfigError> {
        for (name, spec) in &self.capabilities {
            for metric in &spec.metrics {
                if let Some(MetricScale::Linear { min, max } | MetricScale::Inverse { min, max }) =
                    metric.scale
                {
                    if !(max > min) {
                        return Err(ConfigError::Invalid(format!(
                            "{}.{}: scale max must be greater than min",
                            name, metric.key
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn subject_kind(&self, domain: &str) -> Option<SubjectKind> {
        self.domains.get(domain).copied()
    }

    pub fn capability(&self, name: &str) -> Option<&CapabilitySpec> {
        self.capabilities.get(name)
    }

    pub fn volatility(&self, capability: &str) -> Volatility {
        self.capability(capability)
            .map(|c| c.volatility)
            .unwrap_or_default()
    }
}

impl Default for CapabilityCatalog {
    /// The built-in catalog for the web and chain analyses the dashboard offers.
    fn default() -> Self {
        use Depth::{Basic, Comprehensive, Detailed};
        use MetricScale::{Flag, Inverse, Linear};

        let mut domains = BTreeMap::new();
        domains.insert("web".to_string(), SubjectKind::Web);
        for chain in [
            "ethereum", "polygon", "arbitrum", "optimism", "base", "bsc", "solana", "bitcoin",
        ] {
            domains.insert(chain.to_string(), SubjectKind::Chain);
        }

        let spec = |category: &str, volatility: Volatility, metrics: Vec<MetricSpec>| {
            CapabilitySpec {
                category: category.to_string(),
                volatility,
                metrics,
            }
        };

        let mut capabilities = BTreeMap::new();
        capabilities.insert(
            "performance".to_string(),
            spec(
                "performance",
                Volatility::Standard,
                vec![
                    MetricSpec::new("performance_score", Basic, Some(Linear { min: 0.0, max: 100.0 })),
                    MetricSpec::new("first_contentful_paint_ms", Basic, Some(Inverse { min: 1000.0, max: 4000.0 })),
                    MetricSpec::new("largest_contentful_paint_ms", Detailed, Some(Inverse { min: 2500.0, max: 6000.0 })),
                    MetricSpec::new("cumulative_layout_shift", Detailed, Some(Inverse { min: 0.1, max: 0.5 })),
                    MetricSpec::new("time_to_interactive_ms", Comprehensive, Some(Inverse { min: 3800.0, max: 12000.0 })),
                ],
            ),
        );
        capabilities.insert(
            "seo".to_string(),
            spec(
                "seo",
                Volatility::Standard,
                vec![
                    MetricSpec::new("seo_score", Basic, Some(Linear { min: 0.0, max: 100.0 })),
                    MetricSpec::new("has_meta_description", Basic, Some(Flag { good: true })),
                    MetricSpec::new("has_sitemap", Detailed, Some(Flag { good: true })),
                    MetricSpec::new("title_length", Detailed, None),
                    MetricSpec::new("indexed_pages", Comprehensive, None),
                ],
            ),
        );
        capabilities.insert(
            "links".to_string(),
            spec(
                "links",
                Volatility::Standard,
                vec![
                    MetricSpec::new("backlinks", Basic, Some(Linear { min: 0.0, max: 10000.0 })),
                    MetricSpec::new("referring_domains", Basic, Some(Linear { min: 0.0, max: 1000.0 })),
                    MetricSpec::new("broken_links", Detailed, Some(Inverse { min: 0.0, max: 50.0 })),
                ],
            ),
        );
        capabilities.insert(
            "content".to_string(),
            spec(
                "content",
                Volatility::Stable,
                vec![
                    MetricSpec::new("word_count", Basic, Some(Linear { min: 300.0, max: 2000.0 })),
                    MetricSpec::new("readability_score", Basic, Some(Linear { min: 0.0, max: 100.0 })),
                    MetricSpec::new("duplicate_content_ratio", Detailed, Some(Inverse { min: 0.0, max: 0.5 })),
                ],
            ),
        );
        capabilities.insert(
            "ai".to_string(),
            spec(
                "ai",
                Volatility::Standard,
                vec![
                    MetricSpec::new("ai_visibility_score", Basic, Some(Linear { min: 0.0, max: 100.0 })),
                    MetricSpec::new("entity_coverage", Detailed, Some(Linear { min: 0.0, max: 1.0 })),
                ],
            ),
        );
        capabilities.insert(
            "tokens".to_string(),
            spec(
                "portfolio",
                Volatility::Volatile,
                vec![
                    MetricSpec::new("token_count", Basic, None),
                    MetricSpec::new("total_value_usd", Basic, None),
                    MetricSpec::new("spam_token_ratio", Detailed, Some(Inverse { min: 0.0, max: 1.0 })),
                ],
            ),
        );
        capabilities.insert(
            "transactions".to_string(),
            spec(
                "activity",
                Volatility::Volatile,
                vec![
                    MetricSpec::new("tx_count_30d", Basic, Some(Linear { min: 0.0, max: 1000.0 })),
                    MetricSpec::new("failed_tx_ratio", Detailed, Some(Inverse { min: 0.0, max: 0.5 })),
                    MetricSpec::new("avg_gas_used", Detailed, None),
                ],
            ),
        );
        capabilities.insert(
            "contract".to_string(),
            spec(
                "security",
                Volatility::Stable,
                vec![
                    MetricSpec::new("is_verified", Basic, Some(Flag { good: true })),
                    MetricSpec::new("is_proxy", Detailed, None),
                    MetricSpec::new("contract_age_days", Detailed, Some(Linear { min: 0.0, max: 365.0 })),
                    MetricSpec::new("audit_count", Comprehensive, Some(Linear { min: 0.0, max: 3.0 })),
                ],
            ),
        );

        Self {
            domains,
            capabilities,
        }
    }
}
