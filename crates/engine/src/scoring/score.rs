//! Deterministic scoring.
//!
//! Catalog metrics that declare a [`MetricScale`] are mapped onto 0-100. A
//! category sub-score is the mean of its scored metrics; the overall score is
//! the weighted mean of the categories that could be scored at all.

use std::collections::BTreeMap;

use crate::catalog::{CapabilityCatalog, MetricScale};
use crate::models::{Capability, MetricValue, ScoreBlock, Section};

/// Map a metric value onto [0, 100].
///
/// Returns `None` when the value cannot be scored on this scale (wrong kind,
/// unavailable, non-finite).
pub fn scale_value(scale: &MetricScale, value: &MetricValue) -> Option<f64> {
    let score = match (scale, value) {
        (MetricScale::Linear { min, max }, MetricValue::Number(v)) if v.is_finite() => {
            (v - min) / (max - min) * 100.0
        }
        (MetricScale::Inverse { min, max }, MetricValue::Number(v)) if v.is_finite() => {
            (max - v) / (max - min) * 100.0
        }
        (MetricScale::Flag { good }, MetricValue::Flag(flag)) => {
            if flag == good {
                100.0
            } else {
                0.0
            }
        }
        _ => return None,
    };
    Some(score.clamp(0.0, 100.0))
}

pub struct ScoreEngine<'a> {
    catalog: &'a CapabilityCatalog,
    weights: &'a BTreeMap<String, f64>,
}

impl<'a> ScoreEngine<'a> {
    pub fn new(catalog: &'a CapabilityCatalog, weights: &'a BTreeMap<String, f64>) -> Self {
        Self { catalog, weights }
    }

    fn weight(&self, category: &str) -> f64 {
        self.weights.get(category).copied().unwrap_or(1.0)
    }

    pub fn score(&self, sections: &BTreeMap<Capability, Section>) -> ScoreBlock {
        let mut scored: BTreeMap<String, Vec<f64>> = BTreeMap::new();

        for (capability, section) in sections {
            let Some(spec) = self.catalog.capability(capability) else {
                continue;
            };
            for metric in &spec.metrics {
                let Some(scale) = &metric.scale else {
                    continue;
                };
                let value = section.data.get(&metric.key).map(|m| &m.value);
                if let Some(score) = value.and_then(|v| scale_value(scale, v)) {
                    scored.entry(spec.category.clone()).or_default().push(score);
                }
            }
        }

        let categories: BTreeMap<String, f64> = scored
            .into_iter()
            .map(|(category, scores)| {
                let mean = scores.iter().sum::<f64>() / scores.len() as f64;
                (category, mean.clamp(0.0, 100.0))
            })
            .collect();

        ScoreBlock {
            overall: self.overall(&categories),
            categories,
        }
    }

    /// Weighted mean renormalized over the categories present. Absent when
    /// nothing was scored or every present category weighs zero.
    fn overall(&self, categories: &BTreeMap<String, f64>) -> Option<f64> {
        let mut weighted = 0.0;
        let mut total = 0.0;
        for (category, score) in categories {
            let weight = self.weight(category);
            weighted += score * weight;
            total += weight;
        }
        (total > 0.0).then(|| (weighted / total).clamp(0.0, 100.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConsolidatedMetric, SectionStatus};

    fn section(metrics: &[(&str, MetricValue)]) -> Section {
        Section {
            status: SectionStatus::Available,
            data: metrics
                .iter()
                .map(|(key, value)| {
                    (
                        key.to_string(),
                        ConsolidatedMetric {
                            value: value.clone(),
                            confidence: 0.7,
                            provenance: vec!["P1".to_string()],
                            conflicted: false,
                        },
                    )
                })
                .collect(),
            confidence: 0.7,
            provenance: vec!["P1".to_string()],
            conflicted: false,
            missing: Vec::new(),
        }
    }

    #[test]
    fn test_scale_value() {
        let linear = MetricScale::Linear { min: 0.0, max: 100.0 };
        assert_eq!(scale_value(&linear, &MetricValue::Number(42.0)), Some(42.0));
        assert_eq!(scale_value(&linear, &MetricValue::Number(250.0)), Some(100.0));
        assert_eq!(scale_value(&linear, &MetricValue::Number(-5.0)), Some(0.0));
        assert_eq!(scale_value(&linear, &MetricValue::Unavailable), None);
        assert_eq!(scale_value(&linear, &MetricValue::Number(f64::NAN)), None);

        let inverse = MetricScale::Inverse { min: 1000.0, max: 4000.0 };
        assert_eq!(scale_value(&inverse, &MetricValue::Number(1000.0)), Some(100.0));
        assert_eq!(scale_value(&inverse, &MetricValue::Number(2500.0)), Some(50.0));

        let flag = MetricScale::Flag { good: true };
        assert_eq!(scale_value(&flag, &MetricValue::Flag(true)), Some(100.0));
        assert_eq!(scale_value(&flag, &MetricValue::Flag(false)), Some(0.0));
        assert_eq!(scale_value(&flag, &MetricValue::Number(1.0)), None);
    }

    #[test]
    fn test_category_mean_and_overall() {
        let catalog = CapabilityCatalog::default();
        let weights = BTreeMap::new();
        let engine = ScoreEngine::new(&catalog, &weights);

        let sections = BTreeMap::from([
            (
                "performance".to_string(),
                section(&[
                    ("performance_score", MetricValue::Number(80.0)),
                    ("first_contentful_paint_ms", MetricValue::Number(2500.0)),
                ]),
            ),
            (
                "seo".to_string(),
                section(&[
                    ("seo_score", MetricValue::Number(40.0)),
                    ("has_meta_description", MetricValue::Unavailable),
                ]),
            ),
        ]);

        let score = engine.score(&sections);
        assert_eq!(score.categories["performance"], 65.0);
        assert_eq!(score.categories["seo"], 40.0);
        assert_eq!(score.overall, Some(52.5));
    }

    #[test]
    fn test_missing_category_is_excluded_not_zero() {
        let catalog = CapabilityCatalog::default();
        let weights = BTreeMap::from([("security".to_string(), 3.0)]);
        let engine = ScoreEngine::new(&catalog, &weights);

        let sections = BTreeMap::from([
            (
                "tokens".to_string(),
                section(&[("token_count", MetricValue::Number(4.0))]),
            ),
            (
                "contract".to_string(),
                section(&[("is_verified", MetricValue::Flag(true))]),
            ),
        ]);

        // tokens has no scaled metric at basic depth, so only security counts
        let score = engine.score(&sections);
        assert!(!score.categories.contains_key("portfolio"));
        assert_eq!(score.overall, Some(100.0));
    }

    #[test]
    fn test_nothing_scored_means_no_overall() {
        let catalog = CapabilityCatalog::default();
        let weights = BTreeMap::new();
        let engine = ScoreEngine::new(&catalog, &weights);

        let sections = BTreeMap::from([(
            "contract".to_string(),
            Section::unavailable(vec!["is_verified".to_string()]),
        )]);
        let score = engine.score(&sections);
        assert!(score.categories.is_empty());
        assert_eq!(score.overall, None);
    }

    #[test]
    fn test_weights_renormalize() {
        let catalog = CapabilityCatalog::default();
        let weights = BTreeMap::from([("seo".to_string(), 3.0)]);
        let engine = ScoreEngine::new(&catalog, &weights);

        let sections = BTreeMap::from([
            (
                "performance".to_string(),
                section(&[("performance_score", MetricValue::Number(100.0))]),
            ),
            (
                "seo".to_string(),
                section(&[("seo_score", MetricValue::Number(60.0))]),
            ),
        ]);
        let score = engine.score(&sections);
        assert_eq!(score.overall, Some(70.0));
    }
}
