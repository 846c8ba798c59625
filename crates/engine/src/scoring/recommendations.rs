//! Rule-driven recommendations.
//!
//! A [`RecommendationRule`] pairs a predicate over the consolidated result
//! with a template. Rules are evaluated in table order; the output is
//! deduplicated by title, sorted by priority and capped.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::models::{Capability, Effort, Impact, MetricValue, Recommendation, ScoreBlock, Section};

/// Condition under which a rule fires.
///
/// Predicates over a capability that was not requested never match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RulePredicate {
    MetricBelow {
        capability: String,
        metric: String,
        threshold: f64,
    },
    MetricAbove {
        capability: String,
        metric: String,
        threshold: f64,
    },
    /// A flag metric was reported with the given value.
    FlagIs {
        capability: String,
        metric: String,
        value: bool,
    },
    /// The metric was expected but no provider reported it.
    MetricUnavailable { capability: String, metric: String },
    SectionConflicted { capability: String },
    SectionConfidenceBelow { capability: String, threshold: f64 },
    SubScoreBelow { category: String, threshold: f64 },
}

impl RulePredicate {
    fn matches(&self, sections: &BTreeMap<Capability, Section>, score: &ScoreBlock) -> bool {
        match self {
            Self::MetricBelow {
                capability,
                metric,
                threshold,
            } => metric_value(sections, capability, metric)
                .and_then(MetricValue::as_number)
                .is_some_and(|v| v < *threshold),
            Self::MetricAbove {
                capability,
                metric,
                threshold,
            } => metric_value(sections, capability, metric)
                .and_then(MetricValue::as_number)
                .is_some_and(|v| v > *threshold),
            Self::FlagIs {
                capability,
                metric,
                value: expected,
            } => metric_value(sections, capability, metric)
                .and_then(MetricValue::as_flag)
                .is_some_and(|v| v == *expected),
            Self::MetricUnavailable { capability, metric } => {
                matches!(
                    metric_value(sections, capability, metric),
                    Some(MetricValue::Unavailable)
                )
            }
            Self::SectionConflicted { capability } => {
                sections.get(capability).is_some_and(|s| s.conflicted)
            }
            Self::SectionConfidenceBelow {
                capability,
                threshold,
            } => sections
                .get(capability)
                .is_some_and(|s| s.confidence < *threshold),
            Self::SubScoreBelow {
                category,
                threshold,
            } => score
                .categories
                .get(category)
                .is_some_and(|s| s < threshold),
        }
    }
}

fn metric_value<'s>(
    sections: &'s BTreeMap<Capability, Section>,
    capability: &str,
    metric: &str,
) -> Option<&'s MetricValue> {
    sections
        .get(capability)
        .and_then(|s| s.data.get(metric))
        .map(|m| &m.value)
}

/// What a matching rule produces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationTemplate {
    pub id: String,
    pub title: String,
    pub category: String,
    pub impact: Impact,
    pub effort: Effort,
    /// Estimated probability in [0, 1] that acting on this helps.
    pub likelihood: f64,
    #[serde(default)]
    pub steps: Vec<String>,
}

impl RecommendationTemplate {
    pub fn priority(&self) -> f64 {
        self.impact.weight() * self.likelihood / self.effort.weight()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRule {
    pub when: RulePredicate,
    pub then: RecommendationTemplate,
}

/// Read a rule table from a JSON array. Rules are validated when the
/// engine is built.
pub fn load_rules(path: impl AsRef<Path>) -> Result<Vec<RecommendationRule>, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub struct RecommendationGenerator {
    rules: Vec<RecommendationRule>,
    max_recommendations: usize,
}

impl RecommendationGenerator {
    pub fn new(
        rules: Vec<RecommendationRule>,
        max_recommendations: usize,
    ) -> Result<Self, ConfigError> {
        for rule in &rules {
            if rule.then.title.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "recommendation rule '{}' has an empty title",
                    rule.then.id
                )));
            }
            if !(0.0..=1.0).contains(&rule.then.likelihood) {
                return Err(ConfigError::Invalid(format!(
                    "likelihood of rule '{}' must be within [0, 1]",
                    rule.then.id
                )));
            }
        }
        Ok(Self {
            rules,
            max_recommendations,
        })
    }

    /// Generator over the built-in rule table.
    pub fn with_default_rules(max_recommendations: usize) -> Self {
        Self {
            rules: default_rules(),
            max_recommendations,
        }
    }

    pub fn rules(&self) -> &[RecommendationRule] {
        &self.rules
    }

    pub fn generate(
        &self,
        sections: &BTreeMap<Capability, Section>,
        score: &ScoreBlock,
    ) -> Vec<Recommendation> {
        let mut seen = HashSet::new();
        let mut matched: Vec<&RecommendationTemplate> = self
            .rules
            .iter()
            .filter(|rule| rule.when.matches(sections, score))
            .map(|rule| &rule.then)
            .filter(|template| seen.insert(template.title.as_str()))
            .collect();

        // stable: equal priorities keep table order
        matched.sort_by(|a, b| b.priority().total_cmp(&a.priority()));
        matched.truncate(self.max_recommendations);

        matched
            .into_iter()
            .enumerate()
            .map(|(index, template)| Recommendation {
                id: template.id.clone(),
                title: template.title.clone(),
                category: template.category.clone(),
                rank: index + 1,
                impact: template.impact,
                effort: template.effort,
                likelihood: template.likelihood,
                priority: template.priority(),
                steps: template.steps.clone(),
            })
            .collect()
    }
}

#[allow(clippy::too_many_arguments)]
fn rule(
    when: RulePredicate,
    id: &str,
    title: &str,
    category: &str,
    impact: Impact,
    effort: Effort,
    likelihood: f64,
    steps: &[&str],
) -> RecommendationRule {
    RecommendationRule {
        when,
        then: RecommendationTemplate {
            id: id.to_string(),
            title: title.to_string(),
            category: category.to_string(),
            impact,
            effort,
            likelihood,
            steps: steps.iter().map(|s| s.to_string()).collect(),
        },
    }
}

fn below(capability: &str, metric: &str, threshold: f64) -> RulePredicate {
    RulePredicate::MetricBelow {
        capability: capability.to_string(),
        metric: metric.to_string(),
        threshold,
    }
}

fn above(capability: &str, metric: &str, threshold: f64) -> RulePredicate {
    RulePredicate::MetricAbove {
        capability: capability.to_string(),
        metric: metric.to_string(),
        threshold,
    }
}

fn flag_is(capability: &str, metric: &str, value: bool) -> RulePredicate {
    RulePredicate::FlagIs {
        capability: capability.to_string(),
        metric: metric.to_string(),
        value,
    }
}

/// The built-in rule table, covering the default catalog.
pub fn default_rules() -> Vec<RecommendationRule> {
    use Effort as E;
    use Impact as I;

    let mut rules = vec![
        rule(
            below("performance", "performance_score", 50.0),
            "performance-critical",
            "Fix critical page performance issues",
            "performance",
            I::High,
            E::High,
            0.9,
            &[
                "Profile the page load and identify the largest blocking resources",
                "Defer non-critical scripts and inline critical CSS",
                "Serve images in modern formats at the rendered size",
            ],
        ),
        rule(
            above("performance", "largest_contentful_paint_ms", 4000.0),
            "performance-lcp",
            "Reduce largest contentful paint",
            "performance",
            I::High,
            E::Medium,
            0.8,
            &[
                "Preload the hero image or main text font",
                "Move render-blocking resources off the critical path",
            ],
        ),
        rule(
            above("performance", "cumulative_layout_shift", 0.25),
            "performance-cls",
            "Stabilize layout shifts",
            "performance",
            I::Medium,
            E::Low,
            0.7,
            &[
                "Reserve space for images, embeds and ads with explicit dimensions",
                "Avoid inserting content above existing content after load",
            ],
        ),
        rule(
            flag_is("seo", "has_meta_description", false),
            "seo-meta-description",
            "Add a meta description",
            "seo",
            I::Medium,
            E::Low,
            0.9,
            &[
                "Write a unique 120-160 character description for the page",
                "Include the primary keyword naturally",
            ],
        ),
        rule(
            flag_is("seo", "has_sitemap", false),
            "seo-sitemap",
            "Publish an XML sitemap",
            "seo",
            I::Medium,
            E::Low,
            0.8,
            &[
                "Generate a sitemap listing every canonical URL",
                "Reference it from robots.txt and submit it to search consoles",
            ],
        ),
        rule(
            below("seo", "seo_score", 60.0),
            "seo-fundamentals",
            "Improve on-page SEO fundamentals",
            "seo",
            I::High,
            E::Medium,
            0.7,
            &[
                "Audit titles, headings and canonical tags",
                "Fix crawl errors reported by search consoles",
            ],
        ),
        rule(
            above("links", "broken_links", 0.0),
            "links-broken",
            "Fix broken links",
            "links",
            I::Medium,
            E::Low,
            0.95,
            &[
                "Export the list of broken URLs",
                "Redirect or update each link to a live target",
            ],
        ),
        rule(
            below("links", "referring_domains", 50.0),
            "links-authority",
            "Grow referring domains",
            "links",
            I::High,
            E::High,
            0.5,
            &[
                "Identify sites linking to competitors but not to you",
                "Publish linkable resources and run outreach",
            ],
        ),
        rule(
            below("content", "word_count", 300.0),
            "content-thin",
            "Expand thin content",
            "content",
            I::Medium,
            E::Medium,
            0.6,
            &["Cover the topic in more depth", "Answer related user questions on the page"],
        ),
        rule(
            above("content", "duplicate_content_ratio", 0.2),
            "content-duplicate",
            "Reduce duplicate content",
            "content",
            I::Medium,
            E::Medium,
            0.7,
            &[
                "Consolidate near-duplicate pages",
                "Add canonical tags where duplicates must remain",
            ],
        ),
        rule(
            below("ai", "ai_visibility_score", 40.0),
            "ai-visibility",
            "Improve visibility in AI answers",
            "ai",
            I::Medium,
            E::Medium,
            0.5,
            &[
                "Add structured data describing key entities",
                "Publish concise, citable answers to common questions",
            ],
        ),
        rule(
            flag_is("contract", "is_verified", false),
            "contract-verify",
            "Verify the contract source code",
            "security",
            I::High,
            E::Low,
            0.9,
            &[
                "Publish the exact compiler settings used for deployment",
                "Submit the source to the chain explorer for verification",
            ],
        ),
        rule(
            flag_is("contract", "is_proxy", true),
            "contract-proxy",
            "Review proxy upgrade controls",
            "security",
            I::High,
            E::Medium,
            0.6,
            &[
                "Identify the admin able to upgrade the implementation",
                "Put upgrades behind a timelock or multisig",
            ],
        ),
        rule(
            above("tokens", "spam_token_ratio", 0.3),
            "tokens-spam",
            "Hide spam tokens from the portfolio",
            "portfolio",
            I::Low,
            E::Low,
            0.8,
            &["Filter tokens without liquidity or verified metadata"],
        ),
        rule(
            above("transactions", "failed_tx_ratio", 0.1),
            "transactions-failures",
            "Investigate failing transactions",
            "activity",
            I::Medium,
            E::Medium,
            0.7,
            &[
                "Group failed transactions by target contract",
                "Check gas limits and revert reasons",
            ],
        ),
    ];

    // cross-cutting data quality rules, appended per capability
    for capability in [
        "performance",
        "seo",
        "links",
        "content",
        "ai",
        "tokens",
        "transactions",
        "contract",
    ] {
        rules.push(rule(
            RulePredicate::SectionConflicted {
                capability: capability.to_string(),
            },
            &format!("{capability}-conflict"),
            &format!("Review conflicting {capability} data"),
            capability,
            I::Low,
            E::Low,
            0.4,
            &["Compare the raw readings listed under metadata conflicts"],
        ));
        rules.push(rule(
            RulePredicate::SectionConfidenceBelow {
                capability: capability.to_string(),
                threshold: 0.3,
            },
            &format!("{capability}-low-confidence"),
            &format!("Add data sources for {capability}"),
            capability,
            I::Low,
            E::Medium,
            0.5,
            &["Configure credentials for additional providers of this capability"],
        ));
    }

    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConsolidatedMetric, SectionStatus};

    fn section(metrics: &[(&str, MetricValue)], confidence: f64, conflicted: bool) -> Section {
        Section {
            status: SectionStatus::Available,
            data: metrics
                .iter()
                .map(|(key, value)| {
                    (
                        key.to_string(),
                        ConsolidatedMetric {
                            value: value.clone(),
                            confidence,
                            provenance: vec!["P1".to_string()],
                            conflicted,
                        },
                    )
                })
                .collect(),
            confidence,
            provenance: vec!["P1".to_string()],
            conflicted,
            missing: Vec::new(),
        }
    }

    fn template(id: &str, title: &str, impact: Impact, effort: Effort, likelihood: f64) -> RecommendationTemplate {
        RecommendationTemplate {
            id: id.to_string(),
            title: title.to_string(),
            category: "seo".to_string(),
            impact,
            effort,
            likelihood,
            steps: Vec::new(),
        }
    }

    fn always(id: &str, title: &str, impact: Impact, effort: Effort, likelihood: f64) -> RecommendationRule {
        RecommendationRule {
            when: RulePredicate::SubScoreBelow {
                category: "seo".to_string(),
                threshold: 101.0,
            },
            then: template(id, title, impact, effort, likelihood),
        }
    }

    fn seo_score(score: f64) -> ScoreBlock {
        ScoreBlock {
            overall: Some(score),
            categories: BTreeMap::from([("seo".to_string(), score)]),
        }
    }

    #[test]
    fn test_sorted_by_priority_with_stable_ties() {
        let generator = RecommendationGenerator::new(
            vec![
                always("a", "A", Impact::Low, Effort::High, 0.9),
                always("b", "B", Impact::High, Effort::Low, 0.5),
                always("c", "C", Impact::Medium, Effort::Medium, 0.75),
                always("d", "D", Impact::Medium, Effort::Medium, 0.75),
            ],
            10,
        )
        .unwrap();

        let recs = generator.generate(&BTreeMap::new(), &seo_score(50.0));
        let ids: Vec<&str> = recs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "d", "a"]);
        assert_eq!(recs[0].rank, 1);
        assert_eq!(recs[3].rank, 4);
        assert!((recs[0].priority - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_duplicate_titles_first_wins_and_cap() {
        let generator = RecommendationGenerator::new(
            vec![
                always("first", "Same", Impact::Low, Effort::Low, 0.5),
                always("second", "Same", Impact::High, Effort::Low, 1.0),
                always("other", "Other", Impact::Low, Effort::Low, 0.1),
                always("third", "Third", Impact::Low, Effort::Low, 0.2),
            ],
            2,
        )
        .unwrap();

        let recs = generator.generate(&BTreeMap::new(), &seo_score(50.0));
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].id, "first");
        assert_eq!(recs[1].id, "third");
    }

    #[test]
    fn test_default_rules_fire_on_consolidated_data() {
        let generator = RecommendationGenerator::with_default_rules(10);
        let sections = BTreeMap::from([
            (
                "seo".to_string(),
                section(
                    &[
                        ("seo_score", MetricValue::Number(45.0)),
                        ("has_meta_description", MetricValue::Flag(false)),
                    ],
                    0.7,
                    false,
                ),
            ),
            (
                "contract".to_string(),
                section(&[("is_verified", MetricValue::Flag(true))], 0.5, true),
            ),
        ]);

        let recs = generator.generate(&sections, &ScoreBlock::default());
        let ids: Vec<&str> = recs.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&"seo-meta-description"));
        assert!(ids.contains(&"seo-fundamentals"));
        assert!(ids.contains(&"contract-conflict"));
        assert!(!ids.contains(&"contract-verify"));
        // capabilities that were not requested never match
        assert!(!ids.iter().any(|id| id.starts_with("performance")));
    }

    #[test]
    fn test_unavailable_is_not_below_threshold() {
        let generator = RecommendationGenerator::with_default_rules(10);
        let sections = BTreeMap::from([(
            "seo".to_string(),
            section(&[("seo_score", MetricValue::Unavailable)], 0.7, false),
        )]);
        let recs = generator.generate(&sections, &ScoreBlock::default());
        assert!(recs.iter().all(|r| r.id != "seo-fundamentals"));

        let predicate = RulePredicate::MetricUnavailable {
            capability: "seo".to_string(),
            metric: "seo_score".to_string(),
        };
        assert!(predicate.matches(&sections, &ScoreBlock::default()));
    }

    #[test]
    fn test_invalid_likelihood_rejected() {
        let result = RecommendationGenerator::new(
            vec![always("x", "X", Impact::Low, Effort::Low, 1.5)],
            10,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rule_table_json_shape() {
        let json = r#"[{
            "when": {"type": "metric_below", "capability": "seo", "metric": "seo_score", "threshold": 50},
            "then": {"id": "x", "title": "X", "category": "seo", "impact": "high", "effort": "low", "likelihood": 0.5}
        }]"#;
        let rules: Vec<RecommendationRule> = serde_json::from_str(json).unwrap();
        assert_eq!(rules[0].then.priority(), 1.5);
        assert!(rules[0].then.steps.is_empty());
    }
}
