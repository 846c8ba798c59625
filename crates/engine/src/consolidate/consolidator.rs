//! Response consolidation.
//!
//! Merges the normalized metrics of every successful provider call into one
//! section per requested capability. Readings are ordered by provider id
//! before merging, so the outcome does not depend on the order in which
//! calls settled.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::catalog::CapabilityCatalog;
use crate::config::EngineConfig;
use crate::fanout::ProviderCallResult;
use crate::models::{
    AnalysisRequest, Capability, ConflictReading, ConsolidatedMetric, MetricConflict, MetricKey,
    MetricValue, ProviderGap, Section, SectionStatus,
};

/// Tunables of the merge policy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationPolicy {
    pub agreement_threshold: f64,
    pub single_source_penalty: f64,
    pub conflict_confidence: f64,
}

impl Default for ConsolidationPolicy {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ConsolidationPolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            agreement_threshold: config.agreement_threshold,
            single_source_penalty: config.single_source_penalty,
            conflict_confidence: config.conflict_confidence,
        }
    }
}

/// Everything consolidation derives from a set of call results.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Consolidated {
    pub sections: BTreeMap<Capability, Section>,
    pub conflicts: Vec<MetricConflict>,
    /// Providers with at least one successful call, sorted.
    pub providers_used: Vec<String>,
    /// Failed calls, sorted by provider then capability.
    pub gaps: Vec<ProviderGap>,
}

impl Consolidated {
    /// Mean section confidence.
    pub fn confidence(&self) -> f64 {
        if self.sections.is_empty() {
            return 0.0;
        }
        self.sections.values().map(|s| s.confidence).sum::<f64>() / self.sections.len() as f64
    }
}

struct Reading<'a> {
    provider: &'a str,
    value: MetricValue,
}

pub struct ResponseConsolidator<'a> {
    catalog: &'a CapabilityCatalog,
    policy: ConsolidationPolicy,
}

impl<'a> ResponseConsolidator<'a> {
    pub fn new(catalog: &'a CapabilityCatalog, policy: ConsolidationPolicy) -> Self {
        Self { catalog, policy }
    }

    /// Merge call results into sections.
    ///
    /// `reliability(provider, capability)` returns the provider's declared
    /// rank for the capability; it decides conflicts.
    pub fn consolidate<F>(
        &self,
        request: &AnalysisRequest,
        results: &[ProviderCallResult],
        reliability: F,
    ) -> Consolidated
    where
        F: Fn(&str, &str) -> u8,
    {
        let mut ordered: Vec<&ProviderCallResult> = results.iter().collect();
        ordered.sort_by(|a, b| {
            a.provider
                .cmp(&b.provider)
                .then_with(|| a.capability.cmp(&b.capability))
        });

        let mut consolidated = Consolidated::default();
        let mut used = BTreeSet::new();

        for result in &ordered {
            match &result.outcome {
                Ok(_) => {
                    used.insert(result.provider.clone());
                }
                Err(_) => consolidated.gaps.extend(result.gap()),
            }
        }
        consolidated.providers_used = used.into_iter().collect();

        for capability in request.capabilities() {
            let mut readings: BTreeMap<MetricKey, Vec<Reading<'_>>> = BTreeMap::new();
            for result in ordered.iter().filter(|r| &r.capability == capability) {
                if let Ok(payload) = &result.outcome {
                    for (key, value) in payload.metrics() {
                        readings.entry(key).or_default().push(Reading {
                            provider: &result.provider,
                            value,
                        });
                    }
                }
            }

            let expected = match self.catalog.capability(capability) {
                Some(spec) => spec.expected_metrics(request.depth()),
                None => readings.keys().cloned().collect(),
            };

            let section = self.section(capability, &expected, readings, &reliability, &mut consolidated.conflicts);
            consolidated.sections.insert(capability.clone(), section);
        }

        consolidated
    }

    fn section<F>(
        &self,
        capability: &str,
        expected: &[MetricKey],
        readings: BTreeMap<MetricKey, Vec<Reading<'_>>>,
        reliability: &F,
        conflicts: &mut Vec<MetricConflict>,
    ) -> Section
    where
        F: Fn(&str, &str) -> u8,
    {
        let mut data = BTreeMap::new();
        for (key, metric_readings) in readings {
            let metric = self.merge(capability, &key, metric_readings, reliability, conflicts);
            data.insert(key, metric);
        }

        let missing: Vec<MetricKey> = expected
            .iter()
            .filter(|key| !data.contains_key(*key))
            .cloned()
            .collect();
        let satisfied: Vec<f64> = expected
            .iter()
            .filter_map(|key| data.get(key).map(|m| m.confidence))
            .collect();
        for key in &missing {
            data.insert(key.clone(), ConsolidatedMetric::unavailable());
        }

        if satisfied.is_empty() {
            return Section {
                data,
                ..Section::unavailable(missing)
            };
        }

        let fraction = satisfied.len() as f64 / expected.len() as f64;
        let mean = satisfied.iter().sum::<f64>() / satisfied.len() as f64;
        let status = if missing.is_empty() {
            SectionStatus::Available
        } else {
            SectionStatus::Partial
        };

        let provenance: BTreeSet<String> = data
            .values()
            .flat_map(|m| m.provenance.iter().cloned())
            .collect();
        let conflicted = data.values().any(|m| m.conflicted);

        Section {
            status,
            data,
            confidence: fraction * mean,
            provenance: provenance.into_iter().collect(),
            conflicted,
            missing,
        }
    }

    /// Apply the merge policy to one metric's readings (sorted by provider).
    fn merge<F>(
        &self,
        capability: &str,
        metric: &str,
        readings: Vec<Reading<'_>>,
        reliability: &F,
        conflicts: &mut Vec<MetricConflict>,
    ) -> ConsolidatedMetric
    where
        F: Fn(&str, &str) -> u8,
    {
        let provenance = || readings.iter().map(|r| r.provider.to_string()).collect::<Vec<_>>();

        if readings.len() == 1 {
            return ConsolidatedMetric {
                value: readings[0].value.clone(),
                confidence: 1.0 - self.policy.single_source_penalty,
                provenance: provenance(),
                conflicted: false,
            };
        }

        let numbers: Option<Vec<f64>> = readings.iter().map(|r| r.value.as_number()).collect();
        if let Some(numbers) = numbers {
            let spread = relative_spread(&numbers);
            if spread <= self.policy.agreement_threshold {
                return ConsolidatedMetric {
                    value: MetricValue::Number(numbers.iter().sum::<f64>() / numbers.len() as f64),
                    confidence: 1.0 - spread / 2.0,
                    provenance: provenance(),
                    conflicted: false,
                };
            }
        } else if readings.iter().all(|r| r.value == readings[0].value) {
            return ConsolidatedMetric {
                value: readings[0].value.clone(),
                confidence: 1.0,
                provenance: provenance(),
                conflicted: false,
            };
        }

        // disagreement: highest rank wins, lowest provider id breaks ties
        let ranked: Vec<(u8, &Reading<'_>)> = readings
            .iter()
            .map(|r| (reliability(r.provider, capability), r))
            .collect();
        let mut chosen = &ranked[0];
        for candidate in &ranked[1..] {
            if candidate.0 > chosen.0 {
                chosen = candidate;
            }
        }

        conflicts.push(MetricConflict {
            capability: capability.to_string(),
            metric: metric.to_string(),
            chosen: chosen.1.provider.to_string(),
            readings: ranked
                .iter()
                .map(|(rank, r)| ConflictReading {
                    provider: r.provider.to_string(),
                    value: r.value.clone(),
                    reliability: *rank,
                })
                .collect(),
        });

        ConsolidatedMetric {
            value: chosen.1.value.clone(),
            confidence: self.policy.conflict_confidence,
            provenance: vec![chosen.1.provider.to_string()],
            conflicted: true,
        }
    }
}

/// `(max - min) / max(|max|, |min|)`, 0 when every value is 0.
pub fn relative_spread(values: &[f64]) -> f64 {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let scale = max.abs().max(min.abs());
    if scale == 0.0 {
        0.0
    } else {
        (max - min) / scale
    }
}
