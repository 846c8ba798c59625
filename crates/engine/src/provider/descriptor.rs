use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{Capability, Domain};

/// Reliability rank used when a descriptor does not rank a capability.
pub const DEFAULT_RELIABILITY: u8 = 50;

/// Calls allowed per sliding window.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateQuota {
    pub calls: u32,
    pub window_ms: u64,
}

impl RateQuota {
    pub fn new(calls: u32, window: Duration) -> Self {
        Self {
            calls,
            window_ms: window.as_millis() as u64,
        }
    }

    pub fn per_minute(calls: u32) -> Self {
        Self::new(calls, Duration::from_secs(60))
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Static description of a provider. Built at process start, read-only after.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    pub name: String,
    pub capabilities: BTreeSet<Capability>,
    /// Domains this provider serves. Empty means any domain.
    #[serde(default)]
    pub domains: BTreeSet<Domain>,
    pub has_credentials: bool,
    /// Higher is more reliable.
    #[serde(default)]
    pub reliability: BTreeMap<Capability, u8>,
    /// Calls allowed per window. `None` means the provider is not limited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<RateQuota>,
}

impl ProviderDescriptor {
    pub fn new<I, S>(name: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            domains: BTreeSet::new(),
            has_credentials: true,
            reliability: BTreeMap::new(),
            quota: None,
        }
    }

    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains = domains.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_reliability(mut self, capability: impl Into<String>, rank: u8) -> Self {
        self.reliability.insert(capability.into(), rank);
        self
    }

    pub fn with_quota(mut self, quota: RateQuota) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn with_credentials(mut self, present: bool) -> Self {
        self.has_credentials = present;
        self
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn serves_domain(&self, domain: &str) -> bool {
        self.domains.is_empty() || self.domains.contains(domain)
    }

    pub fn reliability_for(&self, capability: &str) -> u8 {
        self.reliability
            .get(capability)
            .copied()
            .unwrap_or(DEFAULT_RELIABILITY)
    }
}
