//! Skip reason tracking for provider selection.

use serde::Serialize;

use crate::models::{ProviderGap, ProviderId};

/// Why an otherwise matching provider was left out of a fanout.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The provider needs credentials that are not configured.
    MissingCredentials,

    /// Circuit breaker is open for this provider.
    CircuitOpen,

    /// No quota left in the provider's rate-limit window.
    RateLimited,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::CircuitOpen => "circuit_open",
            Self::RateLimited => "rate_limited",
        }
    }
}

/// Providers skipped during selection, in registry order.
#[derive(Clone, Debug, Default)]
pub struct SelectionDiagnostics {
    pub skipped: Vec<(ProviderId, SkipReason)>,
}

impl SelectionDiagnostics {
    pub fn record_skip(&mut self, provider: ProviderId, reason: SkipReason) {
        self.skipped.push((provider, reason));
    }

    pub fn is_empty(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Summary for logging.
    pub fn summary(&self) -> String {
        self.skipped
            .iter()
            .map(|(provider, reason)| format!("{}: SKIPPED ({})", provider, reason.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn gaps(&self) -> Vec<ProviderGap> {
        self.skipped
            .iter()
            .map(|(provider, reason)| ProviderGap {
                provider: provider.to_string(),
                capability: None,
                reason: reason.as_str().to_string(),
                detail: None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;

    #[test]
    fn test_summary_and_gaps() {
        let mut diag = SelectionDiagnostics::default();
        assert!(diag.is_empty());

        diag.record_skip(Cow::Borrowed("P1"), SkipReason::CircuitOpen);
        diag.record_skip(Cow::Borrowed("P2"), SkipReason::MissingCredentials);

        let summary = diag.summary();
        assert!(summary.contains("P1: SKIPPED (circuit_open)"));
        assert!(summary.contains("P2: SKIPPED (missing_credentials)"));

        let gaps = diag.gaps();
        assert_eq!(gaps.len(), 2);
        assert_eq!(gaps[1].reason, "missing_credentials");
        assert_eq!(gaps[1].capability, None);
    }
}
