use std::time::Duration;

use crate::errors::ProviderError;
use crate::models::{Capability, ProviderGap, ProviderPayload};

/// Outcome of one provider call for one capability.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderCallResult {
    pub provider: String,
    pub capability: Capability,
    pub outcome: Result<ProviderPayload, ProviderError>,
    pub latency: Duration,
}

impl ProviderCallResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Short outcome label for logs and telemetry.
    pub fn outcome_label(&self) -> &'static str {
        match &self.outcome {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        }
    }

    /// The gap this call leaves in the result, if it failed.
    pub fn gap(&self) -> Option<ProviderGap> {
        self.outcome.as_ref().err().map(|e| ProviderGap {
            provider: self.provider.clone(),
            capability: Some(self.capability.clone()),
            reason: e.kind().to_string(),
            detail: Some(e.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricSet;

    #[test]
    fn test_gap_for_failure_only() {
        let ok = ProviderCallResult {
            provider: "P1".to_string(),
            capability: "tokens".to_string(),
            outcome: Ok(ProviderPayload::from(MetricSet::new())),
            latency: Duration::from_millis(12),
        };
        assert!(ok.gap().is_none());
        assert_eq!(ok.outcome_label(), "ok");

        let failed = ProviderCallResult {
            outcome: Err(ProviderError::Timeout {
                provider: "P2".to_string(),
            }),
            provider: "P2".to_string(),
            ..ok
        };
        let gap = failed.gap().unwrap();
        assert_eq!(gap.provider, "P2");
        assert_eq!(gap.capability.as_deref(), Some("tokens"));
        assert_eq!(gap.reason, "timeout");
        assert_eq!(gap.detail.as_deref(), Some("Timeout: P2"));
    }
}
