//! Fire-and-forget telemetry.
//!
//! The engine reports what it did through a [`Telemetry`] sink. A failing
//! sink never affects the analysis: errors are logged and discarded.

use log::{debug, info, warn};
use serde::Serialize;

use crate::errors::{RejectCode, TelemetryError};
use crate::models::CacheTier;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    CacheHit {
        key: String,
        tier: CacheTier,
    },
    CacheMiss {
        key: String,
    },
    RequestCollapsed {
        key: String,
    },
    ProviderSkipped {
        provider: String,
        reason: String,
    },
    ProviderCall {
        provider: String,
        capability: String,
        outcome: String,
        latency_ms: u64,
    },
    AnalysisCompleted {
        key: String,
        confidence: f64,
        partial: bool,
        processing_time_ms: u64,
    },
    RequestRejected {
        code: RejectCode,
        message: String,
    },
}

pub trait Telemetry: Send + Sync {
    fn record(&self, event: &TelemetryEvent) -> Result<(), TelemetryError>;
}

/// Writes events to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn record(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        let line = serde_json::to_string(event).map_err(|e| TelemetryError(e.to_string()))?;
        match event {
            TelemetryEvent::AnalysisCompleted { .. } | TelemetryEvent::RequestRejected { .. } => {
                info!(target: "vantage::telemetry", "{}", line)
            }
            _ => debug!(target: "vantage::telemetry", "{}", line),
        }
        Ok(())
    }
}

/// Record an event, logging and discarding sink failures.
pub(crate) fn emit(sink: &dyn Telemetry, event: TelemetryEvent) {
    if let Err(e) = sink.record(&event) {
        warn!("Dropping telemetry event: {}", e);
    }
}
