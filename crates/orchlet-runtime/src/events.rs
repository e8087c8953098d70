//! Event sink backed by `tracing`

use chrono::{DateTime, Utc};
use orchlet_core::OrchletError;
use tracing::{info, warn};

use crate::traits::EventSink;

/// Event type names emitted by the orchestrator
pub mod event_types {
    pub const CIRCUIT_OPENED: &str = "circuit_opened";
    pub const CIRCUIT_SKIPPED: &str = "circuit_skipped";
    pub const ATTEMPT_FAILED: &str = "attempt_failed";
    pub const RETRIES_EXHAUSTED: &str = "retries_exhausted";
    pub const INSTANCE_REGISTERED: &str = "instance_registered";
}

/// Forwards monitoring events to the `orchlet::events` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl TracingEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for TracingEventSink {
    fn log_health_check_failure(&self, service_name: &str, instance_id: &str, error: &OrchletError) {
        warn!(
            target: "orchlet::events",
            service = service_name,
            instance_id = instance_id,
            error = %error,
            "Health check failed"
        );
    }

    fn log_event(&self, event_type: &str, detail: &str, timestamp: DateTime<Utc>) {
        info!(
            target: "orchlet::events",
            event_type = event_type,
            timestamp = %timestamp.to_rfc3339(),
            "{}",
            detail
        );
    }
}
