//! Capability trait definitions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orchlet_core::{InstanceSpec, OrchletError, OrchletResult, ServiceRequest};

/// Executes a request against a concrete instance
///
/// Implementations are responsible for their own timeouts; the dispatcher
/// treats every `Err` as one failed attempt.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run the request against the instance and return its result
    async fn execute(
        &self,
        instance: &InstanceSpec,
        request: &ServiceRequest,
    ) -> OrchletResult<serde_json::Value>;

    /// Get the executor name
    fn name(&self) -> &'static str;
}

/// Probes an instance out of band
#[async_trait]
pub trait Prober: Send + Sync {
    /// `Ok(true)` when serving, `Ok(false)` when the instance reports itself
    /// unhealthy, `Err` when the probe itself could not complete
    async fn health_check(&self, instance: &InstanceSpec) -> OrchletResult<bool>;

    /// Get the prober name
    fn name(&self) -> &'static str;
}

/// Write-only monitoring sink
///
/// Both methods are fire-and-forget: they must return promptly and must not
/// fail the caller.
pub trait EventSink: Send + Sync {
    /// Report a failed health probe
    fn log_health_check_failure(&self, service_name: &str, instance_id: &str, error: &OrchletError);

    /// Report a named event
    fn log_event(&self, event_type: &str, detail: &str, timestamp: DateTime<Utc>);
}
