//! Instance records
//!
//! Identity is immutable; the mutable health and breaker state lives behind a
//! per-instance mutex so compound transitions (count a failure, compare with
//! the threshold, open the circuit) are atomic with respect to concurrent
//! dispatches and health checks on the same instance.

use chrono::{DateTime, Utc};
use orchlet_core::{CircuitState, InstanceSpec, InstanceStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::breaker::CircuitBreaker;

#[derive(Debug)]
struct InstanceState {
    healthy: bool,
    breaker: CircuitBreaker,
    last_probe_at: Option<DateTime<Utc>>,
}

/// Result of recording a failed probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Failure count after this probe
    pub consecutive_failures: u32,
    /// Whether this probe moved the circuit from closed to open
    pub circuit_opened: bool,
}

/// One backend endpoint providing a service
#[derive(Debug)]
pub struct Instance {
    spec: InstanceSpec,
    state: Mutex<InstanceState>,
    in_flight: AtomicUsize,
}

impl Instance {
    /// Create a healthy instance with a closed circuit
    pub fn new(spec: InstanceSpec) -> Self {
        Self {
            spec,
            state: Mutex::new(InstanceState {
                healthy: true,
                breaker: CircuitBreaker::new(),
                last_probe_at: None,
            }),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn spec(&self) -> &InstanceSpec {
        &self.spec
    }

    pub fn id(&self) -> &str {
        &self.spec.instance_id
    }

    pub fn service_name(&self) -> &str {
        &self.spec.service_name
    }

    pub async fn is_healthy(&self) -> bool {
        self.state.lock().await.healthy
    }

    pub async fn consecutive_failures(&self) -> u32 {
        self.state.lock().await.breaker.consecutive_failures()
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.state.lock().await.breaker.state()
    }

    /// Whether the circuit currently lets traffic through
    pub async fn admits_traffic(&self, breaker_timeout: Duration) -> bool {
        !self
            .state
            .lock()
            .await
            .breaker
            .blocks(Instant::now(), breaker_timeout)
    }

    /// Record a successful request: closes the circuit and resets failures
    pub async fn record_success(&self) {
        self.state.lock().await.breaker.record_success();
    }

    /// Record a probe that reported the instance as serving
    pub async fn record_probe_success(&self) {
        let mut state = self.state.lock().await;
        state.healthy = true;
        state.last_probe_at = Some(Utc::now());
    }

    /// Record a failed probe and open the circuit past `threshold`.
    ///
    /// `reported_healthy` is `Some(false)` when the probe answered "unhealthy"
    /// and `None` when the probe itself errored; only the former changes the
    /// healthy flag.
    pub async fn record_probe_failure(
        &self,
        reported_healthy: Option<bool>,
        threshold: u32,
    ) -> ProbeOutcome {
        let mut state = self.state.lock().await;
        if let Some(healthy) = reported_healthy {
            state.healthy = healthy;
        }
        state.last_probe_at = Some(Utc::now());

        let consecutive_failures = state.breaker.record_failure();
        let circuit_opened = state.breaker.trip_if_exceeded(threshold, Instant::now());

        ProbeOutcome {
            consecutive_failures,
            circuit_opened,
        }
    }

    /// Requests currently executing against this instance
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Mark a request as in flight until the guard is dropped
    pub fn begin_request(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            instance: Arc::clone(self),
        }
    }

    /// Snapshot of identity and state
    pub async fn status(&self, breaker_timeout: Duration) -> InstanceStatus {
        let state = self.state.lock().await;
        InstanceStatus {
            instance_id: self.spec.instance_id.clone(),
            service_name: self.spec.service_name.clone(),
            endpoint: self.spec.endpoint.clone(),
            healthy: state.healthy,
            consecutive_failures: state.breaker.consecutive_failures(),
            circuit_state: state.breaker.state(),
            accepting_traffic: !state.breaker.blocks(Instant::now(), breaker_timeout),
            in_flight: self.in_flight(),
            last_probe_at: state.last_probe_at,
        }
    }
}

/// Decrements the in-flight count of an instance on drop
#[derive(Debug)]
pub struct InFlightGuard {
    instance: Arc<Instance>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.instance.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
