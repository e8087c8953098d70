//! Health checking for instances

use chrono::Utc;
use orchlet_core::OrchletError;
use orchlet_runtime::{event_types, EventSink, Prober};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::instance::Instance;
use crate::registry::ServiceRegistry;

/// Totals for one health check cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthCycleSummary {
    pub probed: usize,
    pub failed: usize,
    pub circuits_opened: usize,
}

enum ProbeResult {
    Passed,
    Failed { circuit_opened: bool },
}

/// Periodically probes every registered instance
pub struct HealthChecker {
    registry: Arc<ServiceRegistry>,
    prober: Arc<dyn Prober>,
    events: Arc<dyn EventSink>,
    /// Time between cycles
    interval: Duration,
    /// Failures tolerated before the circuit opens
    failure_threshold: u32,
}

impl HealthChecker {
    /// Create a new health checker
    pub fn new(
        registry: Arc<ServiceRegistry>,
        prober: Arc<dyn Prober>,
        events: Arc<dyn EventSink>,
        interval: Duration,
        failure_threshold: u32,
    ) -> Self {
        Self {
            registry,
            prober,
            events,
            interval,
            failure_threshold,
        }
    }

    /// Get the interval between cycles
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the health check loop; it runs until `shutdown` is cancelled
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.interval.as_secs(),
            prober = self.prober.name(),
            "Health checker started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            // A cycle cut short leaves each instance either probed or untouched
            tokio::select! {
                _ = shutdown.cancelled() => break,
                summary = self.check_all() => {
                    debug!(
                        probed = summary.probed,
                        failed = summary.failed,
                        circuits_opened = summary.circuits_opened,
                        "Health check cycle completed"
                    );
                }
            }
        }

        info!("Health checker stopped");
    }

    /// Probe every instance once, concurrently
    pub async fn check_all(&self) -> HealthCycleSummary {
        let instances = self.registry.all_instances().await;

        let checks = instances.iter().map(|instance| self.check_instance(instance));
        let results = futures::future::join_all(checks).await;

        let mut summary = HealthCycleSummary {
            probed: results.len(),
            ..Default::default()
        };
        for result in results {
            if let ProbeResult::Failed { circuit_opened } = result {
                summary.failed += 1;
                if circuit_opened {
                    summary.circuits_opened += 1;
                }
            }
        }
        summary
    }

    async fn check_instance(&self, instance: &Arc<Instance>) -> ProbeResult {
        let (reported_healthy, error) = match self.prober.health_check(instance.spec()).await {
            Ok(true) => {
                instance.record_probe_success().await;
                return ProbeResult::Passed;
            }
            Ok(false) => (
                Some(false),
                OrchletError::ProbeFailed("instance reported unhealthy".to_string()),
            ),
            Err(OrchletError::ProbeFailed(reason)) => (None, OrchletError::ProbeFailed(reason)),
            Err(e) => (None, OrchletError::ProbeFailed(e.to_string())),
        };

        let outcome = instance
            .record_probe_failure(reported_healthy, self.failure_threshold)
            .await;

        warn!(
            service = instance.service_name(),
            instance_id = instance.id(),
            consecutive_failures = outcome.consecutive_failures,
            error = %error,
            "Health check failed"
        );
        self.events
            .log_health_check_failure(instance.service_name(), instance.id(), &error);

        if outcome.circuit_opened {
            warn!(
                service = instance.service_name(),
                instance_id = instance.id(),
                consecutive_failures = outcome.consecutive_failures,
                "Circuit opened"
            );
            self.events.log_event(
                event_types::CIRCUIT_OPENED,
                &format!(
                    "{}/{} after {} consecutive failures",
                    instance.service_name(),
                    instance.id(),
                    outcome.consecutive_failures
                ),
                Utc::now(),
            );
        }

        ProbeResult::Failed {
            circuit_opened: outcome.circuit_opened,
        }
    }
}
