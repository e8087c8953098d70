//! Retrying request dispatch
//!
//! A request is tried against instances chosen by the service's balancer.
//! Instances behind a blocking circuit are skipped without spending an
//! execution attempt, but skips are capped per request so a service whose
//! every circuit is open fails fast instead of spinning.

use chrono::Utc;
use orchlet_core::{DispatchConfig, OrchletError, OrchletResult, ServiceRequest};
use orchlet_network::ServiceRegistry;
use orchlet_runtime::{event_types, EventSink, Executor};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Dispatches requests with circuit-aware selection and exponential backoff
pub struct Dispatcher {
    registry: Arc<ServiceRegistry>,
    executor: Arc<dyn Executor>,
    events: Arc<dyn EventSink>,
    config: DispatchConfig,
    breaker_timeout: Duration,
    /// Cancelled on shutdown; interrupts backoff sleeps
    shutdown: CancellationToken,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(
        registry: Arc<ServiceRegistry>,
        executor: Arc<dyn Executor>,
        events: Arc<dyn EventSink>,
        config: DispatchConfig,
        breaker_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            executor,
            events,
            config,
            breaker_timeout,
            shutdown,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Execute a request, retrying failed attempts with backoff
    pub async fn dispatch(&self, request: &ServiceRequest) -> OrchletResult<serde_json::Value> {
        let service = request.service_name.as_str();
        let max_attempts = self.config.max_retry_attempts;

        let mut attempt: u32 = 0;
        let mut skipped: usize = 0;
        let mut last_error: Option<OrchletError> = None;

        loop {
            let Some((instance, group_size)) = self.registry.select_instance(service).await else {
                return Err(OrchletError::ServiceUnavailable(format!(
                    "no instances registered for {}",
                    service
                )));
            };

            if !instance.admits_traffic(self.breaker_timeout).await {
                skipped += 1;
                debug!(
                    request_id = %request.id,
                    service = service,
                    instance_id = instance.id(),
                    skipped = skipped,
                    "Skipping instance with open circuit"
                );
                if skipped >= (max_attempts as usize).saturating_mul(group_size) {
                    return Err(self.give_up(request, attempt, last_error));
                }
                continue;
            }

            attempt += 1;
            let result = {
                let _in_flight = instance.begin_request();
                self.executor.execute(instance.spec(), request).await
            };

            match result {
                Ok(value) => {
                    instance.record_success().await;
                    debug!(
                        request_id = %request.id,
                        service = service,
                        instance_id = instance.id(),
                        attempt = attempt,
                        "Request succeeded"
                    );
                    return Ok(value);
                }
                Err(e) => {
                    let failure = OrchletError::AttemptFailed {
                        instance_id: instance.id().to_string(),
                        attempt,
                        reason: e.to_string(),
                    };
                    warn!(
                        request_id = %request.id,
                        service = service,
                        instance_id = instance.id(),
                        attempt = attempt,
                        error = %e,
                        "Request attempt failed"
                    );
                    self.events.log_event(
                        event_types::ATTEMPT_FAILED,
                        &format!("{}: {}", service, failure),
                        Utc::now(),
                    );

                    if attempt >= max_attempts {
                        return Err(self.give_up(request, attempt, Some(failure)));
                    }
                    last_error = Some(failure);
                    self.backoff(request, attempt).await?;
                }
            }
        }
    }

    /// Sleep before the next attempt unless shutdown interrupts it
    async fn backoff(&self, request: &ServiceRequest, attempt: u32) -> OrchletResult<()> {
        let delay = self.config.backoff_for(attempt);
        debug!(
            request_id = %request.id,
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            "Backing off"
        );

        tokio::select! {
            _ = self.shutdown.cancelled() => Err(OrchletError::InterruptedDuringBackoff(format!(
                "request {} to {} interrupted after attempt {}",
                request.id, request.service_name, attempt
            ))),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn give_up(
        &self,
        request: &ServiceRequest,
        attempts: u32,
        last_error: Option<OrchletError>,
    ) -> OrchletError {
        let service = request.service_name.clone();
        match last_error {
            Some(last_error) => {
                let err = OrchletError::RetriesExhausted {
                    service,
                    attempts,
                    last_error: Box::new(last_error),
                };
                warn!(request_id = %request.id, error = %err, "Giving up on request");
                self.events
                    .log_event(event_types::RETRIES_EXHAUSTED, &err.to_string(), Utc::now());
                err
            }
            None => {
                let detail = format!("all instances of {} are behind open circuits", service);
                warn!(request_id = %request.id, service = %service, "Giving up on request: {}", detail);
                self.events
                    .log_event(event_types::CIRCUIT_SKIPPED, &detail, Utc::now());
                OrchletError::ServiceUnavailable(detail)
            }
        }
    }
}
