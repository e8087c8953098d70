//! Orchestrator handle
//!
//! Built once at process start and shared by reference; owns the registry,
//! the background health checker, the dispatcher and the worker pool.

use chrono::Utc;
use orchlet_core::{
    InstanceSpec, InstanceStatus, OrchestratorConfig, OrchletError, OrchletResult,
    ServiceRequest, ServiceSummary, TransportConfig,
};
use orchlet_network::{HealthChecker, Instance, ServiceRegistry};
use orchlet_runtime::{
    event_types, EventSink, Executor, HttpExecutor, HttpProber, Prober, TracingEventSink,
};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatcher::Dispatcher;

/// External capabilities supplied by the embedder
#[derive(Clone)]
pub struct Capabilities {
    pub executor: Arc<dyn Executor>,
    pub prober: Arc<dyn Prober>,
    pub events: Arc<dyn EventSink>,
}

impl Capabilities {
    /// HTTP executor and prober with a tracing event sink
    pub fn http(transport: &TransportConfig) -> OrchletResult<Self> {
        Ok(Self {
            executor: Arc::new(HttpExecutor::from_config(transport)?),
            prober: Arc::new(HttpProber::from_config(transport)?),
            events: Arc::new(TracingEventSink::new()),
        })
    }
}

/// Orchestrator-wide counters
#[derive(Debug, Clone, serde::Serialize)]
pub struct OrchestratorStatus {
    pub services: usize,
    pub instances: usize,
    pub idle_workers: usize,
    pub shutting_down: bool,
}

/// Client-side service orchestrator
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<ServiceRegistry>,
    dispatcher: Arc<Dispatcher>,
    events: Arc<dyn EventSink>,
    /// Bounds concurrent dispatches
    workers: Arc<Semaphore>,
    shutdown: CancellationToken,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Validate the configuration and start the background health checker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: OrchestratorConfig, capabilities: Capabilities) -> OrchletResult<Self> {
        config.validate()?;

        let registry = Arc::new(ServiceRegistry::new(config.lb_strategy));
        let shutdown = CancellationToken::new();

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            capabilities.executor,
            Arc::clone(&capabilities.events),
            config.dispatch.clone(),
            config.breaker.timeout(),
            shutdown.child_token(),
        ));

        let health_task = HealthChecker::new(
            Arc::clone(&registry),
            capabilities.prober,
            Arc::clone(&capabilities.events),
            config.health.interval(),
            config.breaker.failure_threshold,
        )
        .spawn(shutdown.child_token());

        info!(
            strategy = ?config.lb_strategy,
            workers = config.dispatch.worker_pool_size,
            max_retry_attempts = config.dispatch.max_retry_attempts,
            health_interval_secs = config.health.interval_secs,
            breaker_timeout_ms = config.breaker.timeout_ms,
            "Orchestrator started"
        );

        Ok(Self {
            workers: Arc::new(Semaphore::new(config.dispatch.worker_pool_size)),
            config,
            registry,
            dispatcher,
            events: capabilities.events,
            shutdown,
            health_task: Mutex::new(Some(health_task)),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Register a new instance of a service
    pub async fn register(
        &self,
        service_name: &str,
        instance_id: &str,
        host: &str,
        port: u16,
    ) -> Arc<Instance> {
        self.register_spec(InstanceSpec::new(service_name, instance_id, host, port))
            .await
    }

    /// Register an instance from its spec
    pub async fn register_spec(&self, spec: InstanceSpec) -> Arc<Instance> {
        let instance = self.registry.register(spec).await;

        info!(
            service = instance.service_name(),
            instance_id = instance.id(),
            endpoint = %instance.spec().endpoint,
            "Instance registered"
        );
        self.events.log_event(
            event_types::INSTANCE_REGISTERED,
            &format!(
                "{}/{} at {}",
                instance.service_name(),
                instance.id(),
                instance.spec().endpoint
            ),
            Utc::now(),
        );

        instance
    }

    /// Execute a request against a service.
    ///
    /// The request runs on the worker pool; dropping the returned future does
    /// not cancel it.
    pub fn execute_request(&self, service_name: &str, payload: Value) -> PendingRequest {
        self.submit(ServiceRequest::new(service_name, payload))
    }

    /// Submit a prepared request to the worker pool
    pub fn submit(&self, request: ServiceRequest) -> PendingRequest {
        let dispatcher = Arc::clone(&self.dispatcher);
        let workers = Arc::clone(&self.workers);
        let request_id = request.id;

        let handle = tokio::spawn(async move {
            let _permit = workers.acquire_owned().await.map_err(|_| {
                OrchletError::ServiceUnavailable("orchestrator is shutting down".to_string())
            })?;
            dispatcher.dispatch(&request).await
        });

        PendingRequest { request_id, handle }
    }

    /// Status of every instance of a service
    pub async fn instances(&self, service_name: &str) -> Vec<InstanceStatus> {
        self.registry
            .instance_statuses(service_name, self.config.breaker.timeout())
            .await
    }

    /// Summaries of all services
    pub async fn services(&self) -> Vec<ServiceSummary> {
        self.registry.summaries(self.config.breaker.timeout()).await
    }

    /// Orchestrator-wide counters
    pub async fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            services: self.registry.service_names().await.len(),
            instances: self.registry.all_instances().await.len(),
            idle_workers: self.workers.available_permits(),
            shutting_down: self.shutdown.is_cancelled(),
        }
    }

    /// Stop health checking, refuse new requests and interrupt backoffs
    pub async fn shutdown(&self) {
        info!("Shutting down orchestrator");
        self.shutdown.cancel();
        self.workers.close();

        if let Some(handle) = self.health_task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Health checker task ended abnormally");
            }
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A request running on the worker pool
#[derive(Debug)]
pub struct PendingRequest {
    request_id: Uuid,
    handle: JoinHandle<OrchletResult<Value>>,
}

impl PendingRequest {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

impl Future for PendingRequest {
    type Output = OrchletResult<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) => Err(OrchletError::Internal(format!(
                "dispatch task failed: {}",
                e
            ))),
        })
    }
}
