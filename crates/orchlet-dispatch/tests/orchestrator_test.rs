//! End-to-end behaviour of the orchestrator with scripted capabilities

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orchlet_core::{
    CircuitState, InstanceSpec, OrchestratorConfig, OrchletError, OrchletResult, ServiceRequest,
};
use orchlet_dispatch::{Capabilities, Orchestrator};
use orchlet_runtime::{event_types, EventSink, Executor, Prober};
use serde_json::{json, Value};
use std::error::Error as _;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Fails the first `failures` calls, then answers with the instance id
struct ScriptedExecutor {
    failures: usize,
    calls: AtomicUsize,
    targets: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn failing(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
            targets: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, instance: &InstanceSpec, _request: &ServiceRequest) -> OrchletResult<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.targets
            .lock()
            .unwrap()
            .push(instance.instance_id.clone());
        if call <= self.failures {
            return Err(OrchletError::Network(format!("call {} refused", call)));
        }
        Ok(json!({ "served_by": instance.instance_id }))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Answers healthy or raises, switchable at runtime
struct SwitchProber {
    healthy: AtomicBool,
}

impl SwitchProber {
    fn new(healthy: bool) -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(healthy),
        })
    }

    fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl Prober for SwitchProber {
    async fn health_check(&self, _instance: &InstanceSpec) -> OrchletResult<bool> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(true)
        } else {
            Err(OrchletError::Network("connection refused".to_string()))
        }
    }

    fn name(&self) -> &'static str {
        "switch"
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<String>>,
    probe_failures: AtomicUsize,
}

impl RecordingSink {
    fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.as_str() == event_type)
            .count()
    }
}

impl EventSink for RecordingSink {
    fn log_health_check_failure(&self, _service_name: &str, _instance_id: &str, _error: &OrchletError) {
        self.probe_failures.fetch_add(1, Ordering::SeqCst);
    }

    fn log_event(&self, event_type: &str, _detail: &str, _timestamp: DateTime<Utc>) {
        self.events.lock().unwrap().push(event_type.to_string());
    }
}

/// Holds each call for a fixed delay and records peak concurrency
struct SlowExecutor {
    delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl SlowExecutor {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Executor for SlowExecutor {
    async fn execute(&self, _instance: &InstanceSpec, _request: &ServiceRequest) -> OrchletResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(Value::Null)
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

fn start(
    executor: Arc<ScriptedExecutor>,
    prober: Arc<SwitchProber>,
    sink: Arc<RecordingSink>,
) -> Orchestrator {
    let capabilities = Capabilities {
        executor,
        prober,
        events: sink,
    };
    Orchestrator::start(OrchestratorConfig::default(), capabilities).unwrap()
}

#[tokio::test(start_paused = true)]
async fn unknown_service_fails_without_attempts() {
    let executor = ScriptedExecutor::failing(0);
    let orchestrator = start(executor.clone(), SwitchProber::new(true), Arc::default());

    let started = Instant::now();
    let err = orchestrator
        .execute_request("missing", json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, OrchletError::ServiceUnavailable(_)));
    assert_eq!(executor.calls(), 0);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn two_failures_then_success_backs_off_200_then_400ms() {
    let executor = ScriptedExecutor::failing(2);
    let orchestrator = start(executor.clone(), SwitchProber::new(true), Arc::default());
    orchestrator
        .register("billing", "billing-1", "127.0.0.1", 7000)
        .await;

    let started = Instant::now();
    let value = orchestrator
        .execute_request("billing", json!({ "amount": 10 }))
        .await
        .unwrap();

    assert_eq!(value["served_by"], "billing-1");
    assert_eq!(executor.calls(), 3);
    assert_eq!(started.elapsed(), Duration::from_millis(600));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_wrap_last_error() {
    let executor = ScriptedExecutor::failing(usize::MAX);
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = start(executor.clone(), SwitchProber::new(true), sink.clone());
    orchestrator
        .register("billing", "billing-1", "127.0.0.1", 7000)
        .await;

    let started = Instant::now();
    let err = orchestrator
        .execute_request("billing", json!({}))
        .await
        .unwrap_err();

    match &err {
        OrchletError::RetriesExhausted { attempts, .. } => assert_eq!(*attempts, 3),
        other => panic!("unexpected error: {:?}", other),
    }
    let source = err.source().unwrap().to_string();
    assert!(source.contains("call 3 refused"), "{}", source);
    assert_eq!(executor.calls(), 3);
    // No sleep follows the final attempt
    assert_eq!(started.elapsed(), Duration::from_millis(600));
    assert_eq!(sink.count(event_types::ATTEMPT_FAILED), 3);
    assert_eq!(sink.count(event_types::RETRIES_EXHAUSTED), 1);
}

#[tokio::test(start_paused = true)]
async fn round_robin_visits_instances_in_registration_order() {
    let executor = ScriptedExecutor::failing(0);
    let orchestrator = start(executor.clone(), SwitchProber::new(true), Arc::default());
    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        orchestrator
            .register("search", id, "127.0.0.1", 7100 + i as u16)
            .await;
    }

    for _ in 0..6 {
        orchestrator
            .execute_request("search", json!({}))
            .await
            .unwrap();
    }

    assert_eq!(
        executor.targets.lock().unwrap().as_slice(),
        &["a", "b", "c", "a", "b", "c"]
    );
}

#[tokio::test(start_paused = true)]
async fn circuit_opens_on_sixth_failed_probe_and_recovers_after_timeout() {
    let executor = ScriptedExecutor::failing(0);
    let prober = SwitchProber::new(false);
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = start(executor.clone(), prober.clone(), sink.clone());
    let instance = orchestrator
        .register("billing", "billing-1", "127.0.0.1", 7000)
        .await;

    // Cycles run at 0s, 30s, ... so five failures are in by 121s
    tokio::time::sleep(Duration::from_secs(121)).await;
    assert_eq!(instance.consecutive_failures().await, 5);
    assert_eq!(instance.circuit_state().await, CircuitState::Closed);

    // The sixth cycle at 150s opens the circuit
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(instance.circuit_state().await, CircuitState::Open);
    assert_eq!(sink.count(event_types::CIRCUIT_OPENED), 1);
    prober.set_healthy(true);

    // Still inside the breaker timeout: the only instance is skipped
    tokio::time::sleep(Duration::from_secs(28)).await;
    let err = orchestrator
        .execute_request("billing", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchletError::ServiceUnavailable(_)));
    assert_eq!(executor.calls(), 0);

    // Past the timeout it is eligible again without a prior success
    tokio::time::sleep(Duration::from_secs(2)).await;
    let value = orchestrator
        .execute_request("billing", json!({}))
        .await
        .unwrap();
    assert_eq!(value["served_by"], "billing-1");
    assert_eq!(instance.circuit_state().await, CircuitState::Closed);
    assert_eq!(instance.consecutive_failures().await, 0);
    assert_eq!(sink.probe_failures.load(Ordering::SeqCst), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registration_keeps_every_instance() {
    let orchestrator = Arc::new(start(
        ScriptedExecutor::failing(0),
        SwitchProber::new(true),
        Arc::default(),
    ));

    let handles: Vec<_> = (0..50u16)
        .map(|i| {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                orchestrator
                    .register("billing", &format!("billing-{}", i), "127.0.0.1", 7000 + i)
                    .await;
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(orchestrator.instances("billing").await.len(), 50);
    let status = orchestrator.status().await;
    assert_eq!(status.services, 1);
    assert_eq!(status.instances, 50);

    orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_request_in_backoff() {
    let executor = ScriptedExecutor::failing(usize::MAX);
    let orchestrator = Arc::new(start(executor.clone(), SwitchProber::new(true), Arc::default()));
    orchestrator
        .register("billing", "billing-1", "127.0.0.1", 7000)
        .await;

    let pending = orchestrator.execute_request("billing", json!({}));
    // First attempt fails at 0ms; the 200ms backoff is under way
    tokio::time::sleep(Duration::from_millis(50)).await;
    orchestrator.shutdown().await;

    let err = pending.await.unwrap_err();
    assert!(matches!(err, OrchletError::InterruptedDuringBackoff(_)));
    assert_eq!(executor.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn worker_pool_bounds_concurrent_dispatches() {
    let mut config = OrchestratorConfig::default();
    config.dispatch.worker_pool_size = 2;
    let executor = SlowExecutor::new(Duration::from_millis(50));
    let capabilities = Capabilities {
        executor: executor.clone(),
        prober: SwitchProber::new(true),
        events: Arc::new(RecordingSink::default()),
    };
    let orchestrator = Orchestrator::start(config, capabilities).unwrap();
    orchestrator
        .register("billing", "billing-1", "127.0.0.1", 7000)
        .await;
    orchestrator
        .register("billing", "billing-2", "127.0.0.1", 7001)
        .await;

    let started = Instant::now();
    let pending: Vec<_> = (0..10)
        .map(|i| orchestrator.execute_request("billing", json!({ "n": i })))
        .collect();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(orchestrator.status().await.idle_workers, 0);

    for request in pending {
        request.await.unwrap();
    }

    assert_eq!(executor.calls.load(Ordering::SeqCst), 10);
    assert_eq!(executor.peak.load(Ordering::SeqCst), 2);
    // Ten requests through two workers run in five waves
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert_eq!(orchestrator.status().await.idle_workers, 2);
}
