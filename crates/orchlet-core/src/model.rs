//! Instance, Endpoint, and Request type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Network endpoint for an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }

    /// Get the base URL for this endpoint
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Immutable identity of one backend instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    /// Identifier, unique within the service
    pub instance_id: String,
    /// Logical service this instance provides
    pub service_name: String,
    /// Where the instance listens
    pub endpoint: Endpoint,
}

impl InstanceSpec {
    /// Create a new instance spec
    pub fn new(
        service_name: impl Into<String>,
        instance_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            service_name: service_name.into(),
            endpoint: Endpoint::new(host.into(), port),
        }
    }
}

/// A request addressed to a logical service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// Unique request identifier
    pub id: Uuid,
    /// Target service
    pub service_name: String,
    /// Opaque payload handed to the executor
    pub payload: serde_json::Value,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl ServiceRequest {
    /// Create a new request
    pub fn new(service_name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_name: service_name.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitState {
    /// Traffic flows normally
    Closed,
    /// Traffic is blocked until the breaker timeout elapses
    Open,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "Closed"),
            CircuitState::Open => write!(f, "Open"),
        }
    }
}

/// Point-in-time view of one instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub instance_id: String,
    pub service_name: String,
    pub endpoint: Endpoint,
    /// Outcome of the last health probe
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub circuit_state: CircuitState,
    /// Whether the dispatcher would currently send traffic here
    pub accepting_traffic: bool,
    /// Requests currently being executed against this instance
    pub in_flight: usize,
    pub last_probe_at: Option<DateTime<Utc>>,
}

/// Aggregate view of one service group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub service_name: String,
    pub instances: usize,
    pub healthy_instances: usize,
    pub open_circuits: usize,
}

impl ServiceSummary {
    /// Build a summary from instance snapshots of the same service
    pub fn from_statuses(service_name: String, statuses: &[InstanceStatus]) -> Self {
        Self {
            service_name,
            instances: statuses.len(),
            healthy_instances: statuses.iter().filter(|s| s.healthy).count(),
            open_circuits: statuses
                .iter()
                .filter(|s| s.circuit_state == CircuitState::Open)
                .count(),
        }
    }
}
