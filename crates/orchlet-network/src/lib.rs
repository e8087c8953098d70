//! orchlet-network: Instance tracking and selection
//!
//! This crate provides the shared state the orchestrator works on:
//! - Instance records with an embedded circuit breaker
//! - Load balancing strategies
//! - The service registry
//! - Background health checking

pub mod balancer;
pub mod breaker;
pub mod health;
pub mod instance;
pub mod registry;

pub use balancer::{
    balancer_for, LeastConnectionsBalancer, LoadBalancer, RandomBalancer, RoundRobinBalancer,
};
pub use breaker::CircuitBreaker;
pub use health::{HealthChecker, HealthCycleSummary};
pub use instance::{InFlightGuard, Instance, ProbeOutcome};
pub use registry::{ServiceGroup, ServiceRegistry};
