//! orchlet-dispatch: Request dispatch and the orchestrator handle
//!
//! This crate ties the registry, health checker and capabilities together:
//! - Retrying dispatch with exponential backoff
//! - Circuit-aware instance selection
//! - A bounded worker pool for concurrent requests

pub mod dispatcher;
pub mod orchestrator;

pub use dispatcher::Dispatcher;
pub use orchestrator::{Capabilities, Orchestrator, OrchestratorStatus, PendingRequest};
