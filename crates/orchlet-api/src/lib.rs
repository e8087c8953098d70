//! orchlet-api: REST API server for orchlet
//!
//! This crate exposes an [`orchlet_dispatch::Orchestrator`] over HTTP:
//! - Instance registration and listing
//! - Request execution with retries and failover
//! - Service summaries and system status

pub mod rest;

pub use rest::{create_router, AppState};
