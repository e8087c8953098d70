//! orchlet-core: Core types and traits for the orchlet service orchestrator
//!
//! This crate provides the fundamental types used throughout orchlet:
//! - Instance identity, endpoints and service requests
//! - Circuit state and status snapshots
//! - Configuration types
//! - Error handling

pub mod config;
pub mod error;
pub mod model;

pub use config::*;
pub use error::*;
pub use model::*;
