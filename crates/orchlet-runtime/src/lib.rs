//! orchlet-runtime: External capabilities used by the orchestrator core
//!
//! This crate defines how the orchestrator reaches the outside world:
//! - `Executor` runs a request against an instance
//! - `Prober` checks whether an instance is serving
//! - `EventSink` receives monitoring events
//!
//! Default HTTP and tracing-backed implementations are provided.

pub mod events;
pub mod http;
pub mod traits;

pub use events::{event_types, TracingEventSink};
pub use http::{HttpExecutor, HttpProber};
pub use traits::{EventSink, Executor, Prober};
