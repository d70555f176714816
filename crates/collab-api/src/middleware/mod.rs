//! # Middleware Stack
//!
//! Tower middleware for the API layer:
//! - [`tracing_layer`]: request/response tracing with `TraceLayer`.
//! - [`metrics`]: Prometheus HTTP and workflow metrics.

pub mod metrics;
pub mod tracing_layer;
