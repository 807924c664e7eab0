//! StreamGate Web - HTTP API server
//!
//! Exposes the entitlement-gated streaming path over HTTP: the
//! `/stream/{kind}/{id}` endpoint with full Range semantics, plus health
//! and runtime statistics endpoints.

pub mod handlers;
pub mod metrics;
pub mod server;

pub use metrics::StreamingMetrics;
pub use server::{AppState, router, run_server};
