//! Integration tests for StreamGate
//!
//! These tests verify the integration between different components of the
//! system: the fan-out pool under concurrent request load, and the full
//! HTTP path from a live server through the gate to framed byte delivery.

#[path = "integration/fanout_load.rs"]
mod fanout_load;

#[path = "integration/http_streaming.rs"]
mod http_streaming;
