// crates/kvstore-tools-http/src/lib.rs
// ============================================================================
// Module: KV Store HTTP Transport
// Description: Blocking reqwest implementation of the core transport seam.
// Purpose: Carry KV store REST calls over HTTPS with bounded response bodies.
// Dependencies: kvstore-tools-core, reqwest, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`HttpTransport`] sends [`kvstore_tools_core::TransportRequest`] values
//! through a blocking reqwest client. Invariants:
//! - Redirects are never followed.
//! - Response bodies larger than `max_response_bytes` fail closed.
//! - Non-2xx statuses are returned to the caller as responses.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod transport;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use transport::HttpTransport;
pub use transport::HttpTransportConfig;
pub use transport::HttpTransportError;
