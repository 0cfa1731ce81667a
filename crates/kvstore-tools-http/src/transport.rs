// crates/kvstore-tools-http/src/transport.rs
// ============================================================================
// Module: HTTP Transport
// Description: reqwest blocking client behind the core Transport trait.
// Purpose: Send one request, read a size-limited body, report the status.
// Dependencies: kvstore-tools-core, reqwest, thiserror, tracing
// ============================================================================

//! ## Overview
//! The transport is deliberately thin: it maps methods and headers onto a
//! reqwest request, disables redirects, and reads the response body up to a
//! hard limit. Status interpretation belongs to the API client.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::io::Read;

use kvstore_tools_core::HttpMethod;
use kvstore_tools_core::Transport;
use kvstore_tools_core::TransportError;
use kvstore_tools_core::TransportRequest;
use kvstore_tools_core::TransportResponse;
use reqwest::Method;
use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::redirect::Policy;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default response body ceiling. A full 50,000-record page of wide
/// records stays well under this.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 512 * 1024 * 1024;

/// Configuration for [`HttpTransport`].
///
/// # Invariants
/// - `verify_tls = false` accepts any server certificate.
/// - `max_response_bytes` is a hard upper bound on response bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTransportConfig {
    /// Verify server certificates.
    pub verify_tls: bool,
    /// User agent string for outbound requests.
    pub user_agent: String,
    /// Maximum response size allowed, in bytes.
    pub max_response_bytes: usize,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            verify_tls: true,
            user_agent: concat!("kvstore-tools/", env!("CARGO_PKG_VERSION")).to_string(),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

/// Errors raised while constructing the transport.
#[derive(Debug, Error)]
pub enum HttpTransportError {
    /// The underlying HTTP client could not be built.
    #[error("http client build failed: {0}")]
    Build(String),
}

// ============================================================================
// SECTION: Transport
// ============================================================================

/// Blocking HTTP transport for KV store hosts.
pub struct HttpTransport {
    /// Transport configuration.
    config: HttpTransportConfig,
    /// Shared reqwest client.
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HttpTransportError`] when the HTTP client cannot be created.
    pub fn new(config: HttpTransportConfig) -> Result<Self, HttpTransportError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none())
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|err| HttpTransportError::Build(err.to_string()))?;
        Ok(Self {
            config,
            client,
        })
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &HttpTransportConfig {
        &self.config
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self.client.request(method_for(request.method), request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        let mut response = builder.send().map_err(|err| {
            if err.is_builder() {
                TransportError::InvalidRequest(err.to_string())
            } else {
                TransportError::Request(err.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let body = read_response_limited(&mut response, self.config.max_response_bytes)?;
        debug!(method = %request.method, status, bytes = body.len(), "http response");
        Ok(TransportResponse {
            status,
            body,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a core method onto the reqwest method.
const fn method_for(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Reads a response body while enforcing a maximum size.
fn read_response_limited(
    response: &mut Response,
    max_bytes: usize,
) -> Result<Vec<u8>, TransportError> {
    let too_large = || TransportError::TooLarge {
        max_bytes,
    };
    let max_bytes_u64 = u64::try_from(max_bytes).map_err(|_| too_large())?;
    if let Some(expected) = response.content_length()
        && expected > max_bytes_u64
    {
        return Err(too_large());
    }
    let mut buf = Vec::new();
    response
        .take(max_bytes_u64.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(|err| TransportError::Request(format!("failed to read response: {err}")))?;
    if buf.len() > max_bytes {
        return Err(too_large());
    }
    Ok(buf)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_verifies_tls() {
        let config = HttpTransportConfig::default();
        assert!(config.verify_tls);
        assert!(config.user_agent.starts_with("kvstore-tools/"));
    }

    #[test]
    fn methods_map_one_to_one() {
        assert_eq!(method_for(HttpMethod::Get), Method::GET);
        assert_eq!(method_for(HttpMethod::Post), Method::POST);
        assert_eq!(method_for(HttpMethod::Delete), Method::DELETE);
    }
}
