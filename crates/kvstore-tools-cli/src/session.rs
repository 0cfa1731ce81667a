// crates/kvstore-tools-cli/src/session.rs
// ============================================================================
// Module: Sessions
// Description: Local and remote KV store clients for one invocation.
// Purpose: Resolve tokens and credentials into authenticated API handles.
// Dependencies: kvstore-tools-config, kvstore-tools-core, kvstore-tools-http, thiserror, tracing
// ============================================================================

//! ## Overview
//! The local store is reached with a session token taken from the
//! environment variable named in `local.token_env`. Remote hosts are reached
//! by logging in with the credential whose realm matches the host.
//! Every client shares one transport.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::sync::Arc;

use kvstore_tools_config::ConfigError;
use kvstore_tools_config::KvToolsConfig;
use kvstore_tools_core::ApiError;
use kvstore_tools_core::KvStoreApi;
use kvstore_tools_core::KvStoreEndpoint;
use kvstore_tools_core::SessionToken;
use kvstore_tools_core::Transport;
use kvstore_tools_core::login;
use kvstore_tools_http::HttpTransport;
use kvstore_tools_http::HttpTransportConfig;
use kvstore_tools_http::HttpTransportError;
use thiserror::Error;
use tracing::info;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failures obtaining an authenticated client; fatal for the invocation.
#[derive(Debug, Error)]
pub(crate) enum LoginError {
    /// The HTTP transport could not be built.
    #[error(transparent)]
    Transport(#[from] HttpTransportError),
    /// No local session token is available.
    #[error("local session token not found; set {variable}")]
    MissingToken {
        /// Environment variable that was checked.
        variable: String,
    },
    /// No credential matches the remote host.
    #[error("no credentials configured for {host}")]
    MissingCredential {
        /// Remote host.
        host: String,
    },
    /// The credential's password could not be read.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The remote host rejected the login.
    #[error("login to {host} failed: {source}")]
    Login {
        /// Remote host.
        host: String,
        /// Underlying API failure.
        #[source]
        source: ApiError,
    },
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Configuration plus the shared transport for one invocation.
pub(crate) struct Session {
    /// Loaded configuration.
    config: KvToolsConfig,
    /// Transport shared by every client.
    transport: Arc<dyn Transport>,
    /// Local session token, if one was provided.
    local_token: Option<SessionToken>,
}

impl Session {
    /// Builds a session over the HTTP transport, reading the local token
    /// from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Transport`] when the HTTP client cannot be built.
    pub(crate) fn new(config: KvToolsConfig) -> Result<Self, LoginError> {
        let transport = HttpTransport::new(HttpTransportConfig {
            verify_tls: config.http.verify_tls,
            ..HttpTransportConfig::default()
        })?;
        let local_token = env::var(&config.local.token_env)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(SessionToken::new);
        Ok(Self::with_transport(config, Arc::new(transport), local_token))
    }

    /// Builds a session over an explicit transport.
    pub(crate) fn with_transport(
        config: KvToolsConfig,
        transport: Arc<dyn Transport>,
        local_token: Option<SessionToken>,
    ) -> Self {
        Self {
            config,
            transport,
            local_token,
        }
    }

    /// Returns the loaded configuration.
    pub(crate) const fn config(&self) -> &KvToolsConfig {
        &self.config
    }

    /// Returns a client for the local store.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::MissingToken`] when no local token was provided.
    pub(crate) fn local_api(&self) -> Result<KvStoreApi, LoginError> {
        let token = self.local_token.clone().ok_or_else(|| LoginError::MissingToken {
            variable: self.config.local.token_env.clone(),
        })?;
        let endpoint = KvStoreEndpoint::new(self.config.local.uri.clone(), token);
        Ok(KvStoreApi::new(Arc::clone(&self.transport), endpoint))
    }

    /// Logs in to a remote host and returns a client for it.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError`] when no credential matches, the password is
    /// unavailable, or the login call fails.
    pub(crate) fn remote_api(&self, host: &str, port: Option<u16>) -> Result<KvStoreApi, LoginError> {
        let base_uri = remote_uri(host, port.unwrap_or(self.config.http.default_port));
        let credential = self.config.credential_for(host).ok_or_else(|| {
            LoginError::MissingCredential {
                host: host.to_string(),
            }
        })?;
        let password = credential.password()?;
        let token = login(self.transport.as_ref(), &base_uri, &credential.username, &password)
            .map_err(|source| LoginError::Login {
                host: host.to_string(),
                source,
            })?;
        info!(host, user = %credential.username, "remote session established");
        Ok(KvStoreApi::new(Arc::clone(&self.transport), KvStoreEndpoint::new(base_uri, token)))
    }
}

/// Management URI of a remote host.
pub(crate) fn remote_uri(host: &str, port: u16) -> String {
    format!("https://{}:{port}", host.trim())
}
