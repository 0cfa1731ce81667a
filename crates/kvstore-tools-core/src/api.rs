// crates/kvstore-tools-core/src/api.rs
// ============================================================================
// Module: KV Store REST API Client
// Description: Typed calls over the KV store collection and admin endpoints.
// Purpose: Build URLs, attach auth, map statuses, decode listing payloads.
// Dependencies: serde, serde_json, thiserror, tracing, url
// ============================================================================

//! ## Overview
//! [`KvStoreApi`] wraps a [`Transport`] and a [`KvStoreEndpoint`] and exposes
//! one method per REST call the engine needs. All namespaced calls use the
//! `nobody` owner and `output_mode=json`.
//! Invariants:
//! - Every non-2xx status becomes [`ApiError::Status`].
//! - No call is retried.
//! - Page bodies are returned as raw text and never parsed here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;
use url::form_urlencoded;

use crate::identity::CollectionIdentity;
use crate::identity::SharingLevel;
use crate::transport::HttpMethod;
use crate::transport::Transport;
use crate::transport::TransportError;
use crate::transport::TransportRequest;
use crate::transport::TransportResponse;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Namespace owner used for every collection call.
const OWNER: &str = "nobody";
/// Maximum number of body bytes echoed into error messages.
const MAX_ERROR_BODY_CHARS: usize = 512;
/// Default authorization scheme for session tokens.
pub const DEFAULT_AUTH_SCHEME: &str = "Splunk";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors returned by [`KvStoreApi`] calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The endpoint base URI cannot be used to build request URLs.
    #[error("invalid base uri {uri}: {reason}")]
    InvalidBaseUri {
        /// Offending URI.
        uri: String,
        /// Parse failure.
        reason: String,
    },
    /// The request never produced a response.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The server answered with a non-2xx status.
    #[error("http status {status} from {url}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Request URL.
        url: String,
        /// Truncated response body.
        body: String,
    },
    /// The response body did not have the expected shape.
    #[error("unexpected response from {url}: {reason}")]
    Decode {
        /// Request URL.
        url: String,
        /// Decode failure.
        reason: String,
    },
}

// ============================================================================
// SECTION: Endpoint
// ============================================================================

/// Opaque session token obtained by login or handed over by the host.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a raw token. A leading `Splunk ` scheme prefix is dropped.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        let token = trimmed
            .strip_prefix(DEFAULT_AUTH_SCHEME)
            .and_then(|rest| rest.strip_prefix(' '))
            .map_or(trimmed, str::trim_start)
            .to_string();
        Self(token)
    }

    /// Returns the raw token text.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// A KV store host plus the credentials used against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvStoreEndpoint {
    /// Base URI, for example `https://search01:8089`.
    pub base_uri: String,
    /// Session token.
    pub token: SessionToken,
    /// Authorization scheme placed before the token.
    pub auth_scheme: String,
}

impl KvStoreEndpoint {
    /// Creates an endpoint using the default authorization scheme.
    #[must_use]
    pub fn new(base_uri: impl Into<String>, token: SessionToken) -> Self {
        Self {
            base_uri: base_uri.into(),
            token,
            auth_scheme: DEFAULT_AUTH_SCHEME.to_string(),
        }
    }

    /// Returns the `Authorization` header value.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("{} {}", self.auth_scheme, self.token.expose())
    }

    /// Returns the host portion of the base URI for log lines.
    #[must_use]
    pub fn host_label(&self) -> String {
        Url::parse(&self.base_uri)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| self.base_uri.clone())
    }
}

// ============================================================================
// SECTION: Listing Payloads
// ============================================================================

/// Generic `{"entry": [...]}` listing envelope.
#[derive(Debug, Deserialize)]
struct Listing<T> {
    /// Listing entries.
    #[serde(default = "Vec::new")]
    entry: Vec<T>,
}

/// Entry of the local apps listing.
#[derive(Debug, Deserialize)]
struct AppEntry {
    /// App name.
    name: String,
    /// App content flags.
    #[serde(default)]
    content: AppContent,
}

/// Content block of an app entry.
#[derive(Debug, Default, Deserialize)]
struct AppContent {
    /// Whether the app is disabled.
    #[serde(default)]
    disabled: bool,
}

/// Entry of the collection config listing.
#[derive(Debug, Deserialize)]
struct CollectionEntry {
    /// Collection name.
    name: String,
    /// Access control block.
    acl: CollectionAcl,
}

/// ACL block of a collection entry.
#[derive(Debug, Deserialize)]
struct CollectionAcl {
    /// Owning app.
    app: String,
    /// Sharing level.
    #[serde(default)]
    sharing: SharingLevel,
}

/// Entry of the current-context endpoint.
#[derive(Debug, Deserialize)]
struct ContextEntry {
    /// Context content.
    content: CurrentContext,
}

/// Identity and capabilities of the calling user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CurrentContext {
    /// User name.
    #[serde(default)]
    pub username: String,
    /// Directly assigned roles.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Effective capabilities.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Entry of the roles listing.
#[derive(Debug, Deserialize)]
struct RoleEntry {
    /// Role name.
    name: String,
    /// Role content.
    #[serde(default)]
    content: RoleContent,
}

/// Content block of a role entry.
#[derive(Debug, Default, Deserialize)]
struct RoleContent {
    /// Roles this role inherits from.
    #[serde(default)]
    imported_roles: Vec<String>,
}

/// Entry of the users listing.
#[derive(Debug, Deserialize)]
struct UserEntryRaw {
    /// User name.
    name: String,
    /// User content.
    #[serde(default)]
    content: UserContent,
}

/// Content block of a user entry.
#[derive(Debug, Default, Deserialize)]
struct UserContent {
    /// Directly assigned roles.
    #[serde(default)]
    roles: Vec<String>,
}

/// A user and its directly assigned roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRoles {
    /// User name.
    pub name: String,
    /// Directly assigned roles.
    pub roles: Vec<String>,
}

/// Login response body.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    /// Issued session key.
    #[serde(rename = "sessionKey")]
    session_key: String,
}

// ============================================================================
// SECTION: API Client
// ============================================================================

/// Typed client for one KV store host.
#[derive(Clone)]
pub struct KvStoreApi {
    /// Shared transport.
    transport: Arc<dyn Transport>,
    /// Target host and credentials.
    endpoint: KvStoreEndpoint,
}

impl fmt::Debug for KvStoreApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvStoreApi").field("endpoint", &self.endpoint).finish_non_exhaustive()
    }
}

impl KvStoreApi {
    /// Creates a client for the endpoint.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, endpoint: KvStoreEndpoint) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    /// Returns the endpoint this client targets.
    #[must_use]
    pub const fn endpoint(&self) -> &KvStoreEndpoint {
        &self.endpoint
    }

    /// Lists enabled apps on the host.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport, status, or decode failures.
    pub fn list_apps(&self) -> Result<Vec<String>, ApiError> {
        let url = self.url(&["services", "apps", "local"], &[("count", "0")])?;
        let listing: Listing<AppEntry> = self.get_json(&url)?;
        Ok(listing
            .entry
            .into_iter()
            .filter(|entry| !entry.content.disabled)
            .map(|entry| entry.name)
            .collect())
    }

    /// Lists the collections visible from `app` with their ACL metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport, status, or decode failures.
    pub fn list_collections(&self, app: &str) -> Result<Vec<CollectionIdentity>, ApiError> {
        let url = self.namespaced_url(app, &["config"], &[("count", "0")])?;
        let listing: Listing<CollectionEntry> = self.get_json(&url)?;
        Ok(listing
            .entry
            .into_iter()
            .map(|entry| CollectionIdentity {
                app: entry.acl.app,
                name: entry.name,
                sharing: entry.acl.sharing,
            })
            .collect())
    }

    /// Fetches one page of records as raw response text.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or status failures.
    pub fn fetch_page(
        &self,
        collection: &CollectionIdentity,
        limit: usize,
        skip: usize,
    ) -> Result<String, ApiError> {
        let limit = limit.to_string();
        let skip = skip.to_string();
        let url = self.namespaced_url(
            &collection.app,
            &["data", &collection.name],
            &[("limit", &limit), ("skip", &skip)],
        )?;
        let response = self.execute(TransportRequest::new(HttpMethod::Get, url.clone()))?;
        Ok(response.text())
    }

    /// Deletes every record in the collection.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or status failures.
    pub fn clear_collection(&self, collection: &CollectionIdentity) -> Result<(), ApiError> {
        let url = self.namespaced_url(&collection.app, &["data", &collection.name], &[])?;
        self.execute(TransportRequest::new(HttpMethod::Delete, url))?;
        Ok(())
    }

    /// Deletes the record with the given key.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or status failures.
    pub fn delete_record(&self, collection: &CollectionIdentity, key: &str) -> Result<(), ApiError> {
        let url = self.namespaced_url(&collection.app, &["data", &collection.name, key], &[])?;
        self.execute(TransportRequest::new(HttpMethod::Delete, url))?;
        Ok(())
    }

    /// Saves a batch of records. `body` must be a JSON array.
    ///
    /// Returns the identifiers assigned by the server when the response
    /// carries them.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or status failures.
    pub fn batch_save(
        &self,
        collection: &CollectionIdentity,
        body: Vec<u8>,
    ) -> Result<Vec<String>, ApiError> {
        let url =
            self.namespaced_url(&collection.app, &["data", &collection.name, "batch_save"], &[])?;
        let request = TransportRequest::new(HttpMethod::Post, url).body(body);
        let response = self.execute(request)?;
        Ok(serde_json::from_slice::<Vec<String>>(&response.body).unwrap_or_default())
    }

    /// Returns the identity and capabilities of the session owner.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport, status, or decode failures.
    pub fn current_context(&self) -> Result<CurrentContext, ApiError> {
        let url = self.url(&["services", "authentication", "current-context"], &[])?;
        let listing: Listing<ContextEntry> = self.get_json(&url)?;
        listing.entry.into_iter().next().map(|entry| entry.content).ok_or_else(|| {
            ApiError::Decode {
                url,
                reason: "current context listing is empty".to_string(),
            }
        })
    }

    /// Returns the role graph as `role -> imported roles`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport, status, or decode failures.
    pub fn list_roles(&self) -> Result<BTreeMap<String, Vec<String>>, ApiError> {
        let url = self.url(&["services", "admin", "roles"], &[("count", "-1")])?;
        let listing: Listing<RoleEntry> = self.get_json(&url)?;
        Ok(listing
            .entry
            .into_iter()
            .map(|entry| (entry.name, entry.content.imported_roles))
            .collect())
    }

    /// Lists users with their directly assigned roles.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport, status, or decode failures.
    pub fn list_users(&self) -> Result<Vec<UserRoles>, ApiError> {
        let url = self.url(&["services", "admin", "users"], &[("count", "-1")])?;
        let listing: Listing<UserEntryRaw> = self.get_json(&url)?;
        Ok(listing
            .entry
            .into_iter()
            .map(|entry| UserRoles {
                name: entry.name,
                roles: entry.content.roles,
            })
            .collect())
    }

    // ------------------------------------------------------------------------
    // Request plumbing
    // ------------------------------------------------------------------------

    /// Sends a request with auth headers and maps non-2xx statuses.
    fn execute(&self, request: TransportRequest) -> Result<TransportResponse, ApiError> {
        let request = request
            .header("Authorization", self.endpoint.authorization())
            .header("Content-Type", "application/json");
        tracing::trace!(method = %request.method, url = %request.url, "kv store request");
        let response = self.transport.send(&request)?;
        check_status(&request.url, response)
    }

    /// Issues a GET and decodes the JSON body.
    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let response = self.execute(TransportRequest::new(HttpMethod::Get, url))?;
        serde_json::from_slice(&response.body).map_err(|err| ApiError::Decode {
            url: url.to_string(),
            reason: err.to_string(),
        })
    }

    /// Builds a `servicesNS/nobody/<app>/storage/collections/...` URL.
    fn namespaced_url(
        &self,
        app: &str,
        tail: &[&str],
        query: &[(&str, &str)],
    ) -> Result<String, ApiError> {
        let mut segments = vec!["servicesNS", OWNER, app, "storage", "collections"];
        segments.extend_from_slice(tail);
        self.url(&segments, query)
    }

    /// Builds an absolute URL under the endpoint base.
    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<String, ApiError> {
        build_url(&self.endpoint.base_uri, segments, query)
    }
}

// ============================================================================
// SECTION: Login
// ============================================================================

/// Exchanges a username and password for a session token.
///
/// # Errors
///
/// Returns [`ApiError`] when the login call fails or returns no session key.
pub fn login(
    transport: &dyn Transport,
    base_uri: &str,
    username: &str,
    password: &str,
) -> Result<SessionToken, ApiError> {
    let url = build_url(base_uri, &["services", "auth", "login"], &[])?;
    let form = form_urlencoded::Serializer::new(String::new())
        .append_pair("username", username)
        .append_pair("password", password)
        .finish();
    let request = TransportRequest::new(HttpMethod::Post, url.clone())
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(form.into_bytes());
    let response = check_status(&url, transport.send(&request)?)?;
    let parsed: LoginResponse =
        serde_json::from_slice(&response.body).map_err(|err| ApiError::Decode {
            url: url.clone(),
            reason: err.to_string(),
        })?;
    if parsed.session_key.trim().is_empty() {
        return Err(ApiError::Decode {
            url,
            reason: "empty session key".to_string(),
        });
    }
    Ok(SessionToken::new(parsed.session_key))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds an absolute URL from a base, path segments, and query pairs.
/// `output_mode=json` is always appended.
fn build_url(base_uri: &str, segments: &[&str], query: &[(&str, &str)]) -> Result<String, ApiError> {
    let invalid = |reason: String| ApiError::InvalidBaseUri {
        uri: base_uri.to_string(),
        reason,
    };
    let mut url = Url::parse(base_uri).map_err(|err| invalid(err.to_string()))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| invalid("base uri cannot carry a path".to_string()))?;
        path.pop_if_empty();
        path.extend(segments);
    }
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
        pairs.append_pair("output_mode", "json");
    }
    Ok(url.into())
}

/// Maps non-2xx responses into [`ApiError::Status`].
fn check_status(url: &str, response: TransportResponse) -> Result<TransportResponse, ApiError> {
    if response.is_success() {
        return Ok(response);
    }
    let body: String = response.text().chars().take(MAX_ERROR_BODY_CHARS).collect();
    Err(ApiError::Status {
        status: response.status,
        url: url.to_string(),
        body,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
