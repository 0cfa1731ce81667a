// crates/kvstore-tools-config/src/config.rs
// ============================================================================
// Module: KV Store Tools Configuration
// Description: Configuration loading and validation for the kvst tools.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, thiserror, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with a size limit, then expanded
//! and validated. Every section is optional and falls back to defaults that
//! match a stock installation.
//! Invariants:
//! - Page size and both remote limits are greater than zero.
//! - `settings.default_path` has no unexpanded `$VAR` references after load.
//! - Credential realms are unique (case-insensitive).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "kvstore-tools.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "KVST_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default records requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 50_000;
/// Default per-request document limit of a destination.
pub const DEFAULT_MAX_DOCUMENTS_PER_BATCH_SAVE: usize = 1_000;
/// Default server-side row cap for one query.
pub const DEFAULT_MAX_ROWS_PER_QUERY: usize = 50_000;
/// Default management port of remote hosts.
pub const DEFAULT_MANAGEMENT_PORT: u16 = 8089;
/// Name of the staging directory under the backup path.
const STAGING_DIR_NAME: &str = "staging";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Complete kvst configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KvToolsConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Backup and transfer settings.
    #[serde(default)]
    pub settings: SettingsConfig,
    /// Remote store limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Local KV store endpoint.
    #[serde(default)]
    pub local: LocalConfig,
    /// HTTP transport options.
    #[serde(default)]
    pub http: HttpConfig,
    /// Capability enforcement.
    #[serde(default)]
    pub authorization: AuthorizationConfig,
    /// Remote host credentials.
    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,
}

impl KvToolsConfig {
    /// Loads configuration from disk using the default resolution rules:
    /// the explicit path, then `KVST_CONFIG`, then `kvstore-tools.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        let bytes = fs::read(&resolved)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", resolved.display())))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::parse(content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Expands path variables and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        self.limits.validate()?;
        self.local.validate()?;
        self.http.validate()?;
        self.authorization.validate()?;
        let mut realms = BTreeSet::new();
        for credential in &self.credentials {
            credential.validate()?;
            if !realms.insert(credential.realm.to_ascii_lowercase()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate credential realm: {}",
                    credential.realm
                )));
            }
        }
        Ok(())
    }

    /// Finds the credential for a remote host: an exact realm match first,
    /// then a match on the host's first DNS label.
    #[must_use]
    pub fn credential_for(&self, host: &str) -> Option<&CredentialConfig> {
        let host = host.trim();
        let exact = self.credentials.iter().find(|entry| entry.realm.eq_ignore_ascii_case(host));
        exact.or_else(|| {
            let short = host.split('.').next().unwrap_or(host);
            self.credentials.iter().find(|entry| entry.realm.eq_ignore_ascii_case(short))
        })
    }
}

// ============================================================================
// SECTION: Logging
// ============================================================================

/// Log verbosity levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything, including per-request traces.
    Trace,
    /// Diagnostic detail.
    Debug,
    /// Normal progress.
    #[default]
    Info,
    /// Recoverable problems.
    Warn,
    /// Failures only.
    Error,
}

impl LogLevel {
    /// Returns the filter directive for this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Minimum level written.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional log file; stderr when absent.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Backup and transfer settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SettingsConfig {
    /// Backup directory. `$VAR` and `${VAR}` references are expanded on load.
    #[serde(default = "default_backup_path")]
    pub default_path: PathBuf,
    /// Records requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Gzip backups by default.
    #[serde(default)]
    pub compression: bool,
    /// Maximum backup age in days; zero disables the age threshold.
    #[serde(default)]
    pub retention_days: u64,
    /// Maximum total backup size in megabytes; zero disables the size threshold.
    #[serde(default)]
    pub retention_size_mb: u64,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            default_path: default_backup_path(),
            page_size: DEFAULT_PAGE_SIZE,
            compression: false,
            retention_days: 0,
            retention_size_mb: 0,
        }
    }
}

impl SettingsConfig {
    /// Returns the directory used for transient transfer artifacts.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.default_path.join(STAGING_DIR_NAME)
    }

    /// Expands variables in `default_path` and checks numeric settings.
    fn validate(&mut self) -> Result<(), ConfigError> {
        let raw = self
            .default_path
            .to_str()
            .ok_or_else(|| ConfigError::Invalid("settings.default_path must be utf-8".to_string()))?;
        let expanded = expand_vars(raw, |name| env::var(name).ok())?;
        if expanded.trim().is_empty() {
            return Err(ConfigError::Invalid("settings.default_path must be set".to_string()));
        }
        if expanded.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid(
                "settings.default_path exceeds max length".to_string(),
            ));
        }
        self.default_path = PathBuf::from(expanded);
        if self.page_size == 0 {
            return Err(ConfigError::Invalid(
                "settings.page_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Limits enforced by the remote KV store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LimitsConfig {
    /// Maximum documents accepted by one batch save.
    #[serde(default = "default_max_documents_per_batch_save")]
    pub max_documents_per_batch_save: usize,
    /// Maximum rows returned by one query.
    #[serde(default = "default_max_rows_per_query")]
    pub max_rows_per_query: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_documents_per_batch_save: DEFAULT_MAX_DOCUMENTS_PER_BATCH_SAVE,
            max_rows_per_query: DEFAULT_MAX_ROWS_PER_QUERY,
        }
    }
}

impl LimitsConfig {
    /// Rejects zero limits.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_documents_per_batch_save == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_documents_per_batch_save must be greater than zero".to_string(),
            ));
        }
        if self.max_rows_per_query == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_rows_per_query must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Endpoints
// ============================================================================

/// Local KV store endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocalConfig {
    /// Management URI of the local instance.
    #[serde(default = "default_local_uri")]
    pub uri: String,
    /// Environment variable holding the local session token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            uri: default_local_uri(),
            token_env: default_token_env(),
        }
    }
}

impl LocalConfig {
    /// Checks the URI scheme and token variable name.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.uri.starts_with("https://") || self.uri.starts_with("http://")) {
            return Err(ConfigError::Invalid(format!(
                "local.uri must be an http or https url: {}",
                self.uri
            )));
        }
        validate_non_empty("local.token_env", &self.token_env)
    }
}

/// HTTP transport options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpConfig {
    /// Verify server certificates.
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    /// Management port used for remote hosts given without `--port`.
    #[serde(default = "default_management_port")]
    pub default_port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            verify_tls: true,
            default_port: DEFAULT_MANAGEMENT_PORT,
        }
    }
}

impl HttpConfig {
    /// Rejects port zero.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_port == 0 {
            return Err(ConfigError::Invalid("http.default_port must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Capability enforcement settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthorizationConfig {
    /// Require the per-operation capability before running.
    #[serde(default = "default_true")]
    pub enforce: bool,
    /// Role (direct or inherited) required for key deletes.
    #[serde(default)]
    pub delete_role: Option<String>,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            enforce: true,
            delete_role: None,
        }
    }
}

impl AuthorizationConfig {
    /// Rejects a blank delete role.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(role) = &self.delete_role {
            validate_non_empty("authorization.delete_role", role)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Credentials
// ============================================================================

/// Username and password source for one remote realm.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CredentialConfig {
    /// Host name or short host label this credential applies to.
    pub realm: String,
    /// Remote username.
    pub username: String,
    /// Environment variable holding the password.
    pub password_env: String,
}

impl CredentialConfig {
    /// Reads the password from its environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the variable is unset or empty.
    pub fn password(&self) -> Result<String, ConfigError> {
        match env::var(&self.password_env) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(ConfigError::Invalid(format!(
                "password variable {} for realm {} is not set",
                self.password_env, self.realm
            ))),
        }
    }

    /// Checks required fields.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_non_empty("credentials.realm", &self.realm)?;
        validate_non_empty("credentials.username", &self.username)?;
        validate_non_empty("credentials.password_env", &self.password_env)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Expands `$NAME` and `${NAME}` references using `lookup`. A `$` that does
/// not start a variable name is kept literally.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when a referenced variable is unset or a
/// `${` is not closed.
pub fn expand_vars(
    value: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(index) = rest.find('$') {
        out.push_str(&rest[.. index]);
        let after = &rest[index + 1 ..];
        let (name, tail) = if let Some(braced) = after.strip_prefix('{') {
            let end = braced
                .find('}')
                .ok_or_else(|| ConfigError::Invalid(format!("unclosed variable in {value}")))?;
            (&braced[.. end], &braced[end + 1 ..])
        } else {
            let end = after
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .unwrap_or(after.len());
            (&after[.. end], &after[end ..])
        };
        if name.is_empty() {
            out.push('$');
            rest = after;
            continue;
        }
        let resolved = lookup(name).ok_or_else(|| {
            ConfigError::Invalid(format!("environment variable {name} is not set"))
        })?;
        out.push_str(&resolved);
        rest = tail;
    }
    out.push_str(rest);
    Ok(out)
}

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Rejects blank required strings.
fn validate_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be set")));
    }
    Ok(())
}

/// Default backup directory.
fn default_backup_path() -> PathBuf {
    PathBuf::from("backups")
}

/// Default page size.
const fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// Default batch save limit.
const fn default_max_documents_per_batch_save() -> usize {
    DEFAULT_MAX_DOCUMENTS_PER_BATCH_SAVE
}

/// Default query row cap.
const fn default_max_rows_per_query() -> usize {
    DEFAULT_MAX_ROWS_PER_QUERY
}

/// Default local management URI.
fn default_local_uri() -> String {
    "https://127.0.0.1:8089".to_string()
}

/// Default local token variable.
fn default_token_env() -> String {
    "KVST_SESSION_TOKEN".to_string()
}

/// Default management port.
const fn default_management_port() -> u16 {
    DEFAULT_MANAGEMENT_PORT
}

/// Serde default for flags that are on unless disabled.
const fn default_true() -> bool {
    true
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "HOME" => Some("/home/kv".to_string()),
            "APP" => Some("kvstore_tools".to_string()),
            _ => None,
        }
    }

    #[test]
    fn expand_vars_handles_both_forms() {
        assert_eq!(expand_vars("$HOME/backups", lookup).unwrap(), "/home/kv/backups");
        assert_eq!(
            expand_vars("${HOME}/etc/apps/${APP}_data", lookup).unwrap(),
            "/home/kv/etc/apps/kvstore_tools_data"
        );
        assert_eq!(expand_vars("/plain/path", lookup).unwrap(), "/plain/path");
    }

    #[test]
    fn expand_vars_keeps_lone_dollar_and_rejects_unknown() {
        assert_eq!(expand_vars("/cost/$/x", lookup).unwrap(), "/cost/$/x");
        assert!(expand_vars("$MISSING/x", lookup).is_err());
        assert!(expand_vars("${HOME/x", lookup).is_err());
    }

    #[test]
    fn credential_lookup_prefers_exact_realm() {
        let config = KvToolsConfig {
            credentials: vec![
                CredentialConfig {
                    realm: "search01".to_string(),
                    username: "short".to_string(),
                    password_env: "P1".to_string(),
                },
                CredentialConfig {
                    realm: "search01.example.com".to_string(),
                    username: "exact".to_string(),
                    password_env: "P2".to_string(),
                },
            ],
            ..KvToolsConfig::default()
        };
        assert_eq!(config.credential_for("SEARCH01.example.com").unwrap().username, "exact");
        assert_eq!(config.credential_for("search01.other.net").unwrap().username, "short");
        assert!(config.credential_for("search02").is_none());
    }

    #[test]
    fn staging_dir_lives_under_backup_path() {
        let settings = SettingsConfig {
            default_path: PathBuf::from("/data/kv"),
            ..SettingsConfig::default()
        };
        assert_eq!(settings.staging_dir(), PathBuf::from("/data/kv/staging"));
    }
}
