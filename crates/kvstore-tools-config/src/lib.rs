// crates/kvstore-tools-config/src/lib.rs
// ============================================================================
// Module: KV Store Tools Config
// Description: TOML configuration for the kvst command set.
// Purpose: Load, expand, and validate settings before any transfer runs.
// Dependencies: serde, thiserror, toml
// ============================================================================

//! ## Overview
//! A single [`KvToolsConfig`] carries logging, backup settings, remote
//! limits, the local endpoint, HTTP options, and remote credentials.
//! Loading fails closed: unknown values, zero limits, and unset path
//! variables are rejected before anything touches a KV store.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AuthorizationConfig;
pub use config::ConfigError;
pub use config::CredentialConfig;
pub use config::HttpConfig;
pub use config::KvToolsConfig;
pub use config::LimitsConfig;
pub use config::LocalConfig;
pub use config::LogLevel;
pub use config::LoggingConfig;
pub use config::SettingsConfig;
pub use config::expand_vars;
