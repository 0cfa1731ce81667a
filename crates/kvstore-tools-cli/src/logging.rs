// crates/kvstore-tools-cli/src/logging.rs
// ============================================================================
// Module: Logging Setup
// Description: tracing-subscriber installation for the kvst binary.
// Purpose: Route engine events to stderr or a log file at the chosen level.
// Dependencies: kvstore-tools-config, thiserror, tracing-subscriber
// ============================================================================

//! ## Overview
//! `KVST_LOG` holds `EnvFilter` directives and overrides the configured
//! `logging.level`. Log output never goes to stdout, which carries results.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use kvstore_tools_config::LogLevel;
use kvstore_tools_config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable overriding the configured log level.
pub(crate) const LOG_ENV_VAR: &str = "KVST_LOG";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Logging installation failures.
#[derive(Debug, Error)]
pub(crate) enum LoggingError {
    /// `KVST_LOG` holds invalid directives.
    #[error("invalid KVST_LOG directives '{directives}': {reason}")]
    Filter {
        /// Rejected directive string.
        directives: String,
        /// Parser message.
        reason: String,
    },
    /// The log file could not be opened.
    #[error("unable to open log file {}: {source}", path.display())]
    File {
        /// Log file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// A global subscriber was already installed.
    #[error("logging already initialized: {0}")]
    Install(String),
}

// ============================================================================
// SECTION: Setup
// ============================================================================

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns [`LoggingError`] on bad directives, an unopenable log file, or a
/// second installation.
pub(crate) fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_value = env::var(LOG_ENV_VAR).ok();
    let filter = resolve_filter(env_value.as_deref(), config.level)?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path).map_err(|source| {
                LoggingError::File {
                    path: path.clone(),
                    source,
                }
            })?;
            registry
                .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false).with_target(true))
                .try_init()
        }
        None => registry.with(fmt::layer().with_writer(io::stderr).with_target(true)).try_init(),
    };
    installed.map_err(|err| LoggingError::Install(err.to_string()))
}

/// Builds the filter from `KVST_LOG` when set, else from the configured level.
pub(crate) fn resolve_filter(
    env_value: Option<&str>,
    level: LogLevel,
) -> Result<EnvFilter, LoggingError> {
    match env_value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives).map_err(|err| LoggingError::Filter {
            directives: directives.to_string(),
            reason: err.to_string(),
        }),
        None => Ok(EnvFilter::new(level.as_str())),
    }
}
