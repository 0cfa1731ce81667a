// crates/kvstore-tools-cli/src/main.rs
// ============================================================================
// Module: kvst CLI Entry Point
// Description: Command dispatcher for KV store backup, restore, and transfers.
// Purpose: Wire configuration, logging, and sessions into the core engine.
// Dependencies: clap, kvstore-tools-config, kvstore-tools-core, kvstore-tools-http, thiserror
// ============================================================================

//! ## Overview
//! `kvst` runs one operation per invocation and prints one JSON line per
//! attempted collection (or key, or deleted file) on stdout. Setup failures
//! (configuration, login, authorization, enumeration) print one message to
//! stderr. The exit status is 1 when setup fails or any result is `error`.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod commands;
mod logging;
#[cfg(test)]
mod main_tests;
mod session;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use kvstore_tools_config::KvToolsConfig;
use kvstore_tools_core::CollectionFilter;
use thiserror::Error;

use crate::commands::ResultWriter;
use crate::session::Session;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "kvst", version, about = "KV store backup, restore, and transfer tools")]
struct Cli {
    /// Config file path (defaults to kvstore-tools.toml or `KVST_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Back up local collections to files.
    Backup(BackupCommand),
    /// Restore backup files into local collections, or list them.
    Restore(RestoreCommand),
    /// Copy local collections to one or more remote hosts.
    Push(PushCommand),
    /// Copy collections from a remote host into the local store.
    Pull(PullCommand),
    /// Copy collections from one remote host to another.
    Migrate(MigrateCommand),
    /// Delete one record by key.
    DeleteKey(DeleteKeyCommand),
    /// Delete many records by key, one key per input line.
    DeleteKeys(DeleteKeysCommand),
    /// Apply the backup retention policy.
    Retention(RetentionCommand),
}

/// Collection scope shared by the enumerating commands.
#[derive(Args, Debug, Clone, Default)]
struct ScopeArgs {
    /// Only collections owned by this app.
    #[arg(long, value_name = "APP")]
    app: Option<String>,
    /// Only collections with this name.
    #[arg(long, value_name = "COLLECTION")]
    collection: Option<String>,
    /// Also include globally shared collections.
    #[arg(long, action = ArgAction::SetTrue)]
    global_scope: bool,
}

impl ScopeArgs {
    /// Builds the enumeration filter.
    fn filter(&self) -> CollectionFilter {
        CollectionFilter {
            app: self.app.clone(),
            collection: self.collection.clone(),
            global_scope: self.global_scope,
        }
    }
}

/// Arguments for `backup`.
#[derive(Args, Debug)]
struct BackupCommand {
    /// Collection scope.
    #[command(flatten)]
    scope: ScopeArgs,
    /// Backup directory (defaults to `settings.default_path`).
    #[arg(long, value_name = "DIR")]
    path: Option<PathBuf>,
    /// Gzip the backup files.
    #[arg(long, action = ArgAction::SetTrue)]
    compress: bool,
}

/// Arguments for `restore`.
#[derive(Args, Debug)]
struct RestoreCommand {
    /// Backup file name or glob; lists backups when absent.
    #[arg(long, value_name = "PATTERN")]
    filename: Option<String>,
    /// Keep existing records instead of clearing each collection first.
    #[arg(long, action = ArgAction::SetTrue)]
    append: bool,
}

/// Arguments for `push`.
#[derive(Args, Debug)]
struct PushCommand {
    /// Collection scope.
    #[command(flatten)]
    scope: ScopeArgs,
    /// Destination host names.
    #[arg(long = "target", value_name = "HOST", required = true, num_args = 1..)]
    targets: Vec<String>,
    /// Management port of the destination hosts.
    #[arg(long, value_name = "PORT", value_parser = clap::value_parser!(u16).range(1025..))]
    port: Option<u16>,
    /// Keep existing destination records.
    #[arg(long, action = ArgAction::SetTrue)]
    append: bool,
}

/// Arguments for `pull`.
#[derive(Args, Debug)]
struct PullCommand {
    /// Collection scope.
    #[command(flatten)]
    scope: ScopeArgs,
    /// Source host name.
    #[arg(long, value_name = "HOST")]
    source: String,
    /// Management port of the source host.
    #[arg(long, value_name = "PORT", value_parser = clap::value_parser!(u16).range(1025..))]
    port: Option<u16>,
    /// Keep existing local records.
    #[arg(long, action = ArgAction::SetTrue)]
    append: bool,
}

/// Arguments for `migrate`.
#[derive(Args, Debug)]
struct MigrateCommand {
    /// Collection scope.
    #[command(flatten)]
    scope: ScopeArgs,
    /// Source host name.
    #[arg(long, value_name = "HOST")]
    source: String,
    /// Destination host name.
    #[arg(long, value_name = "HOST")]
    target: String,
    /// Management port of the source host.
    #[arg(long, value_name = "PORT", value_parser = clap::value_parser!(u16).range(1025..))]
    source_port: Option<u16>,
    /// Management port of the destination host.
    #[arg(long, value_name = "PORT", value_parser = clap::value_parser!(u16).range(1025..))]
    target_port: Option<u16>,
    /// Keep existing destination records.
    #[arg(long, action = ArgAction::SetTrue)]
    append: bool,
}

/// Arguments for `delete-key`.
#[derive(Args, Debug)]
struct DeleteKeyCommand {
    /// Collection name.
    #[arg(long, value_name = "COLLECTION")]
    collection: String,
    /// Owning app; resolved from the collection name when absent.
    #[arg(long, value_name = "APP")]
    app: Option<String>,
    /// Record key.
    #[arg(long, value_name = "KEY")]
    key: String,
}

/// Arguments for `delete-keys`.
#[derive(Args, Debug)]
struct DeleteKeysCommand {
    /// Collection name.
    #[arg(long, value_name = "COLLECTION")]
    collection: String,
    /// Owning app; resolved from the collection name when absent.
    #[arg(long, value_name = "APP")]
    app: Option<String>,
    /// File with one key per line (stdin when absent).
    #[arg(long, value_name = "FILE")]
    keys_file: Option<PathBuf>,
}

/// Arguments for `retention`.
#[derive(Args, Debug)]
struct RetentionCommand {
    /// Backup directory (defaults to `settings.default_path`).
    #[arg(long, value_name = "DIR")]
    path: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for setup failures.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Loads configuration, installs logging, and dispatches the command.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = KvToolsConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(err.to_string()))?;
    logging::init_logging(&config.logging).map_err(|err| CliError::new(err.to_string()))?;
    let session = Session::new(config).map_err(|err| CliError::new(err.to_string()))?;
    let mut writer = ResultWriter::new(std::io::stdout().lock());
    dispatch(&session, &cli.command, &mut writer)?;
    Ok(writer.exit_code())
}

/// Runs one command against the session.
fn dispatch<W: Write>(
    session: &Session,
    command: &Commands,
    writer: &mut ResultWriter<W>,
) -> CliResult<()> {
    match command {
        Commands::Backup(args) => commands::backup(session, args, writer),
        Commands::Restore(args) => commands::restore(session, args, writer),
        Commands::Push(args) => commands::push(session, args, writer),
        Commands::Pull(args) => commands::pull(session, args, writer),
        Commands::Migrate(args) => commands::migrate(session, args, writer),
        Commands::DeleteKey(args) => commands::delete_key(session, args, writer),
        Commands::DeleteKeys(args) => commands::delete_keys(session, args, writer),
        Commands::Retention(args) => commands::retention(session, args, writer),
    }
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
