// crates/kvstore-tools-cli/src/commands.rs
// ============================================================================
// Module: Command Implementations
// Description: One function per kvst subcommand.
// Purpose: Authorize, enumerate, run the engine, and print result lines.
// Dependencies: kvstore-tools-core, serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! Each command performs its setup (session, authorization, enumeration)
//! first and returns [`CliError`] if any of it fails, before any data moves.
//! After setup, every per-collection, per-key, or per-file outcome is
//! printed by [`ResultWriter`] and never aborts the remaining work.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use kvstore_tools_config::KvToolsConfig;
use kvstore_tools_core::BulkDeleter;
use kvstore_tools_core::CollectionIdentity;
use kvstore_tools_core::Compression;
use kvstore_tools_core::ConnectionPool;
use kvstore_tools_core::Downloader;
use kvstore_tools_core::KvStoreApi;
use kvstore_tools_core::RetentionPolicy;
use kvstore_tools_core::RetentionReport;
use kvstore_tools_core::StagingArtifact;
use kvstore_tools_core::TransferOrchestrator;
use kvstore_tools_core::TransferOutcome;
use kvstore_tools_core::Uploader;
use kvstore_tools_core::artifact::format_timestamp;
use kvstore_tools_core::authorize;
use kvstore_tools_core::backup_collection;
use kvstore_tools_core::bulk_delete::DEFAULT_POOL_SIZE;
use kvstore_tools_core::enumerate_collections;
use kvstore_tools_core::find_artifacts;
use kvstore_tools_core::list_artifacts;
use kvstore_tools_core::resolve_collection_app;
use kvstore_tools_core::restore_artifacts;
use kvstore_tools_core::users_with_role;
use serde::Serialize;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::BackupCommand;
use crate::CliError;
use crate::CliResult;
use crate::DeleteKeyCommand;
use crate::DeleteKeysCommand;
use crate::MigrateCommand;
use crate::PullCommand;
use crate::PushCommand;
use crate::RestoreCommand;
use crate::RetentionCommand;
use crate::output_error;
use crate::session::Session;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum size of a key list read from a file or stdin.
pub(crate) const MAX_KEYS_INPUT_BYTES: u64 = 64 * 1024 * 1024;
/// Capability suffix shared by both key-delete commands.
const DELETE_OPERATION: &str = "deletekey";

// ============================================================================
// SECTION: Result Output
// ============================================================================

/// Writes one JSON line per result and tracks failures.
pub(crate) struct ResultWriter<W: Write> {
    /// Destination stream.
    out: W,
    /// Number of lines reported as errors.
    errors: usize,
}

impl<W: Write> ResultWriter<W> {
    /// Wraps an output stream.
    pub(crate) const fn new(out: W) -> Self {
        Self {
            out,
            errors: 0,
        }
    }

    /// Writes `value` as one JSON line; `failed` marks it as an error.
    pub(crate) fn emit<T: Serialize>(&mut self, value: &T, failed: bool) -> CliResult<()> {
        let line = serde_json::to_string(value)
            .map_err(|err| CliError::new(format!("failed to encode result: {err}")))?;
        writeln!(self.out, "{line}").map_err(|err| CliError::new(output_error("stdout", &err)))?;
        if failed {
            self.errors += 1;
        }
        Ok(())
    }

    /// Number of error lines written.
    #[cfg(test)]
    pub(crate) const fn errors(&self) -> usize {
        self.errors
    }

    /// Exit status for the invocation.
    pub(crate) fn exit_code(&self) -> ExitCode {
        if self.errors == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE }
    }

    /// Returns the wrapped stream.
    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
    }
}

/// Listing line for one backup file.
#[derive(Debug, Serialize)]
struct ArtifactLine {
    /// File name.
    file: String,
    /// Source app.
    app: String,
    /// Source collection.
    collection: String,
    /// Capture time, `YYYYMMDD_HHMMSS`.
    captured_at: String,
    /// Gzip-compressed.
    compressed: bool,
}

impl From<&StagingArtifact> for ArtifactLine {
    fn from(artifact: &StagingArtifact) -> Self {
        Self {
            file: artifact.file_name(),
            app: artifact.app.clone(),
            collection: artifact.collection.clone(),
            captured_at: format_timestamp(artifact.captured_at),
            compressed: artifact.compression == Compression::Gzip,
        }
    }
}

/// Line for a file a retention sweep could not remove.
#[derive(Debug, Serialize)]
struct RetentionFailureLine {
    /// File path.
    path: PathBuf,
    /// Always `error`.
    result: TransferOutcome,
    /// Failure text.
    message: String,
}

// ============================================================================
// SECTION: Transfer Commands
// ============================================================================

/// `kvst backup`: local collections to files, then the retention sweep.
pub(crate) fn backup<W: Write>(
    session: &Session,
    args: &BackupCommand,
    writer: &mut ResultWriter<W>,
) -> CliResult<()> {
    let api = local_api(session)?;
    authorize_operation(session, &api, "backup")?;
    let collections = enumerate(&api, &args.scope.filter())?;
    let settings = &session.config().settings;
    let backup_dir = args.path.clone().unwrap_or_else(|| settings.default_path.clone());
    let compression = Compression::from_flag(args.compress || settings.compression);
    let downloader = downloader(session.config());
    for identity in &collections {
        let result = backup_collection(&downloader, &api, identity, &backup_dir, compression);
        writer.emit(&result, result.outcome.is_error())?;
    }

    let policy = RetentionPolicy::from_settings(settings.retention_days, settings.retention_size_mb);
    if policy.is_disabled() {
        return Ok(());
    }
    match policy.sweep(&backup_dir) {
        Ok(report) => log_retention(&report),
        Err(err) => error!(error = %err, "retention sweep failed"),
    }
    Ok(())
}

/// `kvst restore`: list backups, or restore the ones matching a pattern.
pub(crate) fn restore<W: Write>(
    session: &Session,
    args: &RestoreCommand,
    writer: &mut ResultWriter<W>,
) -> CliResult<()> {
    let api = local_api(session)?;
    authorize_operation(session, &api, "restore")?;
    let backup_dir = &session.config().settings.default_path;

    let Some(pattern) = &args.filename else {
        let artifacts =
            list_artifacts(backup_dir).map_err(|err| CliError::new(err.to_string()))?;
        for artifact in &artifacts {
            writer.emit(&ArtifactLine::from(artifact), false)?;
        }
        return Ok(());
    };

    let artifacts =
        find_artifacts(pattern, backup_dir).map_err(|err| CliError::new(err.to_string()))?;
    if artifacts.is_empty() {
        return Err(CliError::new(format!("No backup files matched {pattern}")));
    }
    info!(pattern = %pattern, files = artifacts.len(), append = args.append, "restoring backups");
    for result in restore_artifacts(&uploader(session.config()), &api, &artifacts, args.append) {
        writer.emit(&result, result.outcome.is_error())?;
    }
    Ok(())
}

/// `kvst push`: local collections to every target host.
pub(crate) fn push<W: Write>(
    session: &Session,
    args: &PushCommand,
    writer: &mut ResultWriter<W>,
) -> CliResult<()> {
    let local = local_api(session)?;
    authorize_operation(session, &local, "push")?;
    let collections = enumerate(&local, &args.scope.filter())?;
    let targets = args
        .targets
        .iter()
        .map(|host| remote_api(session, host, args.port).map(|api| (host, api)))
        .collect::<CliResult<Vec<_>>>()?;
    let orchestrator = orchestrator(session.config());
    for (host, remote) in &targets {
        for identity in &collections {
            let result =
                orchestrator.transfer(&local, remote, identity, args.append).with_host(host.as_str());
            writer.emit(&result, result.outcome.is_error())?;
        }
    }
    Ok(())
}

/// `kvst pull`: collections of a remote host into the local store.
pub(crate) fn pull<W: Write>(
    session: &Session,
    args: &PullCommand,
    writer: &mut ResultWriter<W>,
) -> CliResult<()> {
    let local = local_api(session)?;
    authorize_operation(session, &local, "pull")?;
    let remote = remote_api(session, &args.source, args.port)?;
    let collections = enumerate(&remote, &args.scope.filter())?;
    let orchestrator = orchestrator(session.config());
    for identity in &collections {
        let result = orchestrator
            .transfer(&remote, &local, identity, args.append)
            .with_host(args.source.as_str());
        writer.emit(&result, result.outcome.is_error())?;
    }
    Ok(())
}

/// `kvst migrate`: collections from one remote host to another.
pub(crate) fn migrate<W: Write>(
    session: &Session,
    args: &MigrateCommand,
    writer: &mut ResultWriter<W>,
) -> CliResult<()> {
    let local = local_api(session)?;
    authorize_operation(session, &local, "migrate")?;
    let source = remote_api(session, &args.source, args.source_port)?;
    let target = remote_api(session, &args.target, args.target_port)?;
    let collections = enumerate(&source, &args.scope.filter())?;
    let orchestrator = orchestrator(session.config());
    for identity in &collections {
        let result = orchestrator
            .transfer(&source, &target, identity, args.append)
            .with_host(args.target.as_str());
        writer.emit(&result, result.outcome.is_error())?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Key Commands
// ============================================================================

/// `kvst delete-key`: remove one record.
pub(crate) fn delete_key<W: Write>(
    session: &Session,
    args: &DeleteKeyCommand,
    writer: &mut ResultWriter<W>,
) -> CliResult<()> {
    let api = local_api(session)?;
    authorize_delete(session, &api)?;
    let collection = resolve_collection(&api, &args.collection, args.app.as_deref())?;
    let result = kvstore_tools_core::delete_key(&api, &collection, &args.key);
    writer.emit(&result, result.status.is_error())
}

/// `kvst delete-keys`: remove many records concurrently.
pub(crate) fn delete_keys<W: Write>(
    session: &Session,
    args: &DeleteKeysCommand,
    writer: &mut ResultWriter<W>,
) -> CliResult<()> {
    let api = local_api(session)?;
    authorize_delete(session, &api)?;
    let collection = resolve_collection(&api, &args.collection, args.app.as_deref())?;
    let text = match &args.keys_file {
        Some(path) => read_keys_file(path)?,
        None => read_limited(io::stdin().lock(), "stdin")?,
    };
    let keys = parse_keys(&text);
    info!(%collection, keys = keys.len(), "deleting keys");
    let pool = ConnectionPool::new(&api, DEFAULT_POOL_SIZE);
    for result in BulkDeleter::default().delete_keys(&pool, &collection, &keys) {
        writer.emit(&result, result.status.is_error())?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Retention Command
// ============================================================================

/// `kvst retention`: sweep the backup directory with the configured policy.
pub(crate) fn retention<W: Write>(
    session: &Session,
    args: &RetentionCommand,
    writer: &mut ResultWriter<W>,
) -> CliResult<()> {
    let settings = &session.config().settings;
    let dir = args.path.clone().unwrap_or_else(|| settings.default_path.clone());
    let policy = RetentionPolicy::from_settings(settings.retention_days, settings.retention_size_mb);
    if policy.is_disabled() {
        info!("retention disabled; nothing to do");
        return Ok(());
    }
    let report = policy.sweep(&dir).map_err(|err| CliError::new(err.to_string()))?;
    log_retention(&report);
    for deletion in &report.deleted {
        writer.emit(deletion, false)?;
    }
    for failure in &report.failures {
        let line = RetentionFailureLine {
            path: failure.path.clone(),
            result: TransferOutcome::Error,
            message: failure.source.to_string(),
        };
        writer.emit(&line, true)?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Local client or a setup error.
fn local_api(session: &Session) -> CliResult<KvStoreApi> {
    session.local_api().map_err(|err| CliError::new(err.to_string()))
}

/// Remote client or a setup error.
fn remote_api(session: &Session, host: &str, port: Option<u16>) -> CliResult<KvStoreApi> {
    session.remote_api(host, port).map_err(|err| CliError::new(err.to_string()))
}

/// Enumerates collections or fails the invocation.
fn enumerate(
    api: &KvStoreApi,
    filter: &kvstore_tools_core::CollectionFilter,
) -> CliResult<Vec<CollectionIdentity>> {
    enumerate_collections(api, filter).map_err(|err| CliError::new(err.to_string()))
}

/// Resolves the owning app of a named collection.
fn resolve_collection(
    api: &KvStoreApi,
    collection: &str,
    app: Option<&str>,
) -> CliResult<CollectionIdentity> {
    resolve_collection_app(api, collection, app).map_err(|err| CliError::new(err.to_string()))
}

/// Checks the operation capability unless enforcement is disabled.
fn authorize_operation(session: &Session, api: &KvStoreApi, operation: &str) -> CliResult<()> {
    if !session.config().authorization.enforce {
        debug!(operation, "capability enforcement disabled");
        return Ok(());
    }
    authorize(api, operation).map(|_| ()).map_err(|err| CliError::new(err.to_string()))
}

/// Checks the delete capability and, when configured, the delete role.
fn authorize_delete(session: &Session, api: &KvStoreApi) -> CliResult<()> {
    let authorization = &session.config().authorization;
    if !authorization.enforce {
        debug!(operation = DELETE_OPERATION, "capability enforcement disabled");
        return Ok(());
    }
    let context = authorize(api, DELETE_OPERATION).map_err(|err| CliError::new(err.to_string()))?;
    let Some(role) = &authorization.delete_role else {
        return Ok(());
    };
    let members = users_with_role(api, role).map_err(|err| CliError::new(err.to_string()))?;
    if members.iter().any(|member| member == &context.username) {
        return Ok(());
    }
    error!(user = %context.username, role = %role, "delete role not held");
    Err(CliError::new(format!(
        "User {} is unauthorized. Has the {role} role been granted?",
        context.username
    )))
}

/// Downloader sized from settings and the source query limit.
fn downloader(config: &KvToolsConfig) -> Downloader {
    Downloader::new(config.settings.page_size, config.limits.max_rows_per_query)
}

/// Uploader bounded by the destination batch limit.
fn uploader(config: &KvToolsConfig) -> Uploader {
    Uploader::new(config.limits.max_documents_per_batch_save)
}

/// Orchestrator staging under `<default_path>/staging`.
fn orchestrator(config: &KvToolsConfig) -> TransferOrchestrator {
    TransferOrchestrator::new(downloader(config), uploader(config), config.settings.staging_dir())
}

/// Logs the totals of a retention sweep; files are logged by the sweep itself.
fn log_retention(report: &RetentionReport) {
    info!(
        deleted = report.deleted.len(),
        retained = report.retained.len(),
        failed = report.failures.len(),
        "retention sweep complete"
    );
}

/// Reads a key file with the input size limit.
fn read_keys_file(path: &Path) -> CliResult<String> {
    let file = File::open(path)
        .map_err(|err| CliError::new(format!("unable to open {}: {err}", path.display())))?;
    read_limited(file, &path.display().to_string())
}

/// Reads UTF-8 text up to [`MAX_KEYS_INPUT_BYTES`].
pub(crate) fn read_limited<R: Read>(reader: R, label: &str) -> CliResult<String> {
    let mut text = String::new();
    reader
        .take(MAX_KEYS_INPUT_BYTES + 1)
        .read_to_string(&mut text)
        .map_err(|err| CliError::new(format!("unable to read keys from {label}: {err}")))?;
    if text.len() as u64 > MAX_KEYS_INPUT_BYTES {
        return Err(CliError::new(format!("key list from {label} exceeds size limit")));
    }
    Ok(text)
}

/// Splits key input into one key per non-blank line.
pub(crate) fn parse_keys(text: &str) -> Vec<String> {
    text.lines().map(str::trim).filter(|line| !line.is_empty()).map(str::to_string).collect()
}
