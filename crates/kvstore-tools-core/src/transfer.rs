// crates/kvstore-tools-core/src/transfer.rs
// ============================================================================
// Module: Transfer Orchestrator
// Description: Download, optional clear, and upload composed per collection.
// Purpose: Produce one timed, reportable result for every collection.
// Dependencies: serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`TransferOrchestrator::transfer`] moves one collection from a source host
//! to a destination host through a gzip staging artifact.
//! Invariants:
//! - Every call returns exactly one [`TransferResult`]; failures never raise.
//! - In non-append mode the destination is cleared before upload, and a
//!   failed clear aborts before any record is written.
//! - The staging artifact is deleted on success and kept on failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;
use serde::Serializer;
use serde::ser::SerializeStruct;
use thiserror::Error;

use crate::api::ApiError;
use crate::api::KvStoreApi;
use crate::artifact::Compression;
use crate::artifact::StagingArtifact;
use crate::artifact::capture_timestamp;
use crate::download::DownloadSink;
use crate::download::Downloader;
use crate::download::SinkOutput;
use crate::identity::CollectionIdentity;
use crate::outcome::TransferOutcome;
use crate::upload::Uploader;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Per-collection transfer failures.
///
/// # Invariants
/// - Always reported inside a [`TransferResult`]; never aborts a batch of
///   collections.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A KV store call failed.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// A local file operation failed.
    #[error("{}: {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Records could not be serialized into a batch body.
    #[error("unable to encode batch: {0}")]
    Encode(String),
    /// No repair strategy produced records.
    #[error("Unable to read file")]
    ParseRecoveryExhausted,
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Wall-clock time spent in each phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseDurations {
    /// Download (or read) phase.
    pub download: Duration,
    /// Destination clear, when performed.
    pub delete: Option<Duration>,
    /// Upload, when performed.
    pub upload: Option<Duration>,
}

impl Serialize for PhaseDurations {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PhaseDurations", 3)?;
        state.serialize_field("download_ms", &millis(self.download))?;
        state.serialize_field("delete_ms", &self.delete.map(millis))?;
        state.serialize_field("upload_ms", &self.upload.map(millis))?;
        state.end()
    }
}

/// Converts a duration to whole milliseconds, saturating.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Terminal report for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferResult {
    /// Source app.
    pub app: String,
    /// Source collection.
    pub collection: String,
    /// Destination host, when the operation targets one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Terminal status.
    #[serde(rename = "result")]
    pub outcome: TransferOutcome,
    /// Records downloaded or posted.
    #[serde(rename = "records")]
    pub record_count: usize,
    /// Phase timings.
    pub durations: PhaseDurations,
    /// Human-readable message.
    pub message: String,
    /// Artifact path kept on disk, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl TransferResult {
    /// Starts a result for `identity`.
    fn new(identity: &CollectionIdentity) -> Self {
        Self {
            app: identity.app.clone(),
            collection: identity.name.clone(),
            host: None,
            outcome: TransferOutcome::Success,
            record_count: 0,
            durations: PhaseDurations::default(),
            message: String::new(),
            artifact: None,
        }
    }

    /// Sets outcome, count, and message.
    fn finish(
        mut self,
        outcome: TransferOutcome,
        record_count: usize,
        message: impl Into<String>,
    ) -> Self {
        self.outcome = outcome;
        self.record_count = record_count;
        self.message = message.into();
        self
    }

    /// Attaches the destination host label.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Composes download, clear, and upload for remote-to-remote transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOrchestrator {
    /// Page downloader.
    downloader: Downloader,
    /// Batch uploader.
    uploader: Uploader,
    /// Directory for staging artifacts.
    staging_dir: PathBuf,
}

impl TransferOrchestrator {
    /// Creates an orchestrator staging under `staging_dir`.
    #[must_use]
    pub fn new(downloader: Downloader, uploader: Uploader, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloader,
            uploader,
            staging_dir: staging_dir.into(),
        }
    }

    /// Staging directory.
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Transfers one collection from `source` to `destination`.
    pub fn transfer(
        &self,
        source: &KvStoreApi,
        destination: &KvStoreApi,
        identity: &CollectionIdentity,
        append: bool,
    ) -> TransferResult {
        let mut result = TransferResult::new(identity).with_host(destination.endpoint().host_label());
        let span = tracing::info_span!("transfer", collection = %identity, append);
        let _guard = span.enter();

        if let Err(err) = fs::create_dir_all(&self.staging_dir) {
            let message = format!("Unable to create staging directory: {err}");
            return result.finish(TransferOutcome::Error, 0, message);
        }

        // (a) download
        let artifact =
            StagingArtifact::unique(&self.staging_dir, identity, capture_timestamp(), Compression::Gzip);
        let started = Instant::now();
        let download = self.downloader.download(source, identity, DownloadSink::File(artifact));
        result.durations.download = started.elapsed();
        if matches!(download.outcome, TransferOutcome::Skipped | TransferOutcome::Error) {
            return result.finish(download.outcome, download.record_count, download.message);
        }
        let SinkOutput::File(staged) = download.output else {
            return result.finish(TransferOutcome::Error, 0, "Download produced no artifact");
        };
        let download_warning =
            (download.outcome == TransferOutcome::Warning).then_some(download.message);

        // (b) clear
        if !append {
            let started = Instant::now();
            let cleared = destination.clear_collection(identity);
            result.durations.delete = Some(started.elapsed());
            if let Err(err) = cleared {
                tracing::error!(error = %err, "failed to clear destination collection");
                result.artifact = Some(staged.path);
                let message = format!("Failed to delete destination collection: {err}");
                return result.finish(TransferOutcome::Error, 0, message);
            }
        }

        // (c) upload
        let started = Instant::now();
        let upload = self.uploader.upload_artifact(destination, identity, &staged.path);
        result.durations.upload = Some(started.elapsed());
        if upload.outcome.is_error() {
            result.artifact = Some(staged.path);
            return result.finish(TransferOutcome::Error, upload.posted, upload.message);
        }

        // (d) cleanup
        if let Err(err) = fs::remove_file(&staged.path) {
            tracing::warn!(path = %staged.path.display(), error = %err, "failed to remove staging artifact");
        }
        match download_warning {
            Some(warning) => {
                let message = format!("{} {warning}", upload.message);
                result.finish(TransferOutcome::Warning, upload.posted, message)
            }
            None => result.finish(TransferOutcome::Success, upload.posted, upload.message),
        }
    }
}

// ============================================================================
// SECTION: Backup and Restore
// ============================================================================

/// Downloads one collection into a backup artifact under `backup_dir`.
pub fn backup_collection(
    downloader: &Downloader,
    api: &KvStoreApi,
    identity: &CollectionIdentity,
    backup_dir: &Path,
    compression: Compression,
) -> TransferResult {
    let result = TransferResult::new(identity);
    if let Err(err) = fs::create_dir_all(backup_dir) {
        let message = format!("Unable to create backup directory: {err}");
        return result.finish(TransferOutcome::Error, 0, message);
    }
    let artifact = StagingArtifact::unique(backup_dir, identity, capture_timestamp(), compression);
    let started = Instant::now();
    let download = downloader.download(api, identity, DownloadSink::File(artifact));
    let mut result = result.finish(download.outcome, download.record_count, download.message);
    result.durations.download = started.elapsed();
    if let SinkOutput::File(saved) = download.output {
        result.artifact = Some(saved.path);
    }
    result
}

/// Restores artifacts into their source collections on `api`.
///
/// Without `append`, each destination collection is cleared at most once
/// per call, before its first artifact is uploaded.
pub fn restore_artifacts(
    uploader: &Uploader,
    api: &KvStoreApi,
    artifacts: &[StagingArtifact],
    append: bool,
) -> Vec<TransferResult> {
    let mut cleared: HashMap<(String, String), bool> = HashMap::new();
    let mut results = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let identity = artifact.identity();
        let mut result = TransferResult::new(&identity);
        result.artifact = Some(artifact.path.clone());

        if !append {
            let key = (identity.app.clone(), identity.name.clone());
            let ok = match cleared.get(&key) {
                Some(ok) => *ok,
                None => {
                    let started = Instant::now();
                    let outcome = api.clear_collection(&identity);
                    result.durations.delete = Some(started.elapsed());
                    if let Err(err) = &outcome {
                        tracing::error!(collection = %identity, error = %err, "failed to clear collection");
                    }
                    cleared.insert(key, outcome.is_ok());
                    outcome.is_ok()
                }
            };
            if !ok {
                results.push(result.finish(
                    TransferOutcome::Error,
                    0,
                    "Failed to delete collection before restore",
                ));
                continue;
            }
        }

        let started = Instant::now();
        let upload = uploader.upload_artifact(api, &identity, &artifact.path);
        result.durations.upload = Some(started.elapsed());
        results.push(result.finish(upload.outcome, upload.posted, upload.message));
    }
    results
}

// ============================================================================
// SECTION: Tests
// ============================================================================
