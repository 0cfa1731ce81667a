// crates/kvstore-tools-core/src/upload.rs
// ============================================================================
// Module: Batched Uploader
// Description: Restores artifact content to a collection via batch saves.
// Purpose: Repair legacy artifacts and respect the per-batch document cap.
// Dependencies: flate2, serde_json, tracing
// ============================================================================

//! ## Overview
//! The uploader reads an artifact, parses it through a three-step repair
//! ladder, and posts consecutive batches of records to the destination.
//! Invariants:
//! - No batch exceeds the configured batch limit.
//! - Batches are posted sequentially; the first failing batch stops the run.
//! - Only accepted batches count toward the posted total.
//! - Destination content is never deleted here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use serde_json::Value;

use crate::api::KvStoreApi;
use crate::artifact::Compression;
use crate::identity::CollectionIdentity;
use crate::outcome::TransferOutcome;
use crate::transfer::TransferError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Message reported when no repair strategy yields records.
pub const MSG_UNREADABLE: &str = "Unable to read file";

// ============================================================================
// SECTION: Parse Ladder
// ============================================================================

/// Parses artifact text into records, repairing known legacy defects.
///
/// Strategies, each tried only when the previous one fails:
/// 1. parse as-is;
/// 2. append one `]` (older downloads could miss the closing bracket when the
///    key marker appeared inside record values);
/// 3. strip one leading `[` and one trailing `]`.
///
/// A top-level object is accepted as a single record.
///
/// # Errors
///
/// Returns [`TransferError::ParseRecoveryExhausted`] when all strategies fail.
pub fn parse_records(text: &str) -> Result<Vec<Value>, TransferError> {
    let trimmed = text.trim();
    if let Some(records) = parse_as_records(trimmed) {
        return Ok(records);
    }
    tracing::warn!("artifact is not valid JSON, retrying with a closing bracket");
    if let Some(records) = parse_as_records(&format!("{trimmed}]")) {
        return Ok(records);
    }
    tracing::warn!("artifact still invalid, retrying without outer brackets");
    let inner = trimmed.strip_prefix('[').unwrap_or(trimmed);
    let inner = inner.strip_suffix(']').unwrap_or(inner);
    parse_as_records(inner).ok_or(TransferError::ParseRecoveryExhausted)
}

/// Parses `text` as an array of records or a single object.
fn parse_as_records(text: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Array(records) => Some(records),
        record @ Value::Object(_) => Some(vec![record]),
        _ => None,
    }
}

/// Reads artifact text, decompressing `.json.gz` files.
///
/// # Errors
///
/// Returns [`TransferError::Io`] when the file cannot be read or decoded.
pub fn read_artifact_text(path: &Path) -> Result<String, TransferError> {
    let io_error = |source| TransferError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_error)?;
    let name = path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
    let mut text = String::new();
    match Compression::from_file_name(&name) {
        Some(Compression::Gzip) => {
            GzDecoder::new(file).read_to_string(&mut text).map_err(io_error)?;
        }
        Some(Compression::None) | None => {
            let mut file = file;
            file.read_to_string(&mut text).map_err(io_error)?;
        }
    }
    Ok(text)
}

// ============================================================================
// SECTION: Uploader
// ============================================================================

/// Result of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// Terminal status.
    pub outcome: TransferOutcome,
    /// Human-readable message.
    pub message: String,
    /// Records in accepted batches.
    pub posted: usize,
}

impl UploadReport {
    /// Builds an error report.
    fn error(message: impl Into<String>, posted: usize) -> Self {
        Self {
            outcome: TransferOutcome::Error,
            message: message.into(),
            posted,
        }
    }
}

/// Batch-bounded uploader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uploader {
    /// Maximum records per batch save.
    batch_limit: usize,
}

impl Uploader {
    /// Creates an uploader. A zero limit is raised to one.
    #[must_use]
    pub fn new(batch_limit: usize) -> Self {
        Self {
            batch_limit: batch_limit.max(1),
        }
    }

    /// Configured batch limit.
    #[must_use]
    pub const fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Reads, repairs, and uploads an artifact file.
    pub fn upload_artifact(
        &self,
        api: &KvStoreApi,
        destination: &CollectionIdentity,
        path: &Path,
    ) -> UploadReport {
        match read_artifact_text(path) {
            Ok(text) => self.upload_text(api, destination, &text),
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "failed to read artifact");
                UploadReport::error(MSG_UNREADABLE, 0)
            }
        }
    }

    /// Repairs and uploads in-memory artifact text.
    pub fn upload_text(
        &self,
        api: &KvStoreApi,
        destination: &CollectionIdentity,
        text: &str,
    ) -> UploadReport {
        match parse_records(text) {
            Ok(records) => self.upload_records(api, destination, &records),
            Err(err) => {
                tracing::error!(collection = %destination, error = %err, "no repair strategy succeeded");
                UploadReport::error(MSG_UNREADABLE, 0)
            }
        }
    }

    /// Uploads parsed records in sequential batches.
    pub fn upload_records(
        &self,
        api: &KvStoreApi,
        destination: &CollectionIdentity,
        records: &[Value],
    ) -> UploadReport {
        let mut posted = 0;
        for (index, batch) in records.chunks(self.batch_limit).enumerate() {
            tracing::debug!(
                collection = %destination,
                batch = index + 1,
                records = batch.len(),
                "posting batch"
            );
            if let Err(err) = post_batch(api, destination, batch) {
                tracing::error!(collection = %destination, posted, error = %err, "batch save failed");
                return UploadReport::error(format!("Failed to upload collection: {err}"), posted);
            }
            posted += batch.len();
        }
        let message = format!("Restored {posted} records to {destination}");
        tracing::info!(collection = %destination, posted, "restored collection");
        UploadReport {
            outcome: TransferOutcome::Success,
            message,
            posted,
        }
    }
}

/// Serializes and posts one batch.
fn post_batch(
    api: &KvStoreApi,
    destination: &CollectionIdentity,
    batch: &[Value],
) -> Result<(), TransferError> {
    let body = serde_json::to_vec(batch).map_err(|err| TransferError::Encode(err.to_string()))?;
    api.batch_save(destination, body)?;
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn well_formed_array_parses_directly() {
        let records = parse_records(r#"[{"_key":"a"},{"_key":"b"}]"#).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn missing_closing_bracket_is_repaired() {
        let records = parse_records("[{\"_key\":\"a\"},{\"_key\":\"b\"}\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["_key"], "b");
    }

    #[test]
    fn nested_array_is_valid_json_and_not_unwrapped() {
        let records = parse_records(r#"[[{"_key":"a"}]]"#).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_array());
    }

    #[test]
    fn lone_object_with_stray_bracket_is_one_record() {
        let records = parse_records(r#"{"_key":"a"}]"#).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_object());
        assert_eq!(records[0]["_key"], "a");
    }

    #[test]
    fn garbage_exhausts_the_ladder() {
        assert!(matches!(parse_records("not json"), Err(TransferError::ParseRecoveryExhausted)));
        assert!(matches!(parse_records(""), Err(TransferError::ParseRecoveryExhausted)));
        assert!(matches!(parse_records("42"), Err(TransferError::ParseRecoveryExhausted)));
    }

    #[test]
    fn gzip_artifacts_are_decompressed() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a#c#20240101_000000.json.gz");
        let mut encoder =
            flate2::write::GzEncoder::new(File::create(&path).unwrap(), flate2::Compression::fast());
        encoder.write_all(br#"[{"_key":"a"}]"#).unwrap();
        encoder.finish().unwrap();
        assert_eq!(read_artifact_text(&path).unwrap(), r#"[{"_key":"a"}]"#);
    }
}
