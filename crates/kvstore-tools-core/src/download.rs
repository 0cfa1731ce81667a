// crates/kvstore-tools-core/src/download.rs
// ============================================================================
// Module: Paginated Downloader
// Description: Streams one collection into memory or a staging artifact.
// Purpose: Cursor pagination with raw-text stitching and outcome policy.
// Dependencies: flate2, tracing
// ============================================================================

//! ## Overview
//! The downloader requests `limit/skip` pages until a page comes back with
//! fewer records than the page size. Record counts come from key-marker
//! occurrences in the raw text; pages are never parsed.
//! Invariants:
//! - Pagination stops only on a page whose count is below the page size.
//! - The closing bracket is written in that same iteration, even when the
//!   terminal page is empty.
//! - An empty collection leaves no file behind.
//! - Any failure resets the count to zero and removes the partial file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::io;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use flate2::write::GzEncoder;

use crate::api::KvStoreApi;
use crate::array_writer::JsonArrayWriter;
use crate::array_writer::count_markers;
use crate::artifact::Compression;
use crate::artifact::StagingArtifact;
use crate::identity::CollectionIdentity;
use crate::outcome::TransferOutcome;
use crate::transfer::TransferError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default key marker field.
pub const DEFAULT_KEY_MARKER: &str = "_key";
/// Message for empty collections.
pub const MSG_EMPTY: &str = "Collection is empty";
/// Message when pages may have been truncated by the server.
pub const MSG_BATCH_OVER_LIMIT: &str =
    "Batch size greater than configured query limit. Possible incomplete transfer.";
/// Message when the total equals the server row cap.
pub const MSG_ROWS_AT_LIMIT: &str =
    "Downloaded rows equal to configured limit. Possible incomplete transfer.";
/// Message for a clean download.
pub const MSG_DOWNLOADED: &str = "Downloaded collection";

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Where downloaded records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadSink {
    /// Collect into a string.
    Memory,
    /// Write to the artifact's path, compressed per its settings.
    File(StagingArtifact),
}

/// What a download produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOutput {
    /// Nothing retained (empty collection or failure).
    Empty,
    /// Assembled JSON array text.
    Memory(String),
    /// Artifact written to disk.
    File(StagingArtifact),
}

/// Result of one collection download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    /// Terminal status.
    pub outcome: TransferOutcome,
    /// Human-readable message.
    pub message: String,
    /// Records counted from key markers.
    pub record_count: usize,
    /// Populated sink.
    pub output: SinkOutput,
}

// ============================================================================
// SECTION: Downloader
// ============================================================================

/// Paginated collection downloader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloader {
    /// Records requested per page.
    page_size: usize,
    /// Server-side cap on rows reachable per query.
    max_rows: usize,
    /// Field name counted in raw page text.
    key_marker: String,
}

impl Downloader {
    /// Creates a downloader. A zero page size is raised to one.
    #[must_use]
    pub fn new(page_size: usize, max_rows: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            max_rows,
            key_marker: DEFAULT_KEY_MARKER.to_string(),
        }
    }

    /// Overrides the key marker field.
    #[must_use]
    pub fn with_key_marker(mut self, marker: impl Into<String>) -> Self {
        self.key_marker = marker.into();
        self
    }

    /// Configured page size.
    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Downloads one collection into `sink`. Failures are reported in the
    /// returned [`DownloadReport`], never raised.
    pub fn download(
        &self,
        api: &KvStoreApi,
        collection: &CollectionIdentity,
        sink: DownloadSink,
    ) -> DownloadReport {
        let target = match &sink {
            DownloadSink::File(artifact) => Some(artifact.path.clone()),
            DownloadSink::Memory => None,
        };
        match self.stream(api, collection, sink) {
            Ok((record_count, output)) => {
                let (outcome, message) = self.classify(record_count);
                if record_count == 0 {
                    discard(target.as_deref());
                    tracing::debug!(%collection, "skipping empty collection");
                    return DownloadReport {
                        outcome,
                        message: message.to_string(),
                        record_count,
                        output: SinkOutput::Empty,
                    };
                }
                if outcome == TransferOutcome::Warning {
                    tracing::warn!(%collection, record_count, detail = message, "download may be incomplete");
                } else {
                    tracing::info!(%collection, record_count, "downloaded collection");
                }
                DownloadReport {
                    outcome,
                    message: message.to_string(),
                    record_count,
                    output,
                }
            }
            Err(err) => {
                tracing::error!(%collection, error = %err, "failed to download collection");
                discard(target.as_deref());
                DownloadReport {
                    outcome: TransferOutcome::Error,
                    message: err.to_string(),
                    record_count: 0,
                    output: SinkOutput::Empty,
                }
            }
        }
    }

    /// Runs the pagination loop and returns the marker total and sink output.
    fn stream(
        &self,
        api: &KvStoreApi,
        collection: &CollectionIdentity,
        sink: DownloadSink,
    ) -> Result<(usize, SinkOutput), TransferError> {
        let sink_path = match &sink {
            DownloadSink::File(artifact) => artifact.path.clone(),
            DownloadSink::Memory => PathBuf::new(),
        };
        let io_error = |source| TransferError::Io {
            path: sink_path.clone(),
            source,
        };
        let mut writer = JsonArrayWriter::new(SinkWriter::new(sink));
        let mut cursor = 0;
        let mut total = 0;
        loop {
            let raw = api.fetch_page(collection, self.page_size, cursor)?;
            let count = count_markers(&raw, &self.key_marker);
            writer.write_page(&raw).map_err(io_error)?;
            total += count;
            tracing::debug!(%collection, cursor, page_records = count, total, "downloaded page");
            if count < self.page_size {
                break;
            }
            cursor += count;
        }
        let sink = writer.finish().map_err(io_error)?;
        let output = sink.complete().map_err(io_error)?;
        Ok((total, output))
    }

    /// Maps a record total to an outcome and message.
    fn classify(&self, total: usize) -> (TransferOutcome, &'static str) {
        if total == 0 {
            (TransferOutcome::Skipped, MSG_EMPTY)
        } else if self.page_size > self.max_rows && total > self.max_rows {
            (TransferOutcome::Warning, MSG_BATCH_OVER_LIMIT)
        } else if total == self.max_rows {
            (TransferOutcome::Warning, MSG_ROWS_AT_LIMIT)
        } else {
            (TransferOutcome::Success, MSG_DOWNLOADED)
        }
    }
}

/// Removes a partially written artifact, if any.
fn discard(path: Option<&Path>) {
    let Some(path) = path else {
        return;
    };
    if path.exists()
        && let Err(err) = fs::remove_file(path)
    {
        tracing::warn!(path = %path.display(), error = %err, "failed to remove partial artifact");
    }
}

// ============================================================================
// SECTION: Sink Writers
// ============================================================================

/// Open file handle, plain or gzip.
enum FileWriter {
    /// Plain JSON.
    Plain(BufWriter<File>),
    /// Gzip-compressed JSON.
    Gzip(GzEncoder<BufWriter<File>>),
}

impl FileWriter {
    /// Creates the file for `artifact`.
    fn create(artifact: &StagingArtifact) -> io::Result<Self> {
        if let Some(parent) = artifact.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = BufWriter::new(File::create(&artifact.path)?);
        Ok(match artifact.compression {
            Compression::None => Self::Plain(file),
            Compression::Gzip => Self::Gzip(GzEncoder::new(file, flate2::Compression::default())),
        })
    }

    /// Flushes and, for gzip, writes the trailer.
    fn complete(self) -> io::Result<()> {
        match self {
            Self::Plain(mut file) => file.flush(),
            Self::Gzip(encoder) => encoder.finish()?.flush(),
        }
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(file) => file.write(buf),
            Self::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(file) => file.flush(),
            Self::Gzip(encoder) => encoder.flush(),
        }
    }
}

/// Writer behind the array writer. File sinks open on first write.
enum SinkWriter {
    /// In-memory buffer.
    Memory(Vec<u8>),
    /// Lazily created artifact file.
    File {
        /// Target artifact.
        artifact: StagingArtifact,
        /// Open handle once bytes have been written.
        writer: Option<FileWriter>,
    },
}

impl SinkWriter {
    /// Creates the writer for a sink without touching the filesystem.
    fn new(sink: DownloadSink) -> Self {
        match sink {
            DownloadSink::Memory => Self::Memory(Vec::new()),
            DownloadSink::File(artifact) => Self::File {
                artifact,
                writer: None,
            },
        }
    }

    /// Finalizes the sink and returns what it holds.
    fn complete(self) -> io::Result<SinkOutput> {
        match self {
            Self::Memory(buffer) => Ok(SinkOutput::Memory(
                String::from_utf8(buffer).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?,
            )),
            Self::File {
                artifact,
                writer: Some(writer),
            } => {
                writer.complete()?;
                Ok(SinkOutput::File(artifact))
            }
            Self::File { writer: None, .. } => Ok(SinkOutput::Empty),
        }
    }
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Memory(buffer) => buffer.write(buf),
            Self::File {
                artifact,
                writer,
            } => {
                if writer.is_none() {
                    *writer = Some(FileWriter::create(artifact)?);
                }
                match writer {
                    Some(open) => open.write(buf),
                    None => Ok(0),
                }
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Memory(_) => Ok(()),
            Self::File { writer, .. } => writer.as_mut().map_or(Ok(()), Write::flush),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_follows_row_cap_policy() {
        let downloader = Downloader::new(50_000, 50_000);
        assert_eq!(downloader.classify(0).0, TransferOutcome::Skipped);
        assert_eq!(downloader.classify(50_000), (TransferOutcome::Warning, MSG_ROWS_AT_LIMIT));
        assert_eq!(downloader.classify(49_999).0, TransferOutcome::Success);

        let oversized = Downloader::new(100, 50);
        assert_eq!(oversized.classify(51), (TransferOutcome::Warning, MSG_BATCH_OVER_LIMIT));
        assert_eq!(oversized.classify(50), (TransferOutcome::Warning, MSG_ROWS_AT_LIMIT));
        assert_eq!(oversized.classify(10).0, TransferOutcome::Success);
    }

    #[test]
    fn zero_page_size_is_raised() {
        assert_eq!(Downloader::new(0, 10).page_size(), 1);
    }
}
