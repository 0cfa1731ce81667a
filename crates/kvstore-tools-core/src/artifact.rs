// crates/kvstore-tools-core/src/artifact.rs
// ============================================================================
// Module: Staging Artifacts
// Description: Naming, parsing, and lookup of collection snapshot files.
// Purpose: Give backup and staging files one deterministic naming scheme.
// Dependencies: globset, thiserror, time
// ============================================================================

//! ## Overview
//! A staging artifact is a file holding one collection snapshot as a JSON
//! array, named `<app>#<collection>#<YYYYMMDD_HHMMSS>.json` (or `.json.gz`
//! when gzip-compressed).
//! Invariants:
//! - A name parses back only with exactly three `#`-separated parts and a
//!   supported extension.
//! - [`StagingArtifact::unique`] never returns the path of an existing file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use globset::Glob;
use globset::GlobMatcher;
use thiserror::Error;
use time::Duration;
use time::OffsetDateTime;
use time::PrimitiveDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::identity::CollectionIdentity;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Timestamp layout embedded in artifact names.
const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]_[hour][minute][second]");
/// Separator between name components.
const NAME_SEPARATOR: char = '#';
/// Upper bound on timestamp bumps when searching for a free name.
const MAX_NAME_ATTEMPTS: u32 = 3600;

// ============================================================================
// SECTION: Compression
// ============================================================================

/// On-disk encoding of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    /// Plain UTF-8 JSON.
    #[default]
    None,
    /// Gzip-compressed JSON.
    Gzip,
}

impl Compression {
    /// Maps a boolean compression flag.
    #[must_use]
    pub const fn from_flag(compress: bool) -> Self {
        if compress { Self::Gzip } else { Self::None }
    }

    /// File extension including the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::None => ".json",
            Self::Gzip => ".json.gz",
        }
    }

    /// Detects compression from a file name, if the extension is supported.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.ends_with(Self::Gzip.extension()) {
            Some(Self::Gzip)
        } else if name.ends_with(Self::None.extension()) {
            Some(Self::None)
        } else {
            None
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while searching for artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The file name pattern is not a valid glob.
    #[error("invalid artifact pattern {pattern}: {reason}")]
    Pattern {
        /// Offending pattern.
        pattern: String,
        /// Glob compile failure.
        reason: String,
    },
    /// A directory could not be read.
    #[error("unable to read {path}: {source}")]
    Io {
        /// Directory being listed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

// ============================================================================
// SECTION: Artifact
// ============================================================================

/// One collection snapshot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArtifact {
    /// Full file path.
    pub path: PathBuf,
    /// Source app.
    pub app: String,
    /// Source collection.
    pub collection: String,
    /// Capture time (local wall clock, second precision).
    pub captured_at: PrimitiveDateTime,
    /// On-disk encoding.
    pub compression: Compression,
}

impl StagingArtifact {
    /// Builds the artifact for `identity` inside `dir`.
    #[must_use]
    pub fn new(
        dir: &Path,
        identity: &CollectionIdentity,
        captured_at: PrimitiveDateTime,
        compression: Compression,
    ) -> Self {
        let name = artifact_file_name(&identity.app, &identity.name, captured_at, compression);
        Self {
            path: dir.join(name),
            app: identity.app.clone(),
            collection: identity.name.clone(),
            captured_at,
            compression,
        }
    }

    /// Builds an artifact whose path does not exist yet, advancing the
    /// timestamp one second at a time while the name is taken.
    #[must_use]
    pub fn unique(
        dir: &Path,
        identity: &CollectionIdentity,
        captured_at: PrimitiveDateTime,
        compression: Compression,
    ) -> Self {
        let mut candidate = Self::new(dir, identity, captured_at, compression);
        let mut attempts = 0;
        while candidate.path.exists() && attempts < MAX_NAME_ATTEMPTS {
            let Some(next) = candidate.captured_at.checked_add(Duration::SECOND) else {
                break;
            };
            candidate = Self::new(dir, identity, next, compression);
            attempts += 1;
        }
        candidate
    }

    /// Parses an artifact from its path. Returns `None` when the file name
    /// does not follow the naming scheme.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name().and_then(OsStr::to_str)?;
        let compression = Compression::from_file_name(name)?;
        let stem = name.strip_suffix(compression.extension())?;
        let mut parts = stem.split(NAME_SEPARATOR);
        let (Some(app), Some(collection), Some(stamp), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return None;
        };
        if app.is_empty() || collection.is_empty() {
            return None;
        }
        let captured_at = PrimitiveDateTime::parse(stamp, TIMESTAMP_FORMAT).ok()?;
        Some(Self {
            path: path.to_path_buf(),
            app: app.to_string(),
            collection: collection.to_string(),
            captured_at,
            compression,
        })
    }

    /// Identity of the collection this artifact was captured from.
    #[must_use]
    pub fn identity(&self) -> CollectionIdentity {
        CollectionIdentity::new(self.app.clone(), self.collection.clone())
    }

    /// File name component of the path.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

// ============================================================================
// SECTION: Naming
// ============================================================================

/// Returns the artifact file name for a collection snapshot.
#[must_use]
pub fn artifact_file_name(
    app: &str,
    collection: &str,
    captured_at: PrimitiveDateTime,
    compression: Compression,
) -> String {
    format!(
        "{app}{NAME_SEPARATOR}{collection}{NAME_SEPARATOR}{}{}",
        format_timestamp(captured_at),
        compression.extension()
    )
}

/// Formats a capture time as `YYYYMMDD_HHMMSS`.
#[must_use]
pub fn format_timestamp(captured_at: PrimitiveDateTime) -> String {
    captured_at.format(TIMESTAMP_FORMAT).unwrap_or_default()
}

/// Current local time truncated to whole seconds. Falls back to UTC when the
/// local offset cannot be determined.
#[must_use]
pub fn capture_timestamp() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let time = now.time().replace_nanosecond(0).unwrap_or_else(|_| now.time());
    PrimitiveDateTime::new(now.date(), time)
}

// ============================================================================
// SECTION: Lookup
// ============================================================================

/// Lists every artifact in `dir`, sorted by file name.
///
/// # Errors
///
/// Returns [`ArtifactError::Io`] when the directory cannot be read.
pub fn list_artifacts(dir: &Path) -> Result<Vec<StagingArtifact>, ArtifactError> {
    scan_dir(dir, None)
}

/// Resolves a restore file pattern.
///
/// The pattern's file name is a glob. It is matched first against the
/// pattern's own directory (when it names one that exists), then against
/// `default_dir`. The first directory with matches wins.
///
/// # Errors
///
/// Returns [`ArtifactError`] on an invalid glob or unreadable directory.
pub fn find_artifacts(
    pattern: &str,
    default_dir: &Path,
) -> Result<Vec<StagingArtifact>, ArtifactError> {
    let pattern_path = Path::new(pattern);
    let invalid = |reason: &str| ArtifactError::Pattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };
    let file_pattern = pattern_path
        .file_name()
        .and_then(OsStr::to_str)
        .ok_or_else(|| invalid("pattern has no file name"))?;
    let matcher = Glob::new(file_pattern)
        .map_err(|err| invalid(&err.to_string()))?
        .compile_matcher();

    let mut dirs: Vec<PathBuf> = Vec::new();
    if let Some(parent) = pattern_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        dirs.push(parent.to_path_buf());
    }
    dirs.push(default_dir.to_path_buf());

    for dir in dirs {
        if !dir.is_dir() {
            continue;
        }
        let found = scan_dir(&dir, Some(&matcher))?;
        if !found.is_empty() {
            return Ok(found);
        }
    }
    Ok(Vec::new())
}

/// Collects artifacts in `dir` whose names pass the optional matcher.
fn scan_dir(dir: &Path, matcher: Option<&GlobMatcher>) -> Result<Vec<StagingArtifact>, ArtifactError> {
    let io_error = |source| ArtifactError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut artifacts = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(matcher) = matcher
            && !path.file_name().is_some_and(|name| matcher.is_match(name))
        {
            continue;
        }
        if let Some(artifact) = StagingArtifact::from_path(&path) {
            artifacts.push(artifact);
        }
    }
    artifacts.sort_by(|left, right| left.path.cmp(&right.path));
    Ok(artifacts)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
