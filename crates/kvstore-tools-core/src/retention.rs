// crates/kvstore-tools-core/src/retention.rs
// ============================================================================
// Module: Retention Manager
// Description: Prunes backup artifacts by cumulative size and age.
// Purpose: Keep the backup directory bounded without touching transfers.
// Dependencies: globset, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! A sweep lists files named like backup artifacts, orders them newest
//! first, and walks them while accumulating their sizes. Each file is
//! deleted when the running total exceeds the size cap or the file is older
//! than the age cap.
//! Invariants:
//! - The running total counts every visited file, deleted or not, so the
//!   newest files are the ones retained under the size cap.
//! - A zero threshold disables that check; both zero makes the sweep a no-op.
//! - Removal failures are collected and the sweep continues.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use globset::Glob;
use globset::GlobMatcher;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// File name pattern of backup artifacts.
pub const ARTIFACT_GLOB: &str = "*#*#*.json*";
/// Seconds per retention day.
const SECONDS_PER_DAY: u64 = 86_400;
/// Bytes per configured megabyte.
const BYTES_PER_MB: u64 = 1024 * 1024;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Thresholds applied by a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum file age in days; zero disables the check.
    pub max_age_days: u64,
    /// Maximum cumulative bytes; zero disables the check.
    pub max_size_bytes: u64,
}

impl RetentionPolicy {
    /// Builds a policy from configured days and megabytes.
    #[must_use]
    pub const fn from_settings(max_age_days: u64, max_size_mb: u64) -> Self {
        Self {
            max_age_days,
            max_size_bytes: max_size_mb.saturating_mul(BYTES_PER_MB),
        }
    }

    /// True when neither threshold is enabled.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.max_age_days == 0 && self.max_size_bytes == 0
    }
}

/// Why a file was deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionReason {
    /// Running total exceeded the size cap.
    Size,
    /// File older than the age cap.
    Age,
    /// Both thresholds held.
    SizeAndAge,
}

/// A file considered by a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionCandidate {
    /// File path.
    pub path: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Last modification time.
    pub modified: SystemTime,
}

/// A file removed by a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionDeletion {
    /// File path.
    pub path: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Threshold that triggered deletion.
    pub reason: DeletionReason,
}

/// File-level retention failure.
#[derive(Debug, Error)]
#[error("retention failed for {}: {source}", path.display())]
pub struct RetentionIoError {
    /// File or directory involved.
    pub path: PathBuf,
    /// Underlying error.
    #[source]
    pub source: io::Error,
}

/// Outcome of one sweep.
#[derive(Debug, Default)]
pub struct RetentionReport {
    /// Files removed.
    pub deleted: Vec<RetentionDeletion>,
    /// Files kept.
    pub retained: Vec<RetentionCandidate>,
    /// Removal failures.
    pub failures: Vec<RetentionIoError>,
}

// ============================================================================
// SECTION: Sweep
// ============================================================================

impl RetentionPolicy {
    /// Sweeps `dir` using the current time.
    ///
    /// # Errors
    ///
    /// Returns [`RetentionIoError`] when the directory cannot be listed.
    pub fn sweep(&self, dir: &Path) -> Result<RetentionReport, RetentionIoError> {
        self.sweep_at(dir, SystemTime::now())
    }

    /// Sweeps `dir` evaluating ages against `now`.
    ///
    /// # Errors
    ///
    /// Returns [`RetentionIoError`] when the directory cannot be listed.
    pub fn sweep_at(&self, dir: &Path, now: SystemTime) -> Result<RetentionReport, RetentionIoError> {
        let mut report = RetentionReport::default();
        if self.is_disabled() {
            tracing::debug!(dir = %dir.display(), "retention disabled");
            return Ok(report);
        }
        let max_age = Duration::from_secs(self.max_age_days.saturating_mul(SECONDS_PER_DAY));
        let mut running_total: u64 = 0;
        for candidate in list_candidates(dir)? {
            running_total = running_total.saturating_add(candidate.size_bytes);
            let over_size = self.max_size_bytes > 0 && running_total > self.max_size_bytes;
            let age = now.duration_since(candidate.modified).unwrap_or_default();
            let over_age = self.max_age_days > 0 && age > max_age;
            let reason = match (over_size, over_age) {
                (true, true) => DeletionReason::SizeAndAge,
                (true, false) => DeletionReason::Size,
                (false, true) => DeletionReason::Age,
                (false, false) => {
                    report.retained.push(candidate);
                    continue;
                }
            };
            match fs::remove_file(&candidate.path) {
                Ok(()) => {
                    tracing::info!(
                        path = %candidate.path.display(),
                        size_bytes = candidate.size_bytes,
                        ?reason,
                        "deleted backup artifact"
                    );
                    report.deleted.push(RetentionDeletion {
                        path: candidate.path,
                        size_bytes: candidate.size_bytes,
                        reason,
                    });
                }
                Err(source) => {
                    let err = RetentionIoError {
                        path: candidate.path,
                        source,
                    };
                    tracing::error!(error = %err, "failed to delete backup artifact");
                    report.failures.push(err);
                }
            }
        }
        Ok(report)
    }
}

/// Lists artifact-named files in `dir`, newest first.
fn list_candidates(dir: &Path) -> Result<Vec<RetentionCandidate>, RetentionIoError> {
    let matcher = artifact_matcher();
    let io_error = |path: &Path, source| RetentionIoError {
        path: path.to_path_buf(),
        source,
    };
    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir).map_err(|err| io_error(dir, err))? {
        let entry = entry.map_err(|err| io_error(dir, err))?;
        let path = entry.path();
        if !path.file_name().is_some_and(|name| matcher.as_ref().is_some_and(|m| m.is_match(name))) {
            continue;
        }
        let metadata = entry.metadata().map_err(|err| io_error(&path, err))?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().map_err(|err| io_error(&path, err))?;
        candidates.push(RetentionCandidate {
            path,
            size_bytes: metadata.len(),
            modified,
        });
    }
    candidates.sort_by(|left, right| {
        right.modified.cmp(&left.modified).then_with(|| right.path.cmp(&left.path))
    });
    Ok(candidates)
}

/// Compiles the artifact name matcher.
fn artifact_matcher() -> Option<GlobMatcher> {
    Glob::new(ARTIFACT_GLOB).ok().map(|glob| glob.compile_matcher())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn policy_converts_megabytes() {
        let policy = RetentionPolicy::from_settings(0, 6);
        assert_eq!(policy.max_size_bytes, 6 * 1024 * 1024);
        assert!(RetentionPolicy::from_settings(0, 0).is_disabled());
    }

    #[test]
    fn glob_matches_artifact_names_only() {
        let matcher = artifact_matcher().unwrap();
        assert!(matcher.is_match("search#lookups#20240101_000000.json"));
        assert!(matcher.is_match("search#lookups#20240101_000000.json.gz"));
        assert!(!matcher.is_match("search_lookups.json"));
        assert!(!matcher.is_match("notes#a.txt"));
    }
}
