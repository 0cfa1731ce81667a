// crates/kvstore-tools-core/src/array_writer.rs
// ============================================================================
// Module: Streaming JSON Array Writer
// Description: Stitches raw page bodies into one JSON array without parsing.
// Purpose: Keep pagination output linear in page size with no reparse.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Each page returned by the data endpoint is itself a JSON array. Instead of
//! parsing and re-serializing every page, [`JsonArrayWriter`] strips the outer
//! brackets from the raw text and splices the bodies together.
//! Invariants:
//! - `[` is written before the first non-empty page only.
//! - `,` is written before every later non-empty page.
//! - `]` is written by [`JsonArrayWriter::finish`] only if `[` was written.
//! - Nothing reaches the inner writer until a non-empty page arrives.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;

// ============================================================================
// SECTION: Page Helpers
// ============================================================================

/// Returns the page body with surrounding whitespace and one outer pair of
/// array brackets removed.
#[must_use]
pub fn page_body(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('[').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(']').unwrap_or(trimmed);
    trimmed.trim()
}

/// Counts occurrences of the quoted key marker in raw page text.
///
/// `marker` is the bare field name, for example `_key`.
#[must_use]
pub fn count_markers(raw: &str, marker: &str) -> usize {
    if marker.is_empty() {
        return 0;
    }
    let quoted = format!("\"{marker}\"");
    raw.matches(quoted.as_str()).count()
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Streaming writer that assembles raw page bodies into a JSON array.
#[derive(Debug)]
pub struct JsonArrayWriter<W: Write> {
    /// Destination for the assembled bytes.
    inner: W,
    /// Whether the opening bracket has been written.
    opened: bool,
    /// Number of non-empty pages written.
    pages: usize,
}

impl<W: Write> JsonArrayWriter<W> {
    /// Wraps a writer.
    pub const fn new(inner: W) -> Self {
        Self {
            inner,
            opened: false,
            pages: 0,
        }
    }

    /// Appends one raw page. Returns `true` when the page contributed bytes.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the inner writer.
    pub fn write_page(&mut self, raw: &str) -> io::Result<bool> {
        let body = page_body(raw);
        if body.is_empty() {
            return Ok(false);
        }
        if self.opened {
            self.inner.write_all(b",")?;
        } else {
            self.inner.write_all(b"[")?;
            self.opened = true;
        }
        self.inner.write_all(body.as_bytes())?;
        self.pages += 1;
        Ok(true)
    }

    /// Returns true once a non-empty page has been written.
    pub const fn is_open(&self) -> bool {
        self.opened
    }

    /// Number of non-empty pages written so far.
    pub const fn pages(&self) -> usize {
        self.pages
    }

    /// Closes the array and returns the inner writer.
    ///
    /// # Errors
    ///
    /// Returns any error raised while writing or flushing.
    pub fn finish(mut self) -> io::Result<W> {
        if self.opened {
            self.inner.write_all(b"]")?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
