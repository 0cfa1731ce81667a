// crates/kvstore-tools-core/src/outcome.rs
// ============================================================================
// Module: Transfer Outcome
// Description: Terminal status shared by downloads, uploads, and transfers.
// Purpose: One vocabulary for every per-collection report.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`TransferOutcome`] serializes in lowercase and orders by severity, so the
//! worst outcome of several phases is their maximum.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Terminal status of a per-collection operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TransferOutcome {
    /// Completed without caveats.
    Success,
    /// Nothing to do.
    Skipped,
    /// Completed, but the result may be incomplete.
    Warning,
    /// Failed.
    Error,
}

impl TransferOutcome {
    /// Lowercase label used in output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// True for [`TransferOutcome::Error`].
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
