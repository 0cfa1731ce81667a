// crates/kvstore-tools-core/src/identity.rs
// ============================================================================
// Module: Collection Identity
// Description: Typed identities and scope filters for KV store collections.
// Purpose: Replace ad-hoc (app, collection) pairs with validated types.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`CollectionIdentity`] names one collection on one host. A
//! [`CollectionFilter`] is the scope filter an operation was invoked with.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Sharing Level
// ============================================================================

/// ACL sharing level reported by the collection config endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharingLevel {
    /// Visible to the owning user only.
    #[serde(alias = "user")]
    Private,
    /// Visible within the owning app.
    #[default]
    App,
    /// Visible from every app.
    Global,
}

// ============================================================================
// SECTION: Collection Identity
// ============================================================================

/// Identity of a single collection.
///
/// # Invariants
/// - Two identities refer to the same collection when `app` and `name` match;
///   `sharing` is metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionIdentity {
    /// Owning app.
    pub app: String,
    /// Collection name.
    pub name: String,
    /// ACL sharing level.
    #[serde(default)]
    pub sharing: SharingLevel,
}

impl CollectionIdentity {
    /// Creates an identity with app-level sharing.
    #[must_use]
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            name: name.into(),
            sharing: SharingLevel::App,
        }
    }

    /// Returns a copy with the given sharing level.
    #[must_use]
    pub fn with_sharing(mut self, sharing: SharingLevel) -> Self {
        self.sharing = sharing;
        self
    }
}

impl fmt::Display for CollectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app, self.name)
    }
}

// ============================================================================
// SECTION: Scope Filter
// ============================================================================

/// Scope filter selecting which collections an operation targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionFilter {
    /// Only this app, when set.
    pub app: Option<String>,
    /// Only this collection name, when set.
    pub collection: Option<String>,
    /// Include globally shared collections from any app.
    pub global_scope: bool,
}

impl CollectionFilter {
    /// Filter matching every collection.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Returns true when the entry passes the filter.
    ///
    /// An entry is included when any of these hold: both filters match
    /// exactly; no app filter and the collection matches; the app matches and
    /// there is no collection filter; the entry is globally shared and global
    /// scope is on; neither filter is set.
    #[must_use]
    pub fn matches(&self, entry: &CollectionIdentity) -> bool {
        let app = self.app.as_deref();
        let collection = self.collection.as_deref();
        let app_matches = app == Some(entry.app.as_str());
        let collection_matches = collection == Some(entry.name.as_str());
        (app_matches && collection_matches)
            || (app.is_none() && collection_matches)
            || (app_matches && collection.is_none())
            || (entry.sharing == SharingLevel::Global && self.global_scope)
            || (app.is_none() && collection.is_none())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    fn entry(app: &str, name: &str, sharing: SharingLevel) -> CollectionIdentity {
        CollectionIdentity::new(app, name).with_sharing(sharing)
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = CollectionFilter::all();
        assert!(filter.matches(&entry("search", "lookups", SharingLevel::App)));
        assert!(filter.matches(&entry("other", "x", SharingLevel::Private)));
    }

    #[test]
    fn app_and_collection_must_both_match() {
        let filter = CollectionFilter {
            app: Some("search".to_string()),
            collection: Some("lookups".to_string()),
            global_scope: false,
        };
        assert!(filter.matches(&entry("search", "lookups", SharingLevel::App)));
        assert!(!filter.matches(&entry("search", "other", SharingLevel::App)));
        assert!(!filter.matches(&entry("other", "lookups", SharingLevel::App)));
    }

    #[test]
    fn collection_only_filter_spans_apps() {
        let filter = CollectionFilter {
            app: None,
            collection: Some("lookups".to_string()),
            global_scope: false,
        };
        assert!(filter.matches(&entry("a", "lookups", SharingLevel::App)));
        assert!(filter.matches(&entry("b", "lookups", SharingLevel::App)));
        assert!(!filter.matches(&entry("a", "other", SharingLevel::App)));
    }

    #[test]
    fn global_scope_admits_global_collections_from_other_apps() {
        let filter = CollectionFilter {
            app: Some("search".to_string()),
            collection: None,
            global_scope: true,
        };
        assert!(filter.matches(&entry("itsi", "shared", SharingLevel::Global)));
        assert!(!filter.matches(&entry("itsi", "local", SharingLevel::App)));
    }

    #[test]
    fn sharing_accepts_user_alias() {
        let parsed: SharingLevel = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(parsed, SharingLevel::Private);
        let parsed: SharingLevel = serde_json::from_str("\"global\"").unwrap();
        assert_eq!(parsed, SharingLevel::Global);
    }
}
