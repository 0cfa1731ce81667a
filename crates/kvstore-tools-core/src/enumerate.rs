// crates/kvstore-tools-core/src/enumerate.rs
// ============================================================================
// Module: Collection Enumerator
// Description: Resolves a scope filter into collection identities.
// Purpose: Produce the work list for backup and transfer operations.
// Dependencies: thiserror, tracing
// ============================================================================

//! ## Overview
//! Lists apps (or uses the filtered app), lists each app's collections with
//! ACL metadata, and keeps the entries the [`CollectionFilter`] admits.
//! Invariants:
//! - Output is deduplicated by `(app, name)` and ordered by discovery.
//! - Any listing failure aborts enumeration; no partial list is returned.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;

use thiserror::Error;

use crate::api::ApiError;
use crate::api::KvStoreApi;
use crate::identity::CollectionFilter;
use crate::identity::CollectionIdentity;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors that abort enumeration.
#[derive(Debug, Error)]
pub enum EnumerationError {
    /// The app listing failed.
    #[error("Failed to create app list: {0}")]
    Apps(#[source] ApiError),
    /// A collection listing failed.
    #[error("Failed to download collection list for {app}: {source}")]
    Collections {
        /// App being listed.
        app: String,
        /// Underlying failure.
        #[source]
        source: ApiError,
    },
    /// No collection matched a required lookup.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
}

// ============================================================================
// SECTION: Enumeration
// ============================================================================

/// Resolves `filter` into a deduplicated, discovery-ordered list.
///
/// # Errors
///
/// Returns [`EnumerationError`] when any listing call fails.
pub fn enumerate_collections(
    api: &KvStoreApi,
    filter: &CollectionFilter,
) -> Result<Vec<CollectionIdentity>, EnumerationError> {
    let apps = match &filter.app {
        Some(app) => vec![app.clone()],
        None => api.list_apps().map_err(EnumerationError::Apps)?,
    };
    tracing::debug!(apps = apps.len(), "enumerating collections");

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut collections = Vec::new();
    for app in &apps {
        let entries =
            api.list_collections(app).map_err(|source| EnumerationError::Collections {
                app: app.clone(),
                source,
            })?;
        for entry in entries {
            if !filter.matches(&entry) {
                continue;
            }
            if seen.insert((entry.app.clone(), entry.name.clone())) {
                collections.push(entry);
            }
        }
    }
    tracing::info!(collections = collections.len(), "enumerated collections");
    Ok(collections)
}

/// Finds the identity of a named collection, optionally restricted to `app`.
///
/// # Errors
///
/// Returns [`EnumerationError::CollectionNotFound`] when nothing matches, or
/// the listing failure.
pub fn resolve_collection_app(
    api: &KvStoreApi,
    collection: &str,
    app: Option<&str>,
) -> Result<CollectionIdentity, EnumerationError> {
    let filter = CollectionFilter {
        app: app.map(str::to_string),
        collection: Some(collection.to_string()),
        global_scope: false,
    };
    enumerate_collections(api, &filter)?
        .into_iter()
        .find(|entry| entry.name == collection && app.is_none_or(|app| entry.app == app))
        .ok_or_else(|| EnumerationError::CollectionNotFound(collection.to_string()))
}
