// crates/kvstore-tools-core/tests/enumerate.rs
// ============================================================================
// Module: Collection Enumerator Tests
// Description: Scope filtering, deduplication, and listing failures.
// ============================================================================
//! ## Overview
//! Checks that enumeration applies the scope filter, skips disabled apps,
//! deduplicates globally shared collections, and fails closed.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;

use common::MockKvStore;
use common::api_for;
use kvstore_tools_core::CollectionFilter;
use kvstore_tools_core::EnumerationError;
use kvstore_tools_core::SharingLevel;
use kvstore_tools_core::enumerate_collections;
use kvstore_tools_core::resolve_collection_app;

fn populated() -> Arc<MockKvStore> {
    let store = MockKvStore::new();
    store.add_collection("search", "lookups", SharingLevel::App, Vec::new());
    store.add_collection("search", "notes", SharingLevel::App, Vec::new());
    store.add_collection("itsi", "shared", SharingLevel::Global, Vec::new());
    store.add_collection("itsi", "lookups", SharingLevel::App, Vec::new());
    store.add_app("retired", true);
    store
}

fn names(filter: &CollectionFilter, store: &Arc<MockKvStore>) -> Vec<String> {
    enumerate_collections(&api_for(store), filter)
        .unwrap()
        .into_iter()
        .map(|entry| entry.to_string())
        .collect()
}

#[test]
fn unfiltered_enumeration_lists_each_collection_once() {
    let store = populated();
    let listed = names(&CollectionFilter::all(), &store);
    assert_eq!(listed, vec!["search/lookups", "search/notes", "itsi/shared", "itsi/lookups"]);
    assert!(!store.requests().iter().any(|(_, url)| url.contains("/retired/")));
}

#[test]
fn app_filter_polls_only_that_app() {
    let store = populated();
    let filter = CollectionFilter {
        app: Some("search".to_string()),
        collection: None,
        global_scope: false,
    };
    assert_eq!(names(&filter, &store), vec!["search/lookups", "search/notes"]);
    assert!(!store.requests().iter().any(|(_, url)| url.contains("/apps/local")));
}

#[test]
fn global_scope_adds_shared_collections_to_app_filter() {
    let store = populated();
    let filter = CollectionFilter {
        app: Some("search".to_string()),
        collection: None,
        global_scope: true,
    };
    assert_eq!(names(&filter, &store), vec!["search/lookups", "search/notes", "itsi/shared"]);
}

#[test]
fn collection_filter_spans_apps() {
    let store = populated();
    let filter = CollectionFilter {
        app: None,
        collection: Some("lookups".to_string()),
        global_scope: false,
    };
    assert_eq!(names(&filter, &store), vec!["search/lookups", "itsi/lookups"]);
}

#[test]
fn listing_failure_aborts_enumeration() {
    let store = populated();
    store.fail_listing();
    let err = enumerate_collections(&api_for(&store), &CollectionFilter::all()).unwrap_err();
    assert!(matches!(err, EnumerationError::Apps(_)));
    assert!(err.to_string().starts_with("Failed to create app list"));
}

#[test]
fn resolve_collection_app_finds_owner_or_fails() {
    let store = populated();
    let api = api_for(&store);
    let found = resolve_collection_app(&api, "notes", None).unwrap();
    assert_eq!(found.app, "search");
    let scoped = resolve_collection_app(&api, "lookups", Some("itsi")).unwrap();
    assert_eq!(scoped.app, "itsi");
    let missing = resolve_collection_app(&api, "absent", None).unwrap_err();
    assert!(matches!(missing, EnumerationError::CollectionNotFound(name) if name == "absent"));
}
