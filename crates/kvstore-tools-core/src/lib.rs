// crates/kvstore-tools-core/src/lib.rs
// ============================================================================
// Module: KV Store Tools Core
// Description: Collection transfer engine and backup retention.
// Purpose: Move KV store collections between hosts and files safely.
// Dependencies: crossbeam-channel, flate2, globset, serde, thiserror, time, tracing, url
// ============================================================================

//! ## Overview
//! This crate holds the transfer engine: collection enumeration, paginated
//! download with raw-text array stitching, batch-bounded upload with a JSON
//! repair ladder, the per-collection orchestrator, the retention sweep,
//! concurrent key deletion, and capability checks. All network access goes
//! through the [`Transport`] seam so the engine is testable without a server.
//! Invariants:
//! - A page's record count is the number of key markers in its raw text.
//! - Pagination ends only on a page with fewer records than the page size.
//! - No uploaded batch exceeds the destination's batch limit.
//! - Per-collection failures are reported as results, never raised.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod api;
pub mod array_writer;
pub mod artifact;
pub mod authz;
pub mod bulk_delete;
pub mod download;
pub mod enumerate;
pub mod identity;
pub mod outcome;
pub mod retention;
pub mod transfer;
pub mod transport;
pub mod upload;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use api::ApiError;
pub use api::CurrentContext;
pub use api::KvStoreApi;
pub use api::KvStoreEndpoint;
pub use api::SessionToken;
pub use api::UserRoles;
pub use api::login;
pub use array_writer::JsonArrayWriter;
pub use artifact::ArtifactError;
pub use artifact::Compression;
pub use artifact::StagingArtifact;
pub use artifact::find_artifacts;
pub use artifact::list_artifacts;
pub use authz::AuthorizationError;
pub use authz::authorize;
pub use authz::ensure_capability;
pub use authz::resolve_role_closure;
pub use authz::users_with_role;
pub use bulk_delete::BulkDeleter;
pub use bulk_delete::ConnectionPool;
pub use bulk_delete::KeyDeleteResult;
pub use bulk_delete::delete_key;
pub use download::DownloadReport;
pub use download::DownloadSink;
pub use download::Downloader;
pub use download::SinkOutput;
pub use enumerate::EnumerationError;
pub use enumerate::enumerate_collections;
pub use enumerate::resolve_collection_app;
pub use identity::CollectionFilter;
pub use identity::CollectionIdentity;
pub use identity::SharingLevel;
pub use outcome::TransferOutcome;
pub use retention::DeletionReason;
pub use retention::RetentionIoError;
pub use retention::RetentionPolicy;
pub use retention::RetentionReport;
pub use transfer::PhaseDurations;
pub use transfer::TransferError;
pub use transfer::TransferOrchestrator;
pub use transfer::TransferResult;
pub use transfer::backup_collection;
pub use transfer::restore_artifacts;
pub use transport::HttpMethod;
pub use transport::Transport;
pub use transport::TransportError;
pub use transport::TransportRequest;
pub use transport::TransportResponse;
pub use upload::UploadReport;
pub use upload::Uploader;
pub use upload::parse_records;
