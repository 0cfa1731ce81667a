// crates/kvstore-tools-core/src/bulk_delete.rs
// ============================================================================
// Module: Bulk Key Delete
// Description: Deletes many records by key with a fixed worker pool.
// Purpose: Overlap request preparation while sharing a bounded set of connections.
// Dependencies: crossbeam-channel, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! Keys are queued on a task channel and drained by a fixed number of scoped
//! worker threads. Each request runs on a connection leased from an explicit
//! [`ConnectionPool`]; with the default pool size of one, requests are
//! prepared concurrently but sent one at a time.
//! Invariants:
//! - One [`KeyDeleteResult`] per input key, in input order.
//! - Empty keys are reported as errors without issuing a request.
//! - A lease always returns its connection to the pool on drop.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ops::Deref;
use std::thread;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use crossbeam_channel::bounded;
use crossbeam_channel::unbounded;
use serde::Serialize;
use thiserror::Error;

use crate::api::KvStoreApi;
use crate::identity::CollectionIdentity;
use crate::outcome::TransferOutcome;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of delete workers.
pub const DEFAULT_WORKERS: usize = 4;
/// Default number of pooled connections.
pub const DEFAULT_POOL_SIZE: usize = 1;

// ============================================================================
// SECTION: Connection Pool
// ============================================================================

/// Errors raised by the connection pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool has no connections and can never produce one.
    #[error("connection pool is closed")]
    Closed,
}

/// Fixed set of API clients handed out one lease at a time.
#[derive(Debug)]
pub struct ConnectionPool {
    /// Returns connections to the pool.
    sender: Sender<KvStoreApi>,
    /// Hands connections out.
    receiver: Receiver<KvStoreApi>,
    /// Number of connections owned by the pool.
    size: usize,
}

impl ConnectionPool {
    /// Creates a pool of `size` clones of `api`. A zero size is raised to one.
    #[must_use]
    pub fn new(api: &KvStoreApi, size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = bounded(size);
        for _ in 0..size {
            if sender.send(api.clone()).is_err() {
                break;
            }
        }
        Self {
            sender,
            receiver,
            size,
        }
    }

    /// Number of connections owned by the pool.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Blocks until a connection is free and leases it.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] if the pool can no longer yield
    /// connections.
    pub fn lease(&self) -> Result<PooledConnection<'_>, PoolError> {
        let api = self.receiver.recv().map_err(|_| PoolError::Closed)?;
        Ok(PooledConnection {
            pool: self,
            api,
        })
    }
}

/// A leased connection, returned to its pool on drop.
#[derive(Debug)]
pub struct PooledConnection<'a> {
    /// Owning pool.
    pool: &'a ConnectionPool,
    /// Leased client.
    api: KvStoreApi,
}

impl Deref for PooledConnection<'_> {
    type Target = KvStoreApi;

    fn deref(&self) -> &Self::Target {
        &self.api
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if self.pool.sender.send(self.api.clone()).is_err() {
            tracing::warn!("connection pool closed before lease returned");
        }
    }
}

// ============================================================================
// SECTION: Bulk Deleter
// ============================================================================

/// Result of deleting one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyDeleteResult {
    /// Record key.
    pub key: String,
    /// Terminal status (`success` or `error`).
    #[serde(rename = "result")]
    pub status: TransferOutcome,
    /// Human-readable message.
    pub message: String,
}

/// Deletes keys concurrently through a [`ConnectionPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkDeleter {
    /// Worker thread count.
    workers: usize,
}

impl Default for BulkDeleter {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl BulkDeleter {
    /// Creates a deleter with `workers` threads. Zero is raised to one.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Deletes every key from `collection`. Results follow input order.
    #[must_use]
    pub fn delete_keys(
        &self,
        pool: &ConnectionPool,
        collection: &CollectionIdentity,
        keys: &[String],
    ) -> Vec<KeyDeleteResult> {
        if keys.is_empty() {
            return Vec::new();
        }
        let (task_tx, task_rx) = bounded::<(usize, &str)>(keys.len());
        for (index, key) in keys.iter().enumerate() {
            if task_tx.send((index, key.as_str())).is_err() {
                break;
            }
        }
        drop(task_tx);

        let (result_tx, result_rx) = unbounded::<(usize, KeyDeleteResult)>();
        thread::scope(|scope| {
            for _ in 0..self.workers.min(keys.len()) {
                let tasks = task_rx.clone();
                let results = result_tx.clone();
                scope.spawn(move || {
                    while let Ok((index, key)) = tasks.recv() {
                        let result = delete_one(pool, collection, key);
                        if results.send((index, result)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        let mut indexed: Vec<(usize, KeyDeleteResult)> = result_rx.iter().collect();
        indexed.sort_by_key(|(index, _)| *index);
        let results: Vec<KeyDeleteResult> = indexed.into_iter().map(|(_, result)| result).collect();
        let failed = results.iter().filter(|result| result.status.is_error()).count();
        tracing::info!(
            %collection,
            requested = keys.len(),
            failed,
            "bulk delete complete"
        );
        results
    }
}

/// Deletes a single key on a leased connection.
fn delete_one(pool: &ConnectionPool, collection: &CollectionIdentity, key: &str) -> KeyDeleteResult {
    match pool.lease() {
        Ok(connection) => delete_key(&connection, collection, key),
        Err(err) => KeyDeleteResult {
            key: key.to_string(),
            status: TransferOutcome::Error,
            message: err.to_string(),
        },
    }
}

/// Deletes one record by key. Blank keys fail without a request.
#[must_use]
pub fn delete_key(api: &KvStoreApi, collection: &CollectionIdentity, key: &str) -> KeyDeleteResult {
    let report = |status, message: String| KeyDeleteResult {
        key: key.to_string(),
        status,
        message,
    };
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return report(TransferOutcome::Error, "Empty key".to_string());
    }
    match api.delete_record(collection, trimmed) {
        Ok(()) => {
            tracing::debug!(%collection, key = trimmed, "deleted key");
            report(TransferOutcome::Success, format!("Deleted key {trimmed}"))
        }
        Err(err) => {
            tracing::error!(%collection, key = trimmed, error = %err, "failed to delete key");
            report(TransferOutcome::Error, format!("Failed to delete key: {err}"))
        }
    }
}
