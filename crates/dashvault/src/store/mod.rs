// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Checkpoint store abstraction
//!
//! The persistent store is an external collaborator; the engine asks only
//! for get-by-key, put-by-key, and a stable-ordered scan. Backends decide
//! the physical encoding, as long as schema version and payload are
//! recoverable from a stored record.

mod file;
mod memory;

pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::record::CheckpointRecord;

/// One page of a store scan.
#[derive(Clone, Debug)]
pub struct ScanPage {
    /// Records in this page, in ascending key order
    pub records: Vec<CheckpointRecord>,

    /// Cursor for the next page; `None` when the scan is exhausted.
    ///
    /// Cursors are stable across interruptions: resuming a scan with a
    /// cursor never revisits keys at or before it.
    pub next_cursor: Option<String>,
}

/// Persistent checkpoint storage.
///
/// Scan order must be stable (ascending key) so batch-migration cursors
/// survive interruption and resume without reprocessing.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Fetch the record stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<CheckpointRecord>, StoreError>;

    /// Store `record` under `key`, overwriting any existing record.
    async fn put(&self, key: &str, record: &CheckpointRecord) -> Result<(), StoreError>;

    /// Return up to `limit` records with keys strictly after `cursor`
    /// (or from the beginning when `cursor` is `None`).
    async fn scan(&self, cursor: Option<&str>, limit: usize) -> Result<ScanPage, StoreError>;
}
