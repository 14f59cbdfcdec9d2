// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! In-memory checkpoint store
//!
//! Development and test backend. A `BTreeMap` keeps keys ordered, which
//! gives scans their stable cursor semantics for free.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::record::CheckpointRecord;

use super::{CheckpointStore, ScanPage};

/// In-memory checkpoint store backed by an ordered map.
#[derive(Clone, Default)]
pub struct MemoryCheckpointStore {
    records: Arc<RwLock<BTreeMap<String, CheckpointRecord>>>,
}

impl MemoryCheckpointStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record directly, bypassing the trait.
    ///
    /// Test/seeding convenience.
    pub async fn seed(&self, record: CheckpointRecord) {
        let mut records = self.records.write().await;
        records.insert(record.key.clone(), record);
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, key: &str) -> Result<Option<CheckpointRecord>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, record: &CheckpointRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.insert(key.to_string(), record.clone());
        Ok(())
    }

    async fn scan(&self, cursor: Option<&str>, limit: usize) -> Result<ScanPage, StoreError> {
        let records = self.records.read().await;
        let range = match cursor {
            Some(c) => records.range::<str, _>((Bound::Excluded(c), Bound::Unbounded)),
            None => records.range::<str, _>((Bound::Unbounded, Bound::Unbounded)),
        };

        let page: Vec<CheckpointRecord> = range.take(limit).map(|(_, r)| r.clone()).collect();
        let next_cursor = if page.len() == limit {
            page.last().map(|r| r.key.clone())
        } else {
            None
        };

        Ok(ScanPage {
            records: page,
            next_cursor,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::Payload;

    fn record(key: &str, version: u32) -> CheckpointRecord {
        CheckpointRecord::new(key, version, Payload::new())
    }

    #[tokio::test]
    async fn get_returns_none_for_missing_key() {
        let store = MemoryCheckpointStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryCheckpointStore::new();
        let rec = record("thread-1", 2);
        store.put("thread-1", &rec).await.unwrap();
        let got = store.get("thread-1").await.unwrap().unwrap();
        assert_eq!(got, rec);
    }

    #[tokio::test]
    async fn scan_pages_in_key_order_with_stable_cursor() {
        let store = MemoryCheckpointStore::new();
        for key in ["c", "a", "e", "b", "d"] {
            store.seed(record(key, 1)).await;
        }

        let first = store.scan(None, 2).await.unwrap();
        let keys: Vec<&str> = first.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(first.next_cursor.as_deref(), Some("b"));

        let second = store.scan(first.next_cursor.as_deref(), 2).await.unwrap();
        let keys: Vec<&str> = second.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "d"]);

        let third = store.scan(second.next_cursor.as_deref(), 2).await.unwrap();
        let keys: Vec<&str> = third.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["e"]);
        assert!(third.next_cursor.is_none());
    }

    #[tokio::test]
    async fn scan_of_empty_store_is_exhausted_immediately() {
        let store = MemoryCheckpointStore::new();
        let page = store.scan(None, 10).await.unwrap();
        assert!(page.records.is_empty());
        assert!(page.next_cursor.is_none());
    }
}
