// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! File-based checkpoint store
//!
//! One file per thread key under a flat directory, bincode-encoded
//! [`StoredCheckpoint`] wrappers. Writes go through a temp file and an
//! atomic rename so a crash never leaves a half-written record behind.
//! Scans are tolerant of individual corrupt files: they are skipped with
//! a warning rather than aborting the whole pass.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::record::{CheckpointRecord, StoredCheckpoint};

use super::{CheckpointStore, ScanPage};

const CHECKPOINT_EXTENSION: &str = ".ckpt.bin";
const MAX_KEY_LENGTH: usize = 200;

/// Validate a thread key for use as a file name.
///
/// Keys may contain letters, digits, underscores, hyphens, and dots, and
/// must not start with a dot. Anything else would let a key escape the
/// store directory or collide with temp files.
fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: "key cannot be empty".to_string(),
        });
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: format!("key exceeds maximum length of {MAX_KEY_LENGTH} characters"),
        });
    }
    if key.starts_with('.') {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: "key cannot start with a dot".to_string(),
        });
    }
    for c in key.chars() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' && c != '.' {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: format!("key contains invalid character '{c}'"),
            });
        }
    }
    Ok(())
}

/// File-based checkpoint store.
pub struct FileCheckpointStore {
    directory: PathBuf,
}

impl FileCheckpointStore {
    /// Create a store rooted at `directory`, creating it if needed.
    ///
    /// Performs blocking filesystem work; call before entering the hot
    /// path, or from a blocking context.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    /// The directory records live in.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{key}{CHECKPOINT_EXTENSION}"))
    }

    fn read_record(path: &Path, key: &str) -> Result<CheckpointRecord, StoreError> {
        let bytes = std::fs::read(path)?;
        let stored: StoredCheckpoint =
            bincode::deserialize(&bytes).map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: format!("failed to decode checkpoint file: {e}"),
            })?;
        stored.decode(key)
    }

    fn write_record_atomic(
        directory: &Path,
        key: &str,
        record: &CheckpointRecord,
    ) -> Result<(), StoreError> {
        let stored = StoredCheckpoint::encode(record)?;
        let bytes = bincode::serialize(&stored).map_err(|e| StoreError::Serialization {
            reason: format!("failed to encode checkpoint '{key}': {e}"),
        })?;

        let final_path = directory.join(format!("{key}{CHECKPOINT_EXTENSION}"));
        let tmp_path = directory.join(format!(".{key}.tmp"));

        {
            use std::io::Write;
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    /// All keys present on disk, ascending.
    fn list_keys(directory: &Path) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(directory)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            if let Some(key) = name.strip_suffix(CHECKPOINT_EXTENSION) {
                keys.push(key.to_string());
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get(&self, key: &str) -> Result<Option<CheckpointRecord>, StoreError> {
        validate_key(key)?;
        let path = self.record_path(key);
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            if !path.exists() {
                return Ok(None);
            }
            Self::read_record(&path, &key).map(Some)
        })
        .await
        .map_err(|e| StoreError::Backend {
            reason: format!("task join error reading checkpoint '{e}'"),
        })?
    }

    async fn put(&self, key: &str, record: &CheckpointRecord) -> Result<(), StoreError> {
        validate_key(key)?;
        let directory = self.directory.clone();
        let key = key.to_string();
        let record = record.clone();

        tokio::task::spawn_blocking(move || Self::write_record_atomic(&directory, &key, &record))
            .await
            .map_err(|e| StoreError::Backend {
                reason: format!("task join error writing checkpoint '{e}'"),
            })?
    }

    async fn scan(&self, cursor: Option<&str>, limit: usize) -> Result<ScanPage, StoreError> {
        let directory = self.directory.clone();
        let cursor = cursor.map(str::to_string);

        tokio::task::spawn_blocking(move || {
            let keys = Self::list_keys(&directory)?;
            let mut remaining: Vec<String> = keys
                .into_iter()
                .filter(|k| cursor.as_ref().map_or(true, |c| k.as_str() > c.as_str()))
                .collect();

            let has_more = remaining.len() > limit;
            remaining.truncate(limit);
            let next_cursor = if has_more {
                remaining.last().cloned()
            } else {
                None
            };

            let mut records = Vec::with_capacity(remaining.len());
            for key in &remaining {
                let path = directory.join(format!("{key}{CHECKPOINT_EXTENSION}"));
                match Self::read_record(&path, key) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        tracing::warn!(key = %key, "skipping unreadable checkpoint file in scan: {e}");
                    }
                }
            }

            Ok(ScanPage {
                records,
                next_cursor,
            })
        })
        .await
        .map_err(|e| StoreError::Backend {
            reason: format!("task join error scanning checkpoints '{e}'"),
        })?
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::Payload;
    use serde_json::json;

    fn record(key: &str, version: u32) -> CheckpointRecord {
        let payload: Payload = [("destination".to_string(), json!("Paris"))]
            .into_iter()
            .collect();
        CheckpointRecord::new(key, version, payload)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();

        let rec = record("thread-1", 3);
        store.put("thread-1", &rec).await.unwrap();

        let got = store.get("thread-1").await.unwrap().unwrap();
        assert_eq!(got.schema_version, 3);
        assert_eq!(got.payload, rec.payload);
    }

    #[tokio::test]
    async fn get_missing_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        assert!(store.get("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_overwrites_existing_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();

        store.put("t", &record("t", 1)).await.unwrap();
        store.put("t", &record("t", 2)).await.unwrap();

        let got = store.get("t").await.unwrap().unwrap();
        assert_eq!(got.schema_version, 2);
    }

    #[tokio::test]
    async fn keys_with_path_characters_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();

        for bad in ["../escape", "a/b", "", ".hidden"] {
            let err = store.get(bad).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidKey { .. }), "key: {bad:?}");
        }
    }

    #[tokio::test]
    async fn scan_pages_in_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();

        for key in ["charlie", "alpha", "bravo"] {
            store.put(key, &record(key, 1)).await.unwrap();
        }

        let first = store.scan(None, 2).await.unwrap();
        let keys: Vec<&str> = first.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "bravo"]);
        assert_eq!(first.next_cursor.as_deref(), Some("bravo"));

        let second = store.scan(first.next_cursor.as_deref(), 2).await.unwrap();
        let keys: Vec<&str> = second.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["charlie"]);
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn scan_skips_corrupt_files_without_aborting() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();

        store.put("good-1", &record("good-1", 1)).await.unwrap();
        store.put("good-2", &record("good-2", 1)).await.unwrap();
        std::fs::write(dir.path().join("broken.ckpt.bin"), b"not bincode").unwrap();

        let page = store.scan(None, 10).await.unwrap();
        let keys: Vec<&str> = page.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["good-1", "good-2"]);
    }

    #[tokio::test]
    async fn get_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("bad.ckpt.bin"), b"garbage").unwrap();

        let err = store.get("bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref key, .. } if key == "bad"));
    }

    #[tokio::test]
    async fn no_temp_files_left_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        store.put("t", &record("t", 1)).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
