// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Lazy migration on the read path
//!
//! [`MigratingLoader`] wraps the checkpoint store's read side: on every
//! load it inspects the stored schema version, resolves and applies the
//! migration path, optionally writes the upgraded record back, and hands
//! the caller a current-version record. Callers never see a partially
//! migrated or ambiguously versioned record.
//!
//! No locking is involved. Transforms are deterministic and idempotent,
//! so two concurrent loads of the same stale key compute identical
//! upgrades and their write-backs converge; serializing them would only
//! save redundant I/O.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{LoadError, StoreError};
use crate::record::CheckpointRecord;
use crate::registry::MigrationRegistry;
use crate::spec::PayloadSchema;
use crate::store::CheckpointStore;
use crate::transform::{CustomTransforms, FieldChange, TransformError};

/// Default deadline for a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on in-flight background write-backs.
const DEFAULT_MAX_CONCURRENT_WRITE_BACKS: usize = 64;

/// When (and how) an upgraded record is persisted after a lazy migration.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum WriteBackPolicy {
    /// Never write back; the record is re-migrated on every read
    /// - Pros: read-only access to the store
    /// - Cons: repeated migration work until a batch run catches up
    Disabled,

    /// Write back asynchronously after the load returns (default)
    /// - Pros: callers never wait on the write
    /// - Cons: a crash can lose the write; the next read re-migrates
    Background,

    /// Write back before the load returns
    /// - Pros: read-repair is durable once the caller has the record
    /// - Cons: load latency includes the write
    Blocking,
}

/// Migrating read adapter over a checkpoint store.
pub struct MigratingLoader {
    store: Arc<dyn CheckpointStore>,
    registry: Arc<MigrationRegistry>,
    customs: Arc<CustomTransforms>,
    write_back: WriteBackPolicy,
    store_timeout: Duration,
    payload_schema: Option<PayloadSchema>,

    /// Bounds concurrent background write-backs so a burst of stale reads
    /// cannot spawn unbounded tasks
    write_back_semaphore: Arc<Semaphore>,

    /// Write-backs that failed (any policy)
    write_backs_failed: Arc<AtomicU64>,

    /// Background write-backs skipped because the semaphore was full
    write_backs_dropped: Arc<AtomicU64>,
}

impl MigratingLoader {
    /// Create a loader over `store` with the given registry and custom
    /// transform registrations.
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        registry: Arc<MigrationRegistry>,
        customs: Arc<CustomTransforms>,
    ) -> Self {
        Self {
            store,
            registry,
            customs,
            write_back: WriteBackPolicy::Background,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            payload_schema: None,
            write_back_semaphore: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_WRITE_BACKS)),
            write_backs_failed: Arc::new(AtomicU64::new(0)),
            write_backs_dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Set the write-back policy.
    #[must_use]
    pub fn with_write_back(mut self, policy: WriteBackPolicy) -> Self {
        self.write_back = policy;
        self
    }

    /// Set the per-call store deadline.
    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Validate migrated payloads against a payload schema.
    #[must_use]
    pub fn with_payload_schema(mut self, schema: PayloadSchema) -> Self {
        self.payload_schema = Some(schema);
        self
    }

    /// The registry this loader migrates toward.
    pub fn registry(&self) -> &Arc<MigrationRegistry> {
        &self.registry
    }

    /// The custom transform registrations in use.
    pub fn customs(&self) -> &Arc<CustomTransforms> {
        &self.customs
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Write-backs that failed since construction.
    pub fn write_backs_failed(&self) -> u64 {
        self.write_backs_failed.load(Ordering::Relaxed)
    }

    /// Background write-backs dropped since construction.
    pub fn write_backs_dropped(&self) -> u64 {
        self.write_backs_dropped.load(Ordering::Relaxed)
    }

    /// Load the current-version record for `key`.
    ///
    /// Fetches the raw record, migrates it in memory, optionally persists
    /// the upgrade, and returns it. A missing key is [`LoadError::NotFound`],
    /// never an empty version-0 record.
    pub async fn load(&self, key: &str) -> Result<CheckpointRecord, LoadError> {
        let fetched = tokio::time::timeout(self.store_timeout, self.store.get(key))
            .await
            .map_err(|_| LoadError::Timeout {
                duration: self.store_timeout,
            })?
            .map_err(LoadError::Store)?;

        let mut record = fetched.ok_or_else(|| LoadError::NotFound {
            key: key.to_string(),
        })?;

        let stored_version = record.schema_version;
        let changes = apply_migration(&self.registry, &self.customs, &mut record)?;

        if let Some(schema) = &self.payload_schema {
            if let Err(reason) = schema.check(&record.payload) {
                if schema.strict {
                    return Err(LoadError::Validation {
                        key: key.to_string(),
                        reason,
                    });
                }
                warn!(key = %key, "payload schema violation after migration: {reason}");
            }
        }

        if record.schema_version != stored_version {
            debug!(
                key = %key,
                from = stored_version,
                to = record.schema_version,
                changed_fields = changes.len(),
                "lazily migrated checkpoint"
            );
            self.write_back(key, &record).await;
        }

        Ok(record)
    }

    /// Persist an upgraded record according to the write-back policy.
    ///
    /// Failures are reported through tracing and the failure counter,
    /// never to the `load` caller: the in-memory record is already
    /// correct, and the store will simply be re-migrated on the next read.
    async fn write_back(&self, key: &str, record: &CheckpointRecord) {
        match self.write_back {
            WriteBackPolicy::Disabled => {}
            WriteBackPolicy::Blocking => {
                let result =
                    tokio::time::timeout(self.store_timeout, self.store.put(key, record)).await;
                self.note_write_back_result(key, flatten_put_result(result, self.store_timeout));
            }
            WriteBackPolicy::Background => {
                let Ok(permit) =
                    Arc::clone(&self.write_back_semaphore).try_acquire_owned()
                else {
                    self.write_backs_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(key = %key, "write-back queue full, skipping; record stays stale until next read");
                    return;
                };

                let store = Arc::clone(&self.store);
                let failed = Arc::clone(&self.write_backs_failed);
                let key = key.to_string();
                let record = record.clone();
                let timeout = self.store_timeout;

                tokio::spawn(async move {
                    let _permit = permit;
                    let result = tokio::time::timeout(timeout, store.put(&key, &record)).await;
                    if let Err(e) = flatten_put_result(result, timeout) {
                        failed.fetch_add(1, Ordering::Relaxed);
                        warn!(key = %key, "background write-back failed: {e}");
                    }
                });
            }
        }
    }

    fn note_write_back_result(&self, key: &str, result: Result<(), StoreError>) {
        if let Err(e) = result {
            self.write_backs_failed.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, "write-back failed: {e}");
        }
    }
}

fn flatten_put_result(
    result: Result<Result<(), StoreError>, tokio::time::error::Elapsed>,
    timeout: Duration,
) -> Result<(), StoreError> {
    match result {
        Ok(inner) => inner,
        Err(_) => Err(StoreError::Backend {
            reason: format!("write-back timed out after {timeout:?}"),
        }),
    }
}

/// Apply the full migration path to `record` in place.
///
/// Resolves the path from the record's stored version to the registry's
/// current version and applies each step's transforms in ascending
/// version order. The record's `schema_version` advances after each
/// successful step, so a mid-chain failure reports the version it
/// reached. Returns the effective field changes across all steps.
pub(crate) fn apply_migration(
    registry: &MigrationRegistry,
    customs: &CustomTransforms,
    record: &mut CheckpointRecord,
) -> Result<Vec<FieldChange>, LoadError> {
    let path = registry.resolve(record.schema_version)?;
    let mut changes = Vec::new();

    for step in path {
        let step_changes = step.apply(&mut record.payload, customs).map_err(|e| match e {
            TransformError::Unimplemented { id } => LoadError::UnimplementedTransform {
                id,
                from_version: step.from_version,
            },
            TransformError::Failed { id, reason } => LoadError::Transform {
                id,
                from_version: step.from_version,
                reason,
            },
        })?;
        changes.extend(step_changes);
        record.schema_version = step.to_version;
    }

    Ok(changes)
}
