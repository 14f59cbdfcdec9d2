// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Batch migration over an entire checkpoint store
//!
//! [`BatchMigrator`] walks the store in fixed-size batches and applies the
//! same upgrade logic the lazy loader uses, so the two paths can never
//! disagree about what a migrated record looks like. Records within a
//! batch migrate concurrently; records carry no cross-record ordering
//! requirement.
//!
//! One bad record never aborts a run: per-record failures are collected
//! against their keys in the report. Interrupted runs resume from the
//! last completed batch's cursor, and re-running over already-migrated
//! records costs one version check per record.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::BatchError;
use crate::loader::{apply_migration, MigratingLoader};
use crate::record::{CheckpointRecord, SchemaVersion};
use crate::registry::MigrationRegistry;
use crate::store::CheckpointStore;
use crate::transform::{CustomTransforms, FieldChange};

/// Default number of records fetched per scan page.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default number of records migrated concurrently within a batch.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Options for one batch migration run.
#[derive(Clone, Debug)]
pub struct BatchOptions {
    /// Compute target state and report changes without writing
    pub dry_run: bool,

    /// Records fetched per scan page
    pub batch_size: usize,

    /// Cursor from a previous run's report to continue from
    pub resume_cursor: Option<String>,

    /// Records migrated concurrently within a batch
    pub max_concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: DEFAULT_BATCH_SIZE,
            resume_cursor: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// Cooperative cancellation handle for a batch run.
///
/// Checked between batches; a cancelled run finishes its in-flight batch,
/// then stops and reports the cursor to resume from.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Create a handle in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// A record that failed to migrate, with the error it failed on.
#[derive(Clone, Debug, Serialize)]
pub struct FailedRecord {
    /// Key of the failed record
    pub key: String,
    /// The failure, stringified for the report
    pub error: String,
}

/// Per-record field changes observed during a dry run.
#[derive(Clone, Debug, Serialize)]
pub struct RecordChanges {
    /// Key of the record
    pub key: String,
    /// Schema version the record was found at
    pub from_version: SchemaVersion,
    /// Effective field changes the migration would make
    pub changes: Vec<FieldChange>,
}

/// Machine-readable outcome of a batch migration run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MigrationReport {
    /// Records examined
    pub processed: u64,

    /// Records upgraded (or, in a dry run, that would be upgraded)
    pub migrated: u64,

    /// Records already at the current version
    pub skipped: u64,

    /// Records that failed, with their errors; suitable for retry or
    /// alerting
    pub failed: Vec<FailedRecord>,

    /// What would change per record; populated in dry runs only
    pub changes: Vec<RecordChanges>,

    /// Cursor to resume from; `None` when the run covered the whole store
    pub resume_cursor: Option<String>,

    /// Whether the run stopped on a cancellation request
    pub cancelled: bool,

    /// Whether this was a dry run
    pub dry_run: bool,
}

/// Schema-version inventory of a store.
#[derive(Clone, Debug, Serialize)]
pub struct VersionSurvey {
    /// The version the registry migrates toward
    pub current_version: SchemaVersion,

    /// Total records seen
    pub total: u64,

    /// Record count per stored schema version
    pub by_version: BTreeMap<SchemaVersion, u64>,

    /// Records below the current version
    pub stale: u64,

    /// Records above the current version (written by newer code)
    pub future: u64,
}

enum RecordOutcome {
    Migrated {
        key: String,
        from_version: SchemaVersion,
        changes: Vec<FieldChange>,
    },
    Skipped,
    Failed {
        key: String,
        error: String,
    },
}

/// Offline/background job that upgrades every record in a store.
pub struct BatchMigrator {
    store: Arc<dyn CheckpointStore>,
    registry: Arc<MigrationRegistry>,
    customs: Arc<CustomTransforms>,
}

impl BatchMigrator {
    /// Create a migrator over `store` with the given registry and custom
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
        }
    }

    /// Create a migrator sharing a loader's store, registry, and custom
    /// transforms, so both paths compute identical upgrades.
    pub fn for_loader(loader: &MigratingLoader) -> Self {
        Self::new(
            Arc::clone(loader.store()),
            Arc::clone(loader.registry()),
            Arc::clone(loader.customs()),
        )
    }

    /// Run a batch migration.
    ///
    /// Scans in stable key order so the report's `resume_cursor` lets an
    /// interrupted run continue without reprocessing completed batches.
    /// Only a store-level scan failure is terminal; see [`BatchError`].
    pub async fn run(
        &self,
        options: BatchOptions,
        cancel: &CancelHandle,
    ) -> Result<MigrationReport, BatchError> {
        let mut report = MigrationReport {
            dry_run: options.dry_run,
            ..MigrationReport::default()
        };
        let mut cursor = options.resume_cursor.clone();
        let concurrency = options.max_concurrency.max(1);

        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.resume_cursor = cursor;
                break;
            }

            let page = self
                .store
                .scan(cursor.as_deref(), options.batch_size)
                .await
                .map_err(|source| BatchError::Scan {
                    cursor: cursor.clone(),
                    source,
                })?;
            let next_cursor = page.next_cursor;

            let outcomes: Vec<RecordOutcome> = futures::stream::iter(
                page.records
                    .into_iter()
                    .map(|record| self.process_record(record, options.dry_run)),
            )
            .buffer_unordered(concurrency)
            .collect()
            .await;

            for outcome in outcomes {
                report.processed += 1;
                match outcome {
                    RecordOutcome::Migrated {
                        key,
                        from_version,
                        changes,
                    } => {
                        report.migrated += 1;
                        if options.dry_run {
                            report.changes.push(RecordChanges {
                                key,
                                from_version,
                                changes,
                            });
                        }
                    }
                    RecordOutcome::Skipped => report.skipped += 1,
                    RecordOutcome::Failed { key, error } => {
                        report.failed.push(FailedRecord { key, error });
                    }
                }
            }

            match next_cursor {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }

        info!(
            processed = report.processed,
            migrated = report.migrated,
            skipped = report.skipped,
            failed = report.failed.len(),
            cancelled = report.cancelled,
            dry_run = report.dry_run,
            "batch migration run finished"
        );
        Ok(report)
    }

    /// Count records per schema version without migrating anything.
    pub async fn survey(&self) -> Result<VersionSurvey, BatchError> {
        let current_version = self.registry.current_version();
        let mut survey = VersionSurvey {
            current_version,
            total: 0,
            by_version: BTreeMap::new(),
            stale: 0,
            future: 0,
        };

        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .store
                .scan(cursor.as_deref(), DEFAULT_BATCH_SIZE)
                .await
                .map_err(|source| BatchError::Scan {
                    cursor: cursor.clone(),
                    source,
                })?;

            for record in &page.records {
                survey.total += 1;
                *survey.by_version.entry(record.schema_version).or_insert(0) += 1;
                if record.schema_version < current_version {
                    survey.stale += 1;
                } else if record.schema_version > current_version {
                    survey.future += 1;
                }
            }

            match page.next_cursor {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }

        Ok(survey)
    }

    /// Migrate one already-fetched record.
    ///
    /// The scan already produced the record, so the loader's fetch step is
    /// skipped; the rest of the upgrade logic is shared via
    /// [`apply_migration`].
    async fn process_record(&self, record: CheckpointRecord, dry_run: bool) -> RecordOutcome {
        let current = self.registry.current_version();
        if record.schema_version == current {
            return RecordOutcome::Skipped;
        }

        let key = record.key.clone();
        let from_version = record.schema_version;
        let mut upgraded = record;

        let changes = match apply_migration(&self.registry, &self.customs, &mut upgraded) {
            Ok(changes) => changes,
            Err(e) => {
                return RecordOutcome::Failed {
                    key,
                    error: e.to_string(),
                }
            }
        };

        if dry_run {
            debug!(key = %key, from = from_version, to = current, "dry run: would migrate");
            return RecordOutcome::Migrated {
                key,
                from_version,
                changes,
            };
        }

        match self.store.put(&key, &upgraded).await {
            Ok(()) => RecordOutcome::Migrated {
                key,
                from_version,
                changes,
            },
            Err(e) => RecordOutcome::Failed {
                key,
                error: e.to_string(),
            },
        }
    }
}
