// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Dashvault - versioned checkpoint store with schema migration
//!
//! Dashvault persists long-running conversational/agent state as versioned
//! checkpoints and evolves the shape of that state over time without
//! breaking previously stored records. Three pieces cooperate:
//!
//! - A [`MigrationRegistry`] holds the single-hop [`MigrationStep`]s for a
//!   schema lineage and validates chain integrity at construction.
//! - A [`MigratingLoader`] wraps a [`CheckpointStore`]'s read path,
//!   migrating records to the current version transparently on load and
//!   optionally writing the upgrade back.
//! - A [`BatchMigrator`] upgrades an entire store incrementally and
//!   resumably, isolating per-record failures in its report.
//!
//! Migrations are declared out of code in a [`SchemaSpec`] document;
//! custom transforms referenced there are bound to implementations
//! through [`CustomTransforms`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dashvault::{
//!     CustomTransforms, FileCheckpointStore, MigratingLoader, SchemaSpec,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = SchemaSpec::from_file("schema.yaml")?;
//! let registry = Arc::new(spec.build_registry()?);
//! let customs = Arc::new(CustomTransforms::new());
//! let store = Arc::new(FileCheckpointStore::new("./checkpoints")?);
//!
//! let loader = MigratingLoader::new(store, registry, customs);
//! let state = loader.load("thread-42").await?;
//! println!("loaded at v{}", state.schema_version);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod error;
pub mod loader;
pub mod record;
pub mod registry;
pub mod spec;
pub mod store;
pub mod transform;

pub use batch::{
    BatchMigrator, BatchOptions, CancelHandle, FailedRecord, MigrationReport, RecordChanges,
    VersionSurvey, DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONCURRENCY,
};
pub use error::{BatchError, ChainError, LoadError, PathError, SpecError, StoreError};
pub use loader::{MigratingLoader, WriteBackPolicy, DEFAULT_STORE_TIMEOUT};
pub use record::{CheckpointRecord, Payload, SchemaVersion, ThreadKey};
pub use registry::{MigrationRegistry, MigrationStep};
pub use spec::{FieldOperation, MigrationDef, PayloadSchema, SchemaSpec};
pub use store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, ScanPage};
pub use transform::{CustomTransforms, FieldChange, FieldTransform, TransformError};
