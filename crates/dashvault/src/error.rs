// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Error types for Dashvault
//!
//! Every failure mode a caller can observe is a typed variant here. The
//! taxonomy mirrors the lifecycle: [`ChainError`] at registry construction,
//! [`PathError`] at path resolution, [`StoreError`] from storage backends,
//! [`LoadError`] from the migrating loader, [`SpecError`] from schema
//! specification documents, and [`BatchError`] from batch runs.

use std::time::Duration;

use thiserror::Error;

use crate::record::SchemaVersion;

/// Errors detected while validating a migration chain at registry construction.
///
/// These are startup errors: a process must not come up with an invalid
/// registry, since every subsequent load would be at risk of a mid-chain
/// failure that is far more expensive to diagnose.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// No step exists with this `from_version`, leaving a hole in the chain
    #[error("migration chain has a gap: no step migrates from version {missing_version}")]
    Gap {
        /// The version with no outgoing migration step
        missing_version: SchemaVersion,
    },

    /// Two steps share the same `from_version`
    #[error("migration chain has duplicate steps from version {from_version}")]
    Duplicate {
        /// The version with more than one outgoing step
        from_version: SchemaVersion,
    },

    /// A step's `to_version` is not `from_version + 1`
    #[error("migration step {from_version} -> {to_version} is not a single-hop upgrade")]
    BadHop {
        /// Source version of the offending step
        from_version: SchemaVersion,
        /// Target version of the offending step
        to_version: SchemaVersion,
    },

    /// A step lies outside `[min_version, current_version)`
    #[error(
        "migration step from version {from_version} is outside the declared range \
         [{min_version}, {current_version})"
    )]
    OutOfRange {
        /// Source version of the offending step
        from_version: SchemaVersion,
        /// Declared minimum known version
        min_version: SchemaVersion,
        /// Declared current version
        current_version: SchemaVersion,
    },

    /// The declared minimum version exceeds the declared current version
    #[error("min version {min_version} exceeds current version {current_version}")]
    BoundsInverted {
        /// Declared minimum known version
        min_version: SchemaVersion,
        /// Declared current version
        current_version: SchemaVersion,
    },
}

/// Errors from resolving a migration path between two schema versions.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The record's stored version is newer than the running code's schema.
    ///
    /// The engine never downgrades: guessing a downgrade path is unsafe, so
    /// this surfaces as a load failure instead of being silently truncated.
    #[error("record schema version {found} is newer than current version {current}")]
    FutureVersion {
        /// Version found on the record
        found: SchemaVersion,
        /// Current version declared by the registry
        current: SchemaVersion,
    },

    /// No step migrates from this version.
    ///
    /// Unreachable through a registry built with [`MigrationRegistry::build`],
    /// which validates the chain up front; defends against registries
    /// assembled without validation.
    ///
    /// [`MigrationRegistry::build`]: crate::registry::MigrationRegistry::build
    #[error("no migration step from version {from_version}")]
    MissingStep {
        /// The version with no outgoing migration step
        from_version: SchemaVersion,
    },
}

/// Errors produced by checkpoint store backends.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error from the backing medium
    #[error("checkpoint store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding a record for storage failed
    #[error("checkpoint serialization failed: {reason}")]
    Serialization {
        /// Detailed reason for the failure
        reason: String,
    },

    /// A stored record could not be decoded
    #[error("checkpoint record '{key}' is corrupt: {reason}")]
    Corrupt {
        /// Key of the unreadable record
        key: String,
        /// Reason decoding failed
        reason: String,
    },

    /// The key cannot be used with this backend
    #[error("invalid checkpoint key '{key}': {reason}")]
    InvalidKey {
        /// The rejected key
        key: String,
        /// Why the key was rejected
        reason: String,
    },

    /// Backend-specific failure
    #[error("checkpoint store backend error: {reason}")]
    Backend {
        /// Detailed reason for the failure
        reason: String,
    },
}

impl StoreError {
    /// Returns true if a retry of the same operation may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StoreError::Io(_) | StoreError::Backend { .. })
    }
}

/// Errors returned by [`MigratingLoader::load`].
///
/// Callers see either a fully current-version record or one of these; a
/// partially migrated record is never observable.
///
/// [`MigratingLoader::load`]: crate::loader::MigratingLoader::load
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LoadError {
    /// No record exists under this key.
    ///
    /// Propagated from the store, never treated as a version-0 record.
    #[error("no checkpoint found for key '{key}'")]
    NotFound {
        /// The requested key
        key: String,
    },

    /// Path resolution failed (future version or missing step)
    #[error(transparent)]
    Path(#[from] PathError),

    /// A custom transform was declared in the schema specification but no
    /// implementation was registered.
    ///
    /// Fails this load only; other keys whose paths do not traverse the
    /// step are unaffected.
    #[error(
        "custom transform '{id}' (step from version {from_version}) is declared but not registered"
    )]
    UnimplementedTransform {
        /// Identifier the specification used for the transform
        id: String,
        /// Source version of the step that references it
        from_version: SchemaVersion,
    },

    /// A registered custom transform returned an error
    #[error("custom transform '{id}' failed at step from version {from_version}: {reason}")]
    Transform {
        /// Identifier of the failed transform
        id: String,
        /// Source version of the step that invoked it
        from_version: SchemaVersion,
        /// Reason reported by the implementation
        reason: String,
    },

    /// The migrated payload violated the declared payload schema
    #[error("payload validation failed for key '{key}': {reason}")]
    Validation {
        /// Key of the offending record
        key: String,
        /// First violation found
        reason: String,
    },

    /// The store did not answer within the configured deadline
    #[error("checkpoint store call timed out after {duration:?}")]
    Timeout {
        /// Deadline that elapsed
        duration: Duration,
    },

    /// Underlying store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LoadError {
    /// Returns true if a retry of the same load may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            LoadError::Timeout { .. } => true,
            LoadError::Store(e) => e.is_recoverable(),
            _ => false,
        }
    }
}

/// Errors from loading or compiling a schema specification document.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SpecError {
    /// The document could not be parsed
    #[error("schema specification parse error: {reason}")]
    Parse {
        /// Parser diagnostic
        reason: String,
    },

    /// The file extension maps to no supported format
    #[error("unsupported schema specification format '{extension}' (expected json, yaml, or yml)")]
    UnsupportedFormat {
        /// The unrecognized extension
        extension: String,
    },

    /// Reading the document from disk failed
    #[error("failed to read schema specification: {0}")]
    Io(#[from] std::io::Error),

    /// The declared migrations do not form a valid chain
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// A custom transform id named by the document has no registered
    /// implementation
    #[error("custom transform '{id}' is declared in the specification but not registered")]
    UnregisteredCustom {
        /// The unregistered identifier
        id: String,
    },
}

/// Errors that abort a batch migration run.
///
/// Per-record failures never abort a run; they are collected in the report.
/// Only a store-level scan failure is terminal, since without a scan page
/// there is nothing left to iterate.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BatchError {
    /// Scanning the store failed
    #[error("batch scan failed (resume cursor {cursor:?}): {source}")]
    Scan {
        /// Last cursor that produced a complete batch; pass as
        /// `resume_cursor` to continue the run
        cursor: Option<String>,
        /// The underlying store failure
        source: StoreError,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn chain_error_display_names_missing_version() {
        let err = ChainError::Gap { missing_version: 3 };
        assert!(err.to_string().contains("version 3"));
    }

    #[test]
    fn path_error_future_version_display() {
        let err = PathError::FutureVersion {
            found: 5,
            current: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains('5'));
        assert!(msg.contains('3'));
    }

    #[test]
    fn load_error_recoverability() {
        assert!(LoadError::Timeout {
            duration: Duration::from_secs(1)
        }
        .is_recoverable());
        assert!(!LoadError::NotFound {
            key: "t".to_string()
        }
        .is_recoverable());
        assert!(!LoadError::UnimplementedTransform {
            id: "x".to_string(),
            from_version: 1
        }
        .is_recoverable());
    }

    #[test]
    fn store_error_recoverability() {
        assert!(StoreError::Backend {
            reason: "down".to_string()
        }
        .is_recoverable());
        assert!(!StoreError::Corrupt {
            key: "k".to_string(),
            reason: "truncated".to_string()
        }
        .is_recoverable());
    }
}
