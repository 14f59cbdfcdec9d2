// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Field-level payload transforms
//!
//! A [`FieldTransform`] is a single deterministic operation on a checkpoint
//! payload. Every variant is idempotent when re-applied to its own output,
//! which is what makes lock-free concurrent write-back and batch re-runs
//! safe: two writers that race on the same stale record converge on an
//! identical result.
//!
//! Custom transforms are declared in the schema specification by id and
//! bound to code through a [`CustomTransforms`] registration map. A
//! declared-but-unregistered id is a typed error, never a silent no-op;
//! a placeholder that passes data through unchanged would mask corruption.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::Payload;

/// A single deterministic operation on a checkpoint payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldTransform {
    /// Insert `field` with `default` if the field is absent
    AddDefault {
        /// Field to insert
        field: String,
        /// Value the field gains
        default: serde_json::Value,
    },

    /// Move the value under `from` to `to`; no-op when `from` is absent
    Rename {
        /// Old field name
        from: String,
        /// New field name
        to: String,
    },

    /// Delete `field` if present
    Remove {
        /// Field to delete
        field: String,
    },

    /// Arbitrary deterministic mapping supplied by the caller, looked up
    /// by id in a [`CustomTransforms`] map
    Custom {
        /// Identifier the schema specification uses for this transform
        id: String,
    },
}

/// What a transform actually did to one record's payload.
///
/// Collected for dry-run reporting; a `None` change means the transform
/// was a no-op on this payload (already applied, or nothing to do).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum FieldChange {
    /// A field was inserted with its default
    Added {
        /// The inserted field
        field: String,
    },
    /// A field moved to a new name
    Renamed {
        /// Old field name
        from: String,
        /// New field name
        to: String,
    },
    /// A field was deleted
    Removed {
        /// The deleted field
        field: String,
    },
    /// A custom transform ran
    Custom {
        /// Identifier of the transform
        id: String,
    },
}

/// Errors from applying a single transform.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The custom transform id has no registered implementation
    #[error("custom transform '{id}' is declared but not registered")]
    Unimplemented {
        /// The unregistered identifier
        id: String,
    },

    /// A registered custom transform reported a failure
    #[error("custom transform '{id}' failed: {reason}")]
    Failed {
        /// Identifier of the failed transform
        id: String,
        /// Reason reported by the implementation
        reason: String,
    },
}

/// A registered custom transform implementation.
///
/// Must be a deterministic, idempotent function of the payload.
pub type CustomTransformFn = dyn Fn(&mut Payload) -> Result<(), String> + Send + Sync;

/// Registration map from custom transform id to implementation.
///
/// The schema specification declares custom transforms by id only; the
/// hosting process binds them to code here. Built once at startup and
/// shared read-only, like the registry itself.
#[derive(Clone, Default)]
pub struct CustomTransforms {
    transforms: HashMap<String, Arc<CustomTransformFn>>,
}

impl CustomTransforms {
    /// Create an empty registration map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under `id`.
    ///
    /// Later registrations under the same id replace earlier ones.
    #[must_use]
    pub fn register<F>(mut self, id: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Payload) -> Result<(), String> + Send + Sync + 'static,
    {
        self.transforms.insert(id.into(), Arc::new(f));
        self
    }

    /// Whether an implementation is registered under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.transforms.contains_key(id)
    }

    /// Registered ids, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.transforms.keys().map(String::as_str)
    }

    /// Number of registered implementations.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Whether no implementations are registered.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    fn get(&self, id: &str) -> Option<&Arc<CustomTransformFn>> {
        self.transforms.get(id)
    }
}

impl fmt::Debug for CustomTransforms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.ids().collect();
        ids.sort_unstable();
        f.debug_struct("CustomTransforms").field("ids", &ids).finish()
    }
}

impl FieldTransform {
    /// Apply this transform to `payload` in place.
    ///
    /// Returns what changed, or `None` when the transform was a no-op on
    /// this payload. Custom transforms always report a change when they
    /// run; only their implementation knows what they touched.
    pub fn apply(
        &self,
        payload: &mut Payload,
        customs: &CustomTransforms,
    ) -> Result<Option<FieldChange>, TransformError> {
        match self {
            FieldTransform::AddDefault { field, default } => {
                if payload.contains_key(field) {
                    return Ok(None);
                }
                payload.insert(field.clone(), default.clone());
                Ok(Some(FieldChange::Added {
                    field: field.clone(),
                }))
            }
            FieldTransform::Rename { from, to } => match payload.remove(from) {
                Some(value) => {
                    payload.insert(to.clone(), value);
                    Ok(Some(FieldChange::Renamed {
                        from: from.clone(),
                        to: to.clone(),
                    }))
                }
                None => Ok(None),
            },
            FieldTransform::Remove { field } => {
                if payload.remove(field).is_some() {
                    Ok(Some(FieldChange::Removed {
                        field: field.clone(),
                    }))
                } else {
                    Ok(None)
                }
            }
            FieldTransform::Custom { id } => {
                let f = customs
                    .get(id)
                    .ok_or_else(|| TransformError::Unimplemented { id: id.clone() })?;
                f(payload).map_err(|reason| TransformError::Failed {
                    id: id.clone(),
                    reason,
                })?;
                Ok(Some(FieldChange::Custom { id: id.clone() }))
            }
        }
    }

    /// The custom transform id, if this is a custom transform.
    pub fn custom_id(&self) -> Option<&str> {
        match self {
            FieldTransform::Custom { id } => Some(id),
            _ => None,
        }
    }
}
