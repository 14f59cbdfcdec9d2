// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Migration steps, the migration registry, and path resolution
//!
//! The registry holds the complete ordered set of single-hop migration
//! steps for a schema lineage. Chain integrity is validated at
//! construction: a gap discovered at startup costs a failed deploy, a gap
//! discovered halfway through a batch job costs an incident.
//!
//! The registry is an explicitly constructed, immutable value. Loaders and
//! batch migrators take it by `Arc` at construction; there is no ambient
//! global, so tests can hold several registries side by side.

use std::collections::BTreeMap;

use crate::error::{ChainError, PathError};
use crate::record::SchemaVersion;
use crate::transform::{CustomTransforms, FieldChange, FieldTransform, TransformError};

/// A named, single-hop transformation from one schema version to the next.
///
/// Immutable once published. Multi-hop jumps are expressed by chaining
/// single-hop steps, never by skipping.
#[derive(Clone, Debug, PartialEq)]
pub struct MigrationStep {
    /// Version this step upgrades from
    pub from_version: SchemaVersion,

    /// Version this step upgrades to (`from_version + 1` by convention)
    pub to_version: SchemaVersion,

    /// Human-readable summary of the change
    pub description: String,

    /// Transforms applied in sequence
    pub transforms: Vec<FieldTransform>,
}

impl MigrationStep {
    /// Create the single-hop step `from_version -> from_version + 1`.
    pub fn single_hop(
        from_version: SchemaVersion,
        description: impl Into<String>,
        transforms: Vec<FieldTransform>,
    ) -> Self {
        Self {
            from_version,
            to_version: from_version + 1,
            description: description.into(),
            transforms,
        }
    }

    /// Apply this step's transforms, in order, to `payload`.
    ///
    /// Returns the changes that actually happened (no-ops excluded).
    pub fn apply(
        &self,
        payload: &mut crate::record::Payload,
        customs: &CustomTransforms,
    ) -> Result<Vec<FieldChange>, TransformError> {
        let mut changes = Vec::new();
        for transform in &self.transforms {
            if let Some(change) = transform.apply(payload, customs)? {
                changes.push(change);
            }
        }
        Ok(changes)
    }

    /// Custom transform ids this step references.
    pub fn custom_ids(&self) -> impl Iterator<Item = &str> {
        self.transforms.iter().filter_map(FieldTransform::custom_id)
    }
}

/// The complete, validated set of migration steps for a schema lineage.
#[derive(Clone, Debug)]
pub struct MigrationRegistry {
    current_version: SchemaVersion,
    min_version: SchemaVersion,
    steps: BTreeMap<SchemaVersion, MigrationStep>,
}

impl MigrationRegistry {
    /// Build a registry, validating chain integrity.
    ///
    /// Validates that every step is a single hop, that no two steps share
    /// a `from_version`, that all steps lie inside
    /// `[min_version, current_version)`, and that the chain has no gaps:
    /// for every version `v` in that range a step with `from_version == v`
    /// exists. Fails fast with [`ChainError`] otherwise.
    pub fn build(
        current_version: SchemaVersion,
        min_version: SchemaVersion,
        steps: Vec<MigrationStep>,
    ) -> Result<Self, ChainError> {
        if min_version > current_version {
            return Err(ChainError::BoundsInverted {
                min_version,
                current_version,
            });
        }

        let mut by_from: BTreeMap<SchemaVersion, MigrationStep> = BTreeMap::new();
        for step in steps {
            if step.to_version != step.from_version + 1 {
                return Err(ChainError::BadHop {
                    from_version: step.from_version,
                    to_version: step.to_version,
                });
            }
            if step.from_version < min_version || step.from_version >= current_version {
                return Err(ChainError::OutOfRange {
                    from_version: step.from_version,
                    min_version,
                    current_version,
                });
            }
            let from_version = step.from_version;
            if by_from.insert(from_version, step).is_some() {
                return Err(ChainError::Duplicate { from_version });
            }
        }

        for version in min_version..current_version {
            if !by_from.contains_key(&version) {
                return Err(ChainError::Gap {
                    missing_version: version,
                });
            }
        }

        Ok(Self {
            current_version,
            min_version,
            steps: by_from,
        })
    }

    /// Assemble a registry without chain validation.
    ///
    /// Resolution then reports [`PathError::MissingStep`] for holes at
    /// lookup time. Exists for tests and tooling that validate separately;
    /// production construction goes through [`MigrationRegistry::build`].
    pub fn from_parts_unvalidated(
        current_version: SchemaVersion,
        min_version: SchemaVersion,
        steps: Vec<MigrationStep>,
    ) -> Self {
        Self {
            current_version,
            min_version,
            steps: steps.into_iter().map(|s| (s.from_version, s)).collect(),
        }
    }

    /// The schema version the running code writes and migrates toward.
    pub fn current_version(&self) -> SchemaVersion {
        self.current_version
    }

    /// The lowest schema version ever observed in the store.
    pub fn min_version(&self) -> SchemaVersion {
        self.min_version
    }

    /// The step migrating from `from_version`, if registered.
    pub fn step(&self, from_version: SchemaVersion) -> Option<&MigrationStep> {
        self.steps.get(&from_version)
    }

    /// Number of registered steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the registry has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Resolve the ordered step sequence from `from_version` to the
    /// current version.
    ///
    /// `from_version == current_version` is the common case and returns an
    /// empty path without walking or allocating step lookups beyond the
    /// empty vector. A record from the future (`from_version` greater than
    /// current) is refused; the engine never downgrades.
    pub fn resolve(&self, from_version: SchemaVersion) -> Result<Vec<&MigrationStep>, PathError> {
        self.resolve_range(from_version, self.current_version)
    }

    /// Resolve the ordered step sequence for an arbitrary version span.
    pub fn resolve_range(
        &self,
        from_version: SchemaVersion,
        to_version: SchemaVersion,
    ) -> Result<Vec<&MigrationStep>, PathError> {
        if from_version == to_version {
            return Ok(Vec::new());
        }
        if from_version > to_version {
            return Err(PathError::FutureVersion {
                found: from_version,
                current: to_version,
            });
        }

        let mut path = Vec::with_capacity((to_version - from_version) as usize);
        let mut version = from_version;
        while version < to_version {
            let step = self
                .steps
                .get(&version)
                .ok_or(PathError::MissingStep {
                    from_version: version,
                })?;
            path.push(step);
            version = step.to_version;
        }
        Ok(path)
    }

    /// Custom transform ids referenced anywhere in the chain.
    pub fn custom_ids(&self) -> impl Iterator<Item = &str> {
        self.steps.values().flat_map(MigrationStep::custom_ids)
    }
}
