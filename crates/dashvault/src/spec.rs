// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Schema specification documents
//!
//! A deployment declares its checkpoint schema out of code: the current
//! version number, the ordered migration definitions, and (optionally) a
//! payload schema for post-migration validation. The document is loaded at
//! startup from JSON or YAML and compiled into a validated
//! [`MigrationRegistry`].
//!
//! Custom transforms appear in the document as bare identifiers; the
//! hosting process binds them to implementations through
//! [`CustomTransforms`](crate::transform::CustomTransforms).
//!
//! # Example document (YAML)
//!
//! ```yaml
//! current_version: 3
//! migrations:
//!   - from_version: 1
//!     description: add traveler count
//!     operations:
//!       - op: add_default
//!         field: travelers
//!         default: 1
//!   - from_version: 2
//!     description: clarify destination field
//!     operations:
//!       - op: rename_field
//!         from: destination
//!         to: destination_city
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SpecError;
use crate::record::SchemaVersion;
use crate::registry::{MigrationRegistry, MigrationStep};
use crate::transform::{CustomTransforms, FieldTransform};

fn default_min_version() -> SchemaVersion {
    1
}

fn default_allow_extra_fields() -> bool {
    true
}

/// One field-level operation in a migration definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FieldOperation {
    /// Insert a field with a default value if absent
    AddDefault {
        /// Field to insert
        field: String,
        /// Default value (JSON null when omitted)
        #[serde(default)]
        default: serde_json::Value,
    },

    /// Move a field's value to a new name
    RenameField {
        /// Old field name
        from: String,
        /// New field name
        to: String,
    },

    /// Delete a field if present
    RemoveField {
        /// Field to delete
        field: String,
    },

    /// Run a custom transform registered in code under `id`
    Transform {
        /// Identifier of the registered implementation
        id: String,
    },
}

impl FieldOperation {
    fn into_transform(self) -> FieldTransform {
        match self {
            FieldOperation::AddDefault { field, default } => {
                FieldTransform::AddDefault { field, default }
            }
            FieldOperation::RenameField { from, to } => FieldTransform::Rename { from, to },
            FieldOperation::RemoveField { field } => FieldTransform::Remove { field },
            FieldOperation::Transform { id } => FieldTransform::Custom { id },
        }
    }
}

/// One migration definition: a single-hop upgrade from `from_version`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MigrationDef {
    /// Version this migration upgrades from (target is `from_version + 1`)
    pub from_version: SchemaVersion,

    /// Human-readable summary of the change
    #[serde(default)]
    pub description: String,

    /// Field operations applied in order
    pub operations: Vec<FieldOperation>,
}

/// Optional payload schema checked against migrated payloads.
///
/// Mirrors the state-schema validation block agent deployments carry:
/// required context fields, strictness, and whether undeclared fields are
/// tolerated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayloadSchema {
    /// Fields every payload must carry
    #[serde(default)]
    pub required_fields: Vec<String>,

    /// When true, violations fail the load; when false they only log
    #[serde(default)]
    pub strict: bool,

    /// Whether fields outside `required_fields` are tolerated
    #[serde(default = "default_allow_extra_fields")]
    pub allow_extra_fields: bool,
}

impl PayloadSchema {
    /// Check a payload, returning the first violation found.
    pub fn check(&self, payload: &crate::record::Payload) -> Result<(), String> {
        for field in &self.required_fields {
            if !payload.contains_key(field) {
                return Err(format!("missing required field '{field}'"));
            }
        }
        if !self.allow_extra_fields {
            for key in payload.keys() {
                if !self.required_fields.iter().any(|f| f == key) {
                    return Err(format!("extra field '{key}' not allowed"));
                }
            }
        }
        Ok(())
    }
}

/// A parsed schema specification document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaSpec {
    /// The schema version the deployment currently writes
    pub current_version: SchemaVersion,

    /// The lowest schema version ever observed in the store (default 1)
    #[serde(default = "default_min_version")]
    pub min_version: SchemaVersion,

    /// Ordered migration definitions
    #[serde(default)]
    pub migrations: Vec<MigrationDef>,

    /// Optional payload schema for post-migration validation
    #[serde(default)]
    pub payload_schema: Option<PayloadSchema>,
}

impl SchemaSpec {
    /// Parse a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, SpecError> {
        serde_json::from_str(text).map_err(|e| SpecError::Parse {
            reason: e.to_string(),
        })
    }

    /// Parse a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self, SpecError> {
        serde_yml::from_str(text).map_err(|e| SpecError::Parse {
            reason: e.to_string(),
        })
    }

    /// Load a document from disk, dispatching on the file extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SpecError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let text = std::fs::read_to_string(path)?;

        match extension.as_str() {
            "json" => Self::from_json_str(&text),
            "yaml" | "yml" => Self::from_yaml_str(&text),
            other => Err(SpecError::UnsupportedFormat {
                extension: other.to_string(),
            }),
        }
    }

    /// Custom transform ids the document declares, in chain order.
    pub fn custom_ids(&self) -> impl Iterator<Item = &str> {
        self.migrations.iter().flat_map(|m| {
            m.operations.iter().filter_map(|op| match op {
                FieldOperation::Transform { id } => Some(id.as_str()),
                _ => None,
            })
        })
    }

    /// Fail if any declared custom transform lacks a registered
    /// implementation.
    ///
    /// Optional startup check: apply-time lookups produce a typed error
    /// regardless, but failing here keeps a missing registration from
    /// surfacing one key at a time in production.
    pub fn check_customs(&self, customs: &CustomTransforms) -> Result<(), SpecError> {
        for id in self.custom_ids() {
            if !customs.contains(id) {
                return Err(SpecError::UnregisteredCustom { id: id.to_string() });
            }
        }
        Ok(())
    }

    /// Compile the document into a chain-validated [`MigrationRegistry`].
    pub fn build_registry(&self) -> Result<MigrationRegistry, SpecError> {
        let steps = self
            .migrations
            .iter()
            .map(|def| {
                MigrationStep::single_hop(
                    def.from_version,
                    def.description.clone(),
                    def.operations
                        .iter()
                        .cloned()
                        .map(FieldOperation::into_transform)
                        .collect(),
                )
            })
            .collect();

        Ok(MigrationRegistry::build(
            self.current_version,
            self.min_version,
            steps,
        )?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ChainError;
    use serde_json::json;

    const YAML_SPEC: &str = r#"
current_version: 3
migrations:
  - from_version: 1
    description: add traveler count
    operations:
      - op: add_default
        field: travelers
        default: 1
  - from_version: 2
    description: clarify destination field
    operations:
      - op: rename_field
        from: destination
        to: destination_city
payload_schema:
  required_fields: [destination_city, travelers]
  strict: true
"#;

    #[test]
    fn parses_yaml_document() {
        let spec = SchemaSpec::from_yaml_str(YAML_SPEC).unwrap();
        assert_eq!(spec.current_version, 3);
        assert_eq!(spec.min_version, 1);
        assert_eq!(spec.migrations.len(), 2);
        assert_eq!(
            spec.migrations[1].operations[0],
            FieldOperation::RenameField {
                from: "destination".to_string(),
                to: "destination_city".to_string()
            }
        );
        let schema = spec.payload_schema.unwrap();
        assert!(schema.strict);
        assert!(schema.allow_extra_fields);
    }

    #[test]
    fn parses_json_document() {
        let text = serde_json::to_string(&serde_json::json!({
            "current_version": 2,
            "migrations": [
                {
                    "from_version": 1,
                    "operations": [
                        {"op": "remove_field", "field": "legacy"},
                        {"op": "transform", "id": "backfill_summary"}
                    ]
                }
            ]
        }))
        .unwrap();

        let spec = SchemaSpec::from_json_str(&text).unwrap();
        assert_eq!(spec.current_version, 2);
        assert_eq!(spec.migrations[0].description, "");
        let ids: Vec<&str> = spec.custom_ids().collect();
        assert_eq!(ids, vec!["backfill_summary"]);
    }

    #[test]
    fn add_default_value_defaults_to_null() {
        let spec = SchemaSpec::from_yaml_str(
            r#"
current_version: 2
migrations:
  - from_version: 1
    operations:
      - op: add_default
        field: notes
"#,
        )
        .unwrap();
        assert_eq!(
            spec.migrations[0].operations[0],
            FieldOperation::AddDefault {
                field: "notes".to_string(),
                default: serde_json::Value::Null
            }
        );
    }

    #[test]
    fn build_registry_validates_chain() {
        let spec = SchemaSpec::from_yaml_str(
            r#"
current_version: 4
migrations:
  - from_version: 1
    operations: []
  - from_version: 3
    operations: []
"#,
        )
        .unwrap();

        let err = spec.build_registry().unwrap_err();
        assert!(matches!(
            err,
            SpecError::Chain(ChainError::Gap { missing_version: 2 })
        ));
    }

    #[test]
    fn build_registry_compiles_operations() {
        let spec = SchemaSpec::from_yaml_str(YAML_SPEC).unwrap();
        let registry = spec.build_registry().unwrap();
        assert_eq!(registry.current_version(), 3);
        let step = registry.step(2).unwrap();
        assert_eq!(
            step.transforms[0],
            FieldTransform::Rename {
                from: "destination".to_string(),
                to: "destination_city".to_string()
            }
        );
    }

    #[test]
    fn check_customs_flags_unregistered_ids() {
        let spec = SchemaSpec {
            current_version: 2,
            min_version: 1,
            migrations: vec![MigrationDef {
                from_version: 1,
                description: String::new(),
                operations: vec![FieldOperation::Transform {
                    id: "missing".to_string(),
                }],
            }],
            payload_schema: None,
        };

        let err = spec.check_customs(&CustomTransforms::new()).unwrap_err();
        assert!(matches!(err, SpecError::UnregisteredCustom { ref id } if id == "missing"));

        let customs = CustomTransforms::new().register("missing", |_| Ok(()));
        spec.check_customs(&customs).unwrap();
    }

    #[test]
    fn payload_schema_checks_required_and_extra_fields() {
        let schema = PayloadSchema {
            required_fields: vec!["a".to_string(), "b".to_string()],
            strict: true,
            allow_extra_fields: false,
        };

        let ok: crate::record::Payload = [
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!(2)),
        ]
        .into_iter()
        .collect();
        schema.check(&ok).unwrap();

        let missing: crate::record::Payload =
            [("a".to_string(), json!(1))].into_iter().collect();
        assert!(schema.check(&missing).unwrap_err().contains("'b'"));

        let extra: crate::record::Payload = [
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!(2)),
            ("c".to_string(), json!(3)),
        ]
        .into_iter()
        .collect();
        assert!(schema.check(&extra).unwrap_err().contains("'c'"));
    }

    #[test]
    fn from_file_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let yaml_path = dir.path().join("schema.yaml");
        std::fs::write(&yaml_path, YAML_SPEC).unwrap();
        let spec = SchemaSpec::from_file(&yaml_path).unwrap();
        assert_eq!(spec.current_version, 3);

        let odd_path = dir.path().join("schema.ini");
        std::fs::write(&odd_path, "x").unwrap();
        let err = SchemaSpec::from_file(&odd_path).unwrap_err();
        assert!(matches!(err, SpecError::UnsupportedFormat { ref extension } if extension == "ini"));
    }
}
