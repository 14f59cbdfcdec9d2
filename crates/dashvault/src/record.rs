// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Checkpoint record data model
//!
//! A [`CheckpointRecord`] is a persisted snapshot of conversational/agent
//! state keyed by a thread identifier. The engine reads records, transforms
//! their payloads in memory, and optionally rewrites payload and schema
//! version in place; it never creates or deletes records.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Version number for the checkpoint payload schema.
///
/// Versions form a total order; migration steps advance them one hop at a
/// time.
pub type SchemaVersion = u32;

/// Thread identifier a checkpoint is keyed by.
pub type ThreadKey = String;

/// Checkpoint payload: a mapping from field name to JSON value.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A persisted checkpoint of agent state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Thread identifier this checkpoint belongs to
    pub key: ThreadKey,

    /// Schema version of the payload
    pub schema_version: SchemaVersion,

    /// The state fields
    pub payload: Payload,

    /// When the record was last written by its owner
    pub updated_at: DateTime<Utc>,
}

impl CheckpointRecord {
    /// Create a record at the given schema version.
    pub fn new(key: impl Into<ThreadKey>, schema_version: SchemaVersion, payload: Payload) -> Self {
        Self {
            key: key.into(),
            schema_version,
            payload,
            updated_at: Utc::now(),
        }
    }

    /// Get a payload field by name.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.payload.get(name)
    }
}

/// On-disk wire form of a checkpoint.
///
/// The wrapper is bincode-friendly while the payload is kept as a JSON
/// string, so old payload shapes stay decodable long after the in-memory
/// types have moved on. The schema version lives in the wrapper, readable
/// without touching the payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredCheckpoint {
    /// Schema version of the payload at write time
    pub schema_version: SchemaVersion,

    /// Payload serialized as JSON text
    pub payload: String,

    /// `updated_at` as nanoseconds since the Unix epoch
    pub updated_at_nanos: i64,
}

impl StoredCheckpoint {
    /// Build the wire form of a record.
    pub fn encode(record: &CheckpointRecord) -> Result<Self, StoreError> {
        let payload =
            serde_json::to_string(&record.payload).map_err(|e| StoreError::Serialization {
                reason: format!("failed to serialize payload: {e}"),
            })?;

        Ok(Self {
            schema_version: record.schema_version,
            payload,
            updated_at_nanos: record.updated_at.timestamp_nanos_opt().unwrap_or(0),
        })
    }

    /// Reconstruct a record under the given key.
    pub fn decode(self, key: &str) -> Result<CheckpointRecord, StoreError> {
        let payload: Payload =
            serde_json::from_str(&self.payload).map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: format!("payload is not a JSON object: {e}"),
            })?;

        let updated_at = Utc.timestamp_nanos(self.updated_at_nanos);

        Ok(CheckpointRecord {
            key: key.to_string(),
            schema_version: self.schema_version,
            payload,
            updated_at,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload_of(pairs: &[(&str, serde_json::Value)]) -> Payload {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn encode_decode_round_trip() {
        let record = CheckpointRecord::new(
            "thread-1",
            2,
            payload_of(&[("destination", json!("Paris")), ("travelers", json!(2))]),
        );

        let stored = StoredCheckpoint::encode(&record).unwrap();
        assert_eq!(stored.schema_version, 2);

        let decoded = stored.decode("thread-1").unwrap();
        assert_eq!(decoded.key, "thread-1");
        assert_eq!(decoded.schema_version, 2);
        assert_eq!(decoded.field("destination"), Some(&json!("Paris")));
        assert_eq!(decoded.field("travelers"), Some(&json!(2)));
    }

    #[test]
    fn decode_rejects_non_object_payload() {
        let stored = StoredCheckpoint {
            schema_version: 1,
            payload: "[1, 2, 3]".to_string(),
            updated_at_nanos: 0,
        };

        let err = stored.decode("bad").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref key, .. } if key == "bad"));
    }

    #[test]
    fn stored_form_survives_bincode() {
        let record = CheckpointRecord::new(
            "t",
            7,
            payload_of(&[("nested", json!({"a": [1, null, "x"]}))]),
        );

        let stored = StoredCheckpoint::encode(&record).unwrap();
        let bytes = bincode::serialize(&stored).unwrap();
        let back: StoredCheckpoint = bincode::deserialize(&bytes).unwrap();
        let decoded = back.decode("t").unwrap();
        assert_eq!(decoded.payload, record.payload);
        assert_eq!(decoded.schema_version, 7);
    }

    #[test]
    fn timestamp_round_trips_at_nanosecond_precision() {
        let record = CheckpointRecord::new("t", 1, Payload::new());
        let stored = StoredCheckpoint::encode(&record).unwrap();
        let decoded = stored.decode("t").unwrap();
        assert_eq!(
            decoded.updated_at.timestamp_nanos_opt(),
            record.updated_at.timestamp_nanos_opt()
        );
    }
}
