// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! End-to-end lazy migration: schema spec document -> registry -> loader
//! over the file-based store.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use serde_json::json;

use dashvault::{
    CheckpointRecord, CheckpointStore, CustomTransforms, FileCheckpointStore, LoadError,
    MigratingLoader, PathError, Payload, SchemaSpec, WriteBackPolicy,
};

const SCHEMA_YAML: &str = r#"
current_version: 3
migrations:
  - from_version: 1
    description: add traveler count
    operations:
      - op: add_default
        field: travelers
        default: 1
  - from_version: 2
    description: clarify destination field and derive a summary
    operations:
      - op: rename_field
        from: destination
        to: destination_city
      - op: transform
        id: derive_summary
"#;

fn customs() -> CustomTransforms {
    CustomTransforms::new().register("derive_summary", |payload: &mut Payload| {
        let city = payload
            .get("destination_city")
            .and_then(|v| v.as_str())
            .unwrap_or("somewhere");
        let travelers = payload.get("travelers").and_then(|v| v.as_u64()).unwrap_or(1);
        payload.insert(
            "summary".to_string(),
            json!(format!("{travelers} traveler(s) to {city}")),
        );
        Ok(())
    })
}

fn payload_of(pairs: &[(&str, serde_json::Value)]) -> Payload {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

async fn seeded_loader(
    dir: &std::path::Path,
    customs: CustomTransforms,
) -> (Arc<FileCheckpointStore>, MigratingLoader) {
    let store = Arc::new(FileCheckpointStore::new(dir).unwrap());
    store
        .put(
            "thread-v1",
            &CheckpointRecord::new(
                "thread-v1",
                1,
                payload_of(&[("destination", json!("Paris"))]),
            ),
        )
        .await
        .unwrap();
    store
        .put(
            "thread-v2",
            &CheckpointRecord::new(
                "thread-v2",
                2,
                payload_of(&[("destination", json!("Tokyo")), ("travelers", json!(4))]),
            ),
        )
        .await
        .unwrap();

    let spec = SchemaSpec::from_yaml_str(SCHEMA_YAML).unwrap();
    let registry = Arc::new(spec.build_registry().unwrap());
    let loader = MigratingLoader::new(store.clone(), registry, Arc::new(customs))
        .with_write_back(WriteBackPolicy::Blocking);
    (store, loader)
}

#[tokio::test]
async fn v1_record_migrates_through_the_whole_chain() {
    let dir = tempfile::tempdir().unwrap();
    let (store, loader) = seeded_loader(dir.path(), customs()).await;

    let record = loader.load("thread-v1").await.unwrap();
    assert_eq!(record.schema_version, 3);
    assert_eq!(record.field("destination_city"), Some(&json!("Paris")));
    assert_eq!(record.field("travelers"), Some(&json!(1)));
    assert_eq!(
        record.field("summary"),
        Some(&json!("1 traveler(s) to Paris"))
    );
    assert!(record.field("destination").is_none());

    // Blocking write-back persisted the upgrade; the next read is a
    // version check away from current
    let stored = store.get("thread-v1").await.unwrap().unwrap();
    assert_eq!(stored.schema_version, 3);
    assert_eq!(stored.payload, record.payload);
}

#[tokio::test]
async fn v2_record_takes_only_the_remaining_hop() {
    let dir = tempfile::tempdir().unwrap();
    let (_store, loader) = seeded_loader(dir.path(), customs()).await;

    let record = loader.load("thread-v2").await.unwrap();
    assert_eq!(record.schema_version, 3);
    // The pre-existing travelers value was preserved, not defaulted
    assert_eq!(record.field("travelers"), Some(&json!(4)));
    assert_eq!(
        record.field("summary"),
        Some(&json!("4 traveler(s) to Tokyo"))
    );
}

#[tokio::test]
async fn reload_after_write_back_returns_identical_record() {
    let dir = tempfile::tempdir().unwrap();
    let (_store, loader) = seeded_loader(dir.path(), customs()).await;

    let first = loader.load("thread-v1").await.unwrap();
    let second = loader.load("thread-v1").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn unregistered_custom_transform_is_a_typed_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (store, loader) = seeded_loader(dir.path(), CustomTransforms::new()).await;

    let err = loader.load("thread-v1").await.unwrap_err();
    match err {
        LoadError::UnimplementedTransform { id, from_version } => {
            assert_eq!(id, "derive_summary");
            assert_eq!(from_version, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // The failed load wrote nothing back
    let stored = store.get("thread-v1").await.unwrap().unwrap();
    assert_eq!(stored.schema_version, 1);
}

#[tokio::test]
async fn record_from_newer_code_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let (store, loader) = seeded_loader(dir.path(), customs()).await;

    store
        .put(
            "thread-v4",
            &CheckpointRecord::new("thread-v4", 4, Payload::new()),
        )
        .await
        .unwrap();

    let err = loader.load("thread-v4").await.unwrap_err();
    assert!(matches!(
        err,
        LoadError::Path(PathError::FutureVersion {
            found: 4,
            current: 3
        })
    ));
    assert_eq!(
        store.get("thread-v4").await.unwrap().unwrap().schema_version,
        4
    );
}
