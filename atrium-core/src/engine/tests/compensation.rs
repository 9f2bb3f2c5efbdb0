//! A failed primary-store write must delete the artifact it just uploaded.

use super::fixtures::{alice, harness_with_store, FailingStore};
use crate::artifact::FilePayload;
use crate::core_room::RoomQuotas;
use crate::engine::EngineError;
use std::sync::Arc;

#[tokio::test]
async fn test_write_failure_compensates_upload() {
    let store = Arc::new(FailingStore::new());
    let h = harness_with_store(store.clone());

    store.fail_next_writes(true);
    let err = h
        .engine
        .create_room(
            &alice(),
            "alpha".to_string(),
            "general".to_string(),
            RoomQuotas::default(),
            Some(FilePayload::new("avatar.png", vec![7; 64])),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Store(_)));

    // Exactly one upload happened, and its key was deleted again
    assert_eq!(h.blobs.put_count(), 1);
    let deleted = h.blobs.deleted_keys();
    assert_eq!(deleted.len(), 1);
    assert!(!h.blobs.contains(&deleted[0]));
}

#[tokio::test]
async fn test_write_failure_without_upload_compensates_nothing() {
    let store = Arc::new(FailingStore::new());
    let h = harness_with_store(store.clone());

    store.fail_next_writes(true);
    let err = h
        .engine
        .create_room(
            &alice(),
            "alpha".to_string(),
            "general".to_string(),
            RoomQuotas::default(),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Store(_)));
    assert_eq!(h.blobs.put_count(), 0);
    assert!(h.blobs.deleted_keys().is_empty());
}

#[tokio::test]
async fn test_successful_write_keeps_artifact() {
    let store = Arc::new(FailingStore::new());
    let h = harness_with_store(store.clone());

    let room = h
        .engine
        .create_room(
            &alice(),
            "alpha".to_string(),
            "general".to_string(),
            RoomQuotas::default(),
            Some(FilePayload::new("avatar.png", vec![7; 64])),
        )
        .await
        .unwrap();

    let avatar = room.avatar.expect("avatar reference");
    assert!(h.blobs.contains(&avatar.key));
    assert!(h.blobs.deleted_keys().is_empty());
}

#[tokio::test]
async fn test_message_upload_compensated_on_failure() {
    let store = Arc::new(FailingStore::new());
    let h = harness_with_store(store.clone());

    let room = h.room("alpha", RoomQuotas::default()).await;
    let channel = h.channel(&room, "general").await;

    store.fail_next_writes(true);
    let err = h
        .engine
        .post_message(
            &alice(),
            &channel.id,
            "with attachment".to_string(),
            Some(FilePayload::new("doc.pdf", vec![1; 128])),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Store(_)));

    let deleted = h.blobs.deleted_keys();
    assert_eq!(deleted.len(), 1);
    assert!(!h.blobs.contains(&deleted[0]));
}
