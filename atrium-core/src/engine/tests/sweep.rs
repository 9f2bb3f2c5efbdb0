//! Retention sweep behavior.

use super::fixtures::{alice, harness};
use crate::artifact::FilePayload;
use crate::core_room::{ChannelMessage, RoomQuotas, Timestamp};
use crate::engine::EngineError;
use crate::store::{RoomStore, WriteBatch, WriteOp};

fn retention_quotas(message_days: u32, file_days: u32) -> RoomQuotas {
    RoomQuotas {
        message_days_to_live: message_days,
        file_days_to_live: file_days,
        ..RoomQuotas::default()
    }
}

#[tokio::test]
async fn test_old_messages_are_swept() {
    let h = harness();
    let room = h.room("alpha", retention_quotas(7, 0)).await;
    let channel = h.channel(&room, "general").await;

    let mut old = ChannelMessage::new(channel.id, alice(), "ancient".to_string());
    old.created_at = Timestamp::now().days_earlier(8);
    let mut batch = WriteBatch::new();
    batch.push(WriteOp::InsertMessage(old.clone()));
    h.engine.store().write_atomic(batch).await.unwrap();

    let fresh = h
        .engine
        .post_message(&alice(), &channel.id, "recent".to_string(), None)
        .await
        .unwrap();

    let report = h.engine.sweep_room(&room.id, Timestamp::now()).await.unwrap();
    assert_eq!(report.messages_removed, 1);
    assert_eq!(report.files_removed, 0);

    let remaining = h.engine.store().channel_messages(&channel.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, fresh.id);
}

#[tokio::test]
async fn test_swept_message_upload_is_deleted() {
    let h = harness();
    let room = h.room("alpha", retention_quotas(7, 0)).await;
    let channel = h.channel(&room, "general").await;

    let message = h
        .engine
        .post_message(
            &alice(),
            &channel.id,
            "with file".to_string(),
            Some(FilePayload::new("a.bin", vec![0; 16])),
        )
        .await
        .unwrap();
    let key = message.upload.as_ref().unwrap().key.clone();

    // Age the message past the window
    let mut aged = message.clone();
    aged.created_at = Timestamp::now().days_earlier(8);
    let mut batch = WriteBatch::new();
    batch.push(WriteOp::UpdateMessage(aged));
    h.engine.store().write_atomic(batch).await.unwrap();

    let report = h.engine.sweep_room(&room.id, Timestamp::now()).await.unwrap();
    assert_eq!(report.messages_removed, 1);
    assert_eq!(report.files_removed, 1);
    assert!(!h.blobs.contains(&key));
}

#[tokio::test]
async fn test_zero_days_keeps_everything() {
    let h = harness();
    let room = h.room("alpha", retention_quotas(0, 0)).await;
    let channel = h.channel(&room, "general").await;

    let mut old = ChannelMessage::new(channel.id, alice(), "ancient".to_string());
    old.created_at = Timestamp::from_millis(0);
    let mut batch = WriteBatch::new();
    batch.push(WriteOp::InsertMessage(old));
    h.engine.store().write_atomic(batch).await.unwrap();

    let report = h.engine.sweep_room(&room.id, Timestamp::now()).await.unwrap();
    assert!(report.is_empty());
    assert_eq!(
        h.engine.store().channel_messages(&channel.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_missing_room_is_not_found() {
    let h = harness();
    let err = h
        .engine
        .sweep_room(&crate::core_room::RoomId::generate(), Timestamp::now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EntityNotFound));
}
