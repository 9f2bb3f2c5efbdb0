//! File-size quota enforcement and its ordering relative to uploads.

use super::fixtures::{alice, harness};
use crate::artifact::FilePayload;
use crate::core_room::RoomQuotas;
use crate::engine::EngineError;

fn small_file_quotas() -> RoomQuotas {
    RoomQuotas {
        total_files_bytes_allowed: 100,
        single_file_bytes_allowed: 80,
        ..RoomQuotas::default()
    }
}

#[tokio::test]
async fn test_oversized_file_performs_no_upload() {
    let h = harness();
    let room = h.room("alpha", small_file_quotas()).await;
    let channel = h.channel(&room, "general").await;

    let err = h
        .engine
        .post_message(
            &alice(),
            &channel.id,
            "big attachment".to_string(),
            Some(FilePayload::new("big.bin", vec![0; 81])),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExceedsSingleFileSize));
    // The quota rejection happened before any blob-store call
    assert_eq!(h.blobs.put_count(), 0);
}

#[tokio::test]
async fn test_single_file_boundary_is_allowed() {
    let h = harness();
    let room = h.room("alpha", small_file_quotas()).await;
    let channel = h.channel(&room, "general").await;

    // Exactly the per-file limit passes
    let message = h
        .engine
        .post_message(
            &alice(),
            &channel.id,
            "fits".to_string(),
            Some(FilePayload::new("fits.bin", vec![0; 80])),
        )
        .await
        .unwrap();
    assert_eq!(message.upload.unwrap().bytes, 80);
}

#[tokio::test]
async fn test_total_budget_enforced() {
    let h = harness();
    let room = h.room("alpha", small_file_quotas()).await;
    let channel = h.channel(&room, "general").await;

    h.engine
        .post_message(
            &alice(),
            &channel.id,
            "first".to_string(),
            Some(FilePayload::new("a.bin", vec![0; 60])),
        )
        .await
        .unwrap();

    // 60 + 60 > 100
    let err = h
        .engine
        .post_message(
            &alice(),
            &channel.id,
            "second".to_string(),
            Some(FilePayload::new("b.bin", vec![0; 60])),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExceedsRoomTotalFilesLimit));
    assert_eq!(h.blobs.put_count(), 1);

    // 60 + 40 == 100 lands exactly on the budget
    h.engine
        .post_message(
            &alice(),
            &channel.id,
            "third".to_string(),
            Some(FilePayload::new("c.bin", vec![0; 40])),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_room_avatar_bounded_by_total_budget() {
    let h = harness();
    // Caller-supplied quotas may put the single-file limit above the total
    let quotas = RoomQuotas {
        total_files_bytes_allowed: 50,
        single_file_bytes_allowed: 80,
        ..RoomQuotas::default()
    };

    let err = h
        .engine
        .create_room(
            &alice(),
            "alpha".to_string(),
            "general".to_string(),
            quotas,
            Some(FilePayload::new("avatar.png", vec![0; 60])),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExceedsRoomTotalFilesLimit));
    assert_eq!(h.blobs.put_count(), 0);

    // Within the total, the same avatar is accepted
    let room = h
        .engine
        .create_room(
            &alice(),
            "alpha".to_string(),
            "general".to_string(),
            quotas,
            Some(FilePayload::new("avatar.png", vec![0; 50])),
        )
        .await
        .unwrap();
    assert_eq!(room.avatar.unwrap().bytes, 50);
}

#[tokio::test]
async fn test_channel_avatar_counts_against_total_budget() {
    let h = harness();
    let room = h.room("alpha", small_file_quotas()).await;
    let channel = h.channel(&room, "general").await;

    h.engine
        .post_message(
            &alice(),
            &channel.id,
            "first".to_string(),
            Some(FilePayload::new("a.bin", vec![0; 60])),
        )
        .await
        .unwrap();

    // 60 + 50 > 100
    let err = h
        .engine
        .update_channel(
            &alice(),
            &channel.id,
            None,
            Some(FilePayload::new("avatar.png", vec![0; 50])),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExceedsRoomTotalFilesLimit));
}

#[tokio::test]
async fn test_destroying_message_frees_budget() {
    let h = harness();
    let room = h.room("alpha", small_file_quotas()).await;
    let channel = h.channel(&room, "general").await;

    let message = h
        .engine
        .post_message(
            &alice(),
            &channel.id,
            "temp".to_string(),
            Some(FilePayload::new("a.bin", vec![0; 80])),
        )
        .await
        .unwrap();
    let key = message.upload.as_ref().unwrap().key.clone();

    h.engine.destroy_message(&alice(), &message.id).await.unwrap();
    assert!(!h.blobs.contains(&key));

    // The freed budget admits a new file
    h.engine
        .post_message(
            &alice(),
            &channel.id,
            "again".to_string(),
            Some(FilePayload::new("b.bin", vec![0; 80])),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_room_destroy_removes_blobs() {
    let h = harness();
    let room = h.room("alpha", small_file_quotas()).await;
    let channel = h.channel(&room, "general").await;

    let message = h
        .engine
        .post_message(
            &alice(),
            &channel.id,
            "doomed".to_string(),
            Some(FilePayload::new("a.bin", vec![0; 10])),
        )
        .await
        .unwrap();
    let key = message.upload.as_ref().unwrap().key.clone();

    h.engine.destroy_room(&alice(), &room.id).await.unwrap();
    assert!(!h.blobs.contains(&key));
}
