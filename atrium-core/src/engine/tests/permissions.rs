//! Authorization rules: role gates, check ordering, the ownership-or-moderator
//! rule and the last-admin invariant.

use super::fixtures::{alice, bob, carol, harness};
use crate::core_room::{ChannelKind, Role, RoomQuotas};
use crate::engine::EngineError;

fn one_channel_quotas() -> RoomQuotas {
    RoomQuotas {
        max_channels: 1,
        ..RoomQuotas::default()
    }
}

async fn join(h: &super::fixtures::Harness, room_id: &crate::core_room::RoomId, user: &crate::core_room::UserId) {
    let invite = h.engine.create_invite(&alice(), room_id, None).await.unwrap();
    h.engine.join_by_invite(user, &invite.code).await.unwrap();
}

#[tokio::test]
async fn test_unverified_user_cannot_create_room() {
    let h = harness();
    let err = h
        .engine
        .create_room(
            &carol(),
            "alpha".to_string(),
            "general".to_string(),
            RoomQuotas::default(),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::VerifiedEmailRequired));
}

#[tokio::test]
async fn test_channel_create_requires_admin() {
    let h = harness();
    let room = h.room("alpha", RoomQuotas::default()).await;
    join(&h, &room.id, &bob()).await;

    let err = h
        .engine
        .create_channel(&bob(), &room.id, "general".to_string(), ChannelKind::Text, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AdminPermissionRequired));
}

#[tokio::test]
async fn test_authorization_checked_before_quota() {
    let h = harness();
    let room = h.room("alpha", one_channel_quotas()).await;
    h.channel(&room, "general").await;
    join(&h, &room.id, &bob()).await;

    // The room is at its channel limit; the Admin hits the quota error
    let err = h
        .engine
        .create_channel(&alice(), &room.id, "extra".to_string(), ChannelKind::Text, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExceedsRoomChannelCount));

    // The same call by a plain member fails on authorization instead
    let err = h
        .engine
        .create_channel(&bob(), &room.id, "extra".to_string(), ChannelKind::Text, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AdminPermissionRequired));
}

#[tokio::test]
async fn test_moderator_can_edit_foreign_message() {
    let h = harness();
    let room = h.room("alpha", RoomQuotas::default()).await;
    let channel = h.channel(&room, "general").await;
    join(&h, &room.id, &bob()).await;

    let message = h
        .engine
        .post_message(&alice(), &channel.id, "original".to_string(), None)
        .await
        .unwrap();

    // As a plain member, bob cannot touch alice's message
    let err = h
        .engine
        .edit_message(&bob(), &message.id, "defaced".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::OwnershipOrModeratorRequired));

    // As a Moderator, the edit goes through
    h.engine
        .change_member_role(&alice(), &room.id, &bob(), Role::Moderator)
        .await
        .unwrap();
    let edited = h
        .engine
        .edit_message(&bob(), &message.id, "moderated".to_string())
        .await
        .unwrap();
    assert_eq!(edited.body, "moderated");
}

#[tokio::test]
async fn test_author_can_edit_own_message() {
    let h = harness();
    let room = h.room("alpha", RoomQuotas::default()).await;
    let channel = h.channel(&room, "general").await;
    join(&h, &room.id, &bob()).await;

    let message = h
        .engine
        .post_message(&bob(), &channel.id, "draft".to_string(), None)
        .await
        .unwrap();
    let edited = h
        .engine
        .edit_message(&bob(), &message.id, "final".to_string())
        .await
        .unwrap();
    assert_eq!(edited.body, "final");
}

#[tokio::test]
async fn test_admin_role_is_not_moderator() {
    let h = harness();
    let room = h.room("alpha", RoomQuotas::default()).await;

    // Role checks are exact matches, no hierarchy
    assert!(h
        .engine
        .is_in_room(&room.id, &alice(), Some(Role::Admin))
        .await
        .unwrap());
    assert!(!h
        .engine
        .is_in_room(&room.id, &alice(), Some(Role::Moderator))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_last_admin_cannot_be_demoted() {
    let h = harness();
    let room = h.room("alpha", RoomQuotas::default()).await;

    let err = h
        .engine
        .change_member_role(&alice(), &room.id, &alice(), Role::Member)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RoomLeastOneAdminRequired));
}

#[tokio::test]
async fn test_last_admin_cannot_leave() {
    let h = harness();
    let room = h.room("alpha", RoomQuotas::default()).await;
    join(&h, &room.id, &bob()).await;

    let err = h.engine.leave_room(&alice(), &room.id).await.unwrap_err();
    assert!(matches!(err, EngineError::RoomLeastOneAdminRequired));

    // A plain member can always leave
    h.engine.leave_room(&bob(), &room.id).await.unwrap();
}

#[tokio::test]
async fn test_second_admin_unblocks_demotion() {
    let h = harness();
    let room = h.room("alpha", RoomQuotas::default()).await;
    join(&h, &room.id, &bob()).await;

    h.engine
        .change_member_role(&alice(), &room.id, &bob(), Role::Admin)
        .await
        .unwrap();
    let demoted = h
        .engine
        .change_member_role(&alice(), &room.id, &alice(), Role::Member)
        .await
        .unwrap();
    assert_eq!(demoted.role, Role::Member);
}

#[tokio::test]
async fn test_room_destroy_requires_admin() {
    let h = harness();
    let room = h.room("alpha", RoomQuotas::default()).await;
    join(&h, &room.id, &bob()).await;

    let err = h.engine.destroy_room(&bob(), &room.id).await.unwrap_err();
    assert!(matches!(err, EngineError::AdminPermissionRequired));

    h.engine.destroy_room(&alice(), &room.id).await.unwrap();
}

#[tokio::test]
async fn test_non_member_cannot_post() {
    let h = harness();
    let room = h.room("alpha", RoomQuotas::default()).await;
    let channel = h.channel(&room, "general").await;

    let err = h
        .engine
        .post_message(&bob(), &channel.id, "hi".to_string(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RoomMemberRequired));
}

#[tokio::test]
async fn test_invalid_credentials() {
    let h = harness();
    assert_eq!(
        h.engine.authenticate("token-alice").await.unwrap(),
        alice()
    );
    let err = h.engine.authenticate("forged").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidCredentials));
}
