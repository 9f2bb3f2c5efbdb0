//! Invite links and the join protocol
//!
//! Joining checks conditions in a fixed order: link resolution, expiry,
//! duplicate membership, email verification, then the member quota. The first
//! failing condition wins when several hold at once.

use super::{EngineError, RoomEngine};
use crate::core_room::{
    ChannelMessage, InviteId, Role, RoomAudit, RoomId, RoomInviteLink, RoomMember, Timestamp,
    UserId,
};
use crate::store::{RoomStore, StoreError, WriteBatch, WriteGuard, WriteOp};
use serde_json::json;

impl RoomEngine {
    /// Create an invite link; Admin only
    pub async fn create_invite(
        &self,
        actor: &UserId,
        room_id: &RoomId,
        expires_at: Option<Timestamp>,
    ) -> Result<RoomInviteLink, EngineError> {
        self.store.room(room_id).await?;
        self.require_admin(room_id, actor).await?;

        let invite = RoomInviteLink::new(*room_id, actor.clone(), expires_at);

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertInvite(invite.clone()));
        batch.push(WriteOp::AppendRoomAudit(RoomAudit::new(
            *room_id,
            "invite.created",
            json!({ "by": actor.as_str() }),
        )));

        self.commit(batch, None).await?;
        Ok(self.store.invite(&invite.id).await?)
    }

    /// Change an invite link's expiry; Admin only
    pub async fn update_invite(
        &self,
        actor: &UserId,
        invite_id: &InviteId,
        expires_at: Option<Timestamp>,
    ) -> Result<RoomInviteLink, EngineError> {
        let mut invite = self.store.invite(invite_id).await?;
        self.require_admin(&invite.room_id, actor).await?;

        invite.expires_at = expires_at;

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::UpdateInvite(invite.clone()));
        batch.push(WriteOp::AppendRoomAudit(RoomAudit::new(
            invite.room_id,
            "invite.updated",
            json!({ "by": actor.as_str() }),
        )));

        self.commit(batch, None).await?;
        Ok(self.store.invite(invite_id).await?)
    }

    /// Destroy an invite link; Admin only
    ///
    /// Expired links stay readable and destroyable.
    pub async fn destroy_invite(
        &self,
        actor: &UserId,
        invite_id: &InviteId,
    ) -> Result<(), EngineError> {
        let invite = self.store.invite(invite_id).await?;
        self.require_admin(&invite.room_id, actor).await?;

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::DeleteInvite(*invite_id));
        batch.push(WriteOp::AppendRoomAudit(RoomAudit::new(
            invite.room_id,
            "invite.destroyed",
            json!({ "by": actor.as_str() }),
        )));

        self.commit(batch, None).await
    }

    /// Consume an invite code and become a Member of its room
    ///
    /// On success the membership and the welcome announcement land in one
    /// write; a member-quota guard re-checks the count inside the
    /// transaction.
    pub async fn join_by_invite(
        &self,
        user: &UserId,
        code: &str,
    ) -> Result<RoomMember, EngineError> {
        let invite = match self.store.invite_by_code(code).await {
            Ok(invite) => invite,
            Err(StoreError::NotFound) => return Err(EngineError::EntityNotFound),
            Err(e) => return Err(e.into()),
        };
        if invite.is_expired(Timestamp::now()) {
            return Err(EngineError::EntityExpired);
        }
        let room = self.store.room(&invite.room_id).await?;
        if self.store.membership(&room.id, user).await?.is_some() {
            return Err(EngineError::DuplicateRoomUser);
        }
        if !self.is_verified(user).await {
            return Err(EngineError::VerifiedEmailRequired);
        }
        if self.room_user_count_exceeds_limit(&room, 1).await? {
            return Err(self.quota_rejected(EngineError::ExceedsRoomUserCount));
        }

        let membership = RoomMember::new(room.id, user.clone(), Role::Member);

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertMember(membership.clone()));
        if let Some(announcement) = self.welcome_announcement(&room, user).await? {
            batch.push(WriteOp::InsertMessage(announcement));
        }
        batch.push(WriteOp::AppendRoomAudit(RoomAudit::new(
            room.id,
            "member.joined",
            json!({ "user": user.as_str(), "invite": invite.code }),
        )));
        batch.guard(WriteGuard::MemberCountAtMost {
            room_id: room.id,
            max: room.quotas.max_users,
        });

        self.commit(batch, None).await?;
        tracing::info!(room = %room.id, user = %user, "joined via invite");
        self.store
            .membership(&room.id, user)
            .await?
            .ok_or(EngineError::EntityNotFound)
    }

    /// Build the system-authored welcome message, if a target channel exists
    ///
    /// The configured announce channel wins; otherwise the room's oldest
    /// channel. A room without channels joins silently.
    async fn welcome_announcement(
        &self,
        room: &crate::core_room::Room,
        user: &UserId,
    ) -> Result<Option<ChannelMessage>, EngineError> {
        let target = match room.join_settings.announce_channel {
            Some(channel_id) => match self.store.channel(&channel_id).await {
                Ok(channel) if channel.room_id == room.id => Some(channel.id),
                // A stale announce-channel setting falls back to the oldest
                _ => self.oldest_channel(&room.id).await?,
            },
            None => self.oldest_channel(&room.id).await?,
        };
        let Some(channel_id) = target else {
            return Ok(None);
        };

        let display_name = self.identity.display_name(user).await;
        let body = room.join_settings.render(&display_name);
        Ok(Some(ChannelMessage::system(channel_id, body)))
    }

    async fn oldest_channel(
        &self,
        room_id: &RoomId,
    ) -> Result<Option<crate::core_room::ChannelId>, EngineError> {
        Ok(self
            .store
            .room_channels(room_id)
            .await?
            .first()
            .map(|c| c.id))
    }
}
