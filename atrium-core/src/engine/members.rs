//! Membership mutations
//!
//! Every path that could drop a room's Admin count below one is rejected up
//! front and re-asserted by an in-transaction guard.

use super::{EngineError, RoomEngine};
use crate::core_room::{Role, RoomAudit, RoomId, RoomMember, UserId};
use crate::store::{Metric, RoomStore, WriteBatch, WriteGuard, WriteOp};
use serde_json::json;

impl RoomEngine {
    /// Change a member's role; Admin only
    pub async fn change_member_role(
        &self,
        actor: &UserId,
        room_id: &RoomId,
        target: &UserId,
        role: Role,
    ) -> Result<RoomMember, EngineError> {
        self.store.room(room_id).await?;
        self.require_admin(room_id, actor).await?;

        let membership = self
            .store
            .membership(room_id, target)
            .await?
            .ok_or(EngineError::EntityNotFound)?;

        // Demoting the last Admin would leave the room unmanageable
        if membership.role == Role::Admin && role != Role::Admin {
            self.require_surviving_admin(room_id).await?;
        }

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::UpdateMemberRole {
            room_id: *room_id,
            user_id: target.clone(),
            role,
        });
        batch.push(WriteOp::AppendRoomAudit(RoomAudit::new(
            *room_id,
            "member.role_changed",
            json!({ "by": actor.as_str(), "user": target.as_str(), "role": role.as_str() }),
        )));
        batch.guard(WriteGuard::AdminCountAtLeast {
            room_id: *room_id,
            min: 1,
        });

        self.commit(batch, None).await?;
        self.store
            .membership(room_id, target)
            .await?
            .ok_or(EngineError::EntityNotFound)
    }

    /// Remove a member from a room; Admin only
    pub async fn remove_member(
        &self,
        actor: &UserId,
        room_id: &RoomId,
        target: &UserId,
    ) -> Result<(), EngineError> {
        self.store.room(room_id).await?;
        self.require_admin(room_id, actor).await?;

        let membership = self
            .store
            .membership(room_id, target)
            .await?
            .ok_or(EngineError::EntityNotFound)?;

        self.remove_membership(actor, membership).await
    }

    /// Leave a room voluntarily
    pub async fn leave_room(&self, actor: &UserId, room_id: &RoomId) -> Result<(), EngineError> {
        self.store.room(room_id).await?;
        let membership = self
            .store
            .membership(room_id, actor)
            .await?
            .ok_or(EngineError::RoomMemberRequired)?;

        self.remove_membership(actor, membership).await
    }

    async fn remove_membership(
        &self,
        actor: &UserId,
        membership: RoomMember,
    ) -> Result<(), EngineError> {
        let room_id = membership.room_id;
        if membership.role == Role::Admin {
            self.require_surviving_admin(&room_id).await?;
        }

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::DeleteMember {
            room_id,
            user_id: membership.user_id.clone(),
        });
        batch.push(WriteOp::AppendRoomAudit(RoomAudit::new(
            room_id,
            "member.removed",
            json!({ "by": actor.as_str(), "user": membership.user_id.as_str() }),
        )));
        batch.guard(WriteGuard::AdminCountAtLeast { room_id, min: 1 });

        self.commit(batch, None).await?;
        tracing::info!(room = %room_id, user = %membership.user_id, "membership removed");
        Ok(())
    }

    /// Fail when the room holds exactly one Admin
    async fn require_surviving_admin(&self, room_id: &RoomId) -> Result<(), EngineError> {
        let admins = self.store.aggregate(room_id, Metric::AdminCount).await?;
        if admins <= 1 {
            return Err(EngineError::RoomLeastOneAdminRequired);
        }
        Ok(())
    }
}
