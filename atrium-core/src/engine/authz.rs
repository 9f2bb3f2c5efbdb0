//! Authorization evaluator
//!
//! Pure reads over the current store snapshot. Role checks are exact matches;
//! there is no role hierarchy. Absent rooms, channels or memberships evaluate
//! to "not authorized", never to an error.

use super::RoomEngine;
use crate::core_room::{ChannelId, Role, RoomId, UserId};
use crate::engine::EngineError;
use crate::store::{RoomStore, StoreError};

impl RoomEngine {
    /// Whether the user's email-verification record exists and is verified
    pub async fn is_verified(&self, user_id: &UserId) -> bool {
        self.identity.is_verified(user_id).await
    }

    /// Whether the user holds a membership in the room, optionally with an
    /// exact role
    pub async fn is_in_room(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        role: Option<Role>,
    ) -> Result<bool, EngineError> {
        let membership = self.store.membership(room_id, user_id).await?;
        Ok(match (membership, role) {
            (Some(m), Some(required)) => m.role == required,
            (Some(_), None) => true,
            (None, _) => false,
        })
    }

    /// Resolve a channel to its owning room, then check membership there
    pub async fn is_in_room_by_channel(
        &self,
        channel_id: &ChannelId,
        user_id: &UserId,
        role: Option<Role>,
    ) -> Result<bool, EngineError> {
        let channel = match self.store.channel(channel_id).await {
            Ok(channel) => channel,
            Err(StoreError::NotFound) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        self.is_in_room(&channel.room_id, user_id, role).await
    }

    /// Gate used before Admin-only mutations
    pub(super) async fn require_admin(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<(), EngineError> {
        if self.is_in_room(room_id, user_id, Some(Role::Admin)).await? {
            Ok(())
        } else {
            metrics::counter!(crate::metrics::AUTHZ_REJECTIONS).increment(1);
            Err(EngineError::AdminPermissionRequired)
        }
    }

    /// Gate used before member-level mutations
    pub(super) async fn require_member(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<(), EngineError> {
        if self.is_in_room(room_id, user_id, None).await? {
            Ok(())
        } else {
            metrics::counter!(crate::metrics::AUTHZ_REJECTIONS).increment(1);
            Err(EngineError::RoomMemberRequired)
        }
    }
}
