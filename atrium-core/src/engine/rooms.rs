//! Room lifecycle mutations

use super::{EngineError, RoomEngine};
use crate::artifact::FilePayload;
use crate::core_room::{
    ArtifactKind, JoinSettings, Role, Room, RoomAudit, RoomFile, RoomId, RoomMember, RoomQuotas,
    Timestamp, UserId,
};
use crate::store::{RoomStore, WriteBatch, WriteGuard, WriteOp};
use serde_json::json;

/// Optional field updates for an existing room
#[derive(Debug, Clone, Default)]
pub struct RoomUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub rules: Option<String>,
}

impl RoomEngine {
    /// Create a room; the verified creator becomes its first Admin in the
    /// same write
    pub async fn create_room(
        &self,
        creator: &UserId,
        name: String,
        category: String,
        quotas: RoomQuotas,
        avatar: Option<FilePayload>,
    ) -> Result<Room, EngineError> {
        if !self.is_verified(creator).await {
            return Err(EngineError::VerifiedEmailRequired);
        }

        let mut room = Room::new(name, category, quotas);

        // Quota checks precede the upload; the room holds no files yet so
        // both predicates run against a zero balance
        if let Some(payload) = &avatar {
            self.check_initial_file_quotas(&room, payload.size())?;
        }

        let uploaded = match &avatar {
            Some(payload) => Some(self.uploads.upload(payload, &room.id).await?),
            None => None,
        };
        room.avatar = uploaded.clone();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(room.clone()));
        batch.push(WriteOp::InsertMember(RoomMember::new(
            room.id,
            creator.clone(),
            Role::Admin,
        )));
        if let Some(artifact) = &uploaded {
            batch.push(WriteOp::InsertFile(RoomFile::new(
                room.id,
                artifact.clone(),
                ArtifactKind::RoomAvatar,
            )));
            batch.guard(WriteGuard::FileBytesAtMost {
                room_id: room.id,
                max: room.quotas.total_files_bytes_allowed,
            });
        }
        batch.push(WriteOp::AppendRoomAudit(RoomAudit::new(
            room.id,
            "room.created",
            json!({ "by": creator.as_str(), "name": room.name }),
        )));

        self.commit(batch, uploaded.as_ref()).await?;
        tracing::info!(room = %room.id, name = %room.name, "room created");
        Ok(self.store.room(&room.id).await?)
    }

    /// Update room metadata; Admin only
    pub async fn update_room(
        &self,
        actor: &UserId,
        room_id: &RoomId,
        update: RoomUpdate,
        avatar: Option<FilePayload>,
    ) -> Result<Room, EngineError> {
        let mut room = self.store.room(room_id).await?;
        self.require_admin(room_id, actor).await?;

        if let Some(payload) = &avatar {
            self.check_file_quotas(&room, payload.size()).await?;
        }

        let uploaded = match &avatar {
            Some(payload) => Some(self.uploads.upload(payload, room_id).await?),
            None => None,
        };

        if let Some(name) = update.name {
            room.name = name;
        }
        if let Some(category) = update.category {
            room.category = category;
        }
        if let Some(rules) = update.rules {
            room.rules = rules;
        }
        let replaced_avatar = match &uploaded {
            Some(artifact) => room.avatar.replace(artifact.clone()),
            None => None,
        };
        room.updated_at = Timestamp::now();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::UpdateRoom(room.clone()));
        if let Some(artifact) = &uploaded {
            // The old avatar's file record goes in the same write
            if let Some(old) = &replaced_avatar {
                if let Some(record) = self.file_record_by_key(room_id, &old.key).await? {
                    batch.push(WriteOp::DeleteFile(record.id));
                }
            }
            batch.push(WriteOp::InsertFile(RoomFile::new(
                *room_id,
                artifact.clone(),
                ArtifactKind::RoomAvatar,
            )));
            batch.guard(WriteGuard::FileBytesAtMost {
                room_id: *room_id,
                max: room.quotas.total_files_bytes_allowed,
            });
        }
        batch.push(WriteOp::AppendRoomAudit(RoomAudit::new(
            *room_id,
            "room.updated",
            json!({ "by": actor.as_str() }),
        )));

        self.commit(batch, uploaded.as_ref()).await?;
        if let Some(old) = replaced_avatar {
            self.uploads.remove_best_effort(&[old.key]).await;
        }
        Ok(self.store.room(room_id).await?)
    }

    /// Update join settings; Admin only
    ///
    /// The welcome-message template must carry the name placeholder and a
    /// configured announce channel must belong to the room.
    pub async fn update_join_settings(
        &self,
        actor: &UserId,
        room_id: &RoomId,
        settings: JoinSettings,
    ) -> Result<Room, EngineError> {
        let mut room = self.store.room(room_id).await?;
        self.require_admin(room_id, actor).await?;

        if !settings.has_placeholder() {
            return Err(EngineError::InvalidJoinMessage);
        }
        if let Some(channel_id) = &settings.announce_channel {
            let channel = self.store.channel(channel_id).await?;
            if channel.room_id != *room_id {
                return Err(EngineError::EntityNotFound);
            }
        }

        room.join_settings = settings;
        room.updated_at = Timestamp::now();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::UpdateRoom(room));
        batch.push(WriteOp::AppendRoomAudit(RoomAudit::new(
            *room_id,
            "room.join_settings_updated",
            json!({ "by": actor.as_str() }),
        )));

        self.commit(batch, None).await?;
        Ok(self.store.room(room_id).await?)
    }

    /// Destroy a room and everything it owns; Admin only
    ///
    /// External artifacts are deleted best-effort after the write commits.
    pub async fn destroy_room(
        &self,
        actor: &UserId,
        room_id: &RoomId,
    ) -> Result<(), EngineError> {
        let room = self.store.room(room_id).await?;
        self.require_admin(room_id, actor).await?;

        let keys: Vec<String> = self
            .store
            .room_files(room_id)
            .await?
            .into_iter()
            .map(|f| f.artifact.key)
            .collect();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::DeleteRoom(*room_id));
        self.commit(batch, None).await?;

        tracing::info!(room = %room_id, name = %room.name, "room destroyed");
        self.uploads.remove_best_effort(&keys).await;
        Ok(())
    }
}
