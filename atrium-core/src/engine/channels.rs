//! Channel lifecycle mutations
//!
//! All three operations are Admin-only on the owning room. Channel creation
//! is bounded by the room's channel quota, re-checked by a write guard inside
//! the store transaction.

use super::{EngineError, RoomEngine};
use crate::artifact::FilePayload;
use crate::core_room::{
    ArtifactKind, Channel, ChannelAudit, ChannelId, ChannelKind, RoomFile, RoomId, Timestamp,
    UserId,
};
use crate::store::{RoomStore, WriteBatch, WriteGuard, WriteOp};
use serde_json::json;

impl RoomEngine {
    /// Create a channel in a room; Admin only
    pub async fn create_channel(
        &self,
        actor: &UserId,
        room_id: &RoomId,
        name: String,
        kind: ChannelKind,
        avatar: Option<FilePayload>,
    ) -> Result<Channel, EngineError> {
        let room = self.store.room(room_id).await?;
        self.require_admin(room_id, actor).await?;

        if self.channel_count_exceeds_limit(&room, 1).await? {
            return Err(self.quota_rejected(EngineError::ExceedsRoomChannelCount));
        }
        if let Some(payload) = &avatar {
            self.check_file_quotas(&room, payload.size()).await?;
        }

        let uploaded = match &avatar {
            Some(payload) => Some(self.uploads.upload(payload, room_id).await?),
            None => None,
        };

        let mut channel = Channel::new(*room_id, name, kind);
        channel.avatar = uploaded.clone();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertChannel(channel.clone()));
        if let Some(artifact) = &uploaded {
            batch.push(WriteOp::InsertFile(RoomFile::new(
                *room_id,
                artifact.clone(),
                ArtifactKind::ChannelAvatar,
            )));
            batch.guard(WriteGuard::FileBytesAtMost {
                room_id: *room_id,
                max: room.quotas.total_files_bytes_allowed,
            });
        }
        batch.push(WriteOp::AppendChannelAudit(ChannelAudit::new(
            channel.id,
            "channel.created",
            json!({ "by": actor.as_str(), "name": channel.name }),
        )));
        batch.guard(WriteGuard::ChannelCountAtMost {
            room_id: *room_id,
            max: room.quotas.max_channels,
        });

        self.commit(batch, uploaded.as_ref()).await?;
        tracing::info!(room = %room_id, channel = %channel.id, "channel created");
        Ok(self.store.channel(&channel.id).await?)
    }

    /// Rename a channel or replace its avatar; Admin only
    pub async fn update_channel(
        &self,
        actor: &UserId,
        channel_id: &ChannelId,
        name: Option<String>,
        avatar: Option<FilePayload>,
    ) -> Result<Channel, EngineError> {
        let mut channel = self.store.channel(channel_id).await?;
        let room = self.store.room(&channel.room_id).await?;
        self.require_admin(&channel.room_id, actor).await?;

        if let Some(payload) = &avatar {
            self.check_file_quotas(&room, payload.size()).await?;
        }

        let uploaded = match &avatar {
            Some(payload) => Some(self.uploads.upload(payload, &channel.room_id).await?),
            None => None,
        };

        if let Some(name) = name {
            channel.name = name;
        }
        let replaced_avatar = match &uploaded {
            Some(artifact) => channel.avatar.replace(artifact.clone()),
            None => None,
        };
        channel.updated_at = Timestamp::now();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::UpdateChannel(channel.clone()));
        if let Some(artifact) = &uploaded {
            if let Some(old) = &replaced_avatar {
                if let Some(record) = self.file_record_by_key(&channel.room_id, &old.key).await? {
                    batch.push(WriteOp::DeleteFile(record.id));
                }
            }
            batch.push(WriteOp::InsertFile(RoomFile::new(
                channel.room_id,
                artifact.clone(),
                ArtifactKind::ChannelAvatar,
            )));
            batch.guard(WriteGuard::FileBytesAtMost {
                room_id: channel.room_id,
                max: room.quotas.total_files_bytes_allowed,
            });
        }
        batch.push(WriteOp::AppendChannelAudit(ChannelAudit::new(
            *channel_id,
            "channel.updated",
            json!({ "by": actor.as_str() }),
        )));

        self.commit(batch, uploaded.as_ref()).await?;
        if let Some(old) = replaced_avatar {
            self.uploads.remove_best_effort(&[old.key]).await;
        }
        Ok(self.store.channel(channel_id).await?)
    }

    /// Destroy a channel and its messages; Admin only
    ///
    /// File records referenced by the channel's avatar and message uploads
    /// leave in the same write; the blobs follow best-effort.
    pub async fn destroy_channel(
        &self,
        actor: &UserId,
        channel_id: &ChannelId,
    ) -> Result<(), EngineError> {
        let channel = self.store.channel(channel_id).await?;
        self.require_admin(&channel.room_id, actor).await?;

        let mut keys: Vec<String> = Vec::new();
        if let Some(avatar) = &channel.avatar {
            keys.push(avatar.key.clone());
        }
        for message in self.store.channel_messages(channel_id).await? {
            if let Some(upload) = message.upload {
                keys.push(upload.key);
            }
        }

        let mut batch = WriteBatch::new();
        for key in &keys {
            if let Some(record) = self.file_record_by_key(&channel.room_id, key).await? {
                batch.push(WriteOp::DeleteFile(record.id));
            }
        }
        batch.push(WriteOp::DeleteChannel(*channel_id));
        self.commit(batch, None).await?;

        tracing::info!(room = %channel.room_id, channel = %channel_id, "channel destroyed");
        self.uploads.remove_best_effort(&keys).await;
        Ok(())
    }

    pub(super) async fn file_record_by_key(
        &self,
        room_id: &RoomId,
        key: &str,
    ) -> Result<Option<RoomFile>, EngineError> {
        Ok(self
            .store
            .room_files(room_id)
            .await?
            .into_iter()
            .find(|f| f.artifact.key == key))
    }
}
