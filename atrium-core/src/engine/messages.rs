//! Message mutations
//!
//! Posting requires membership in the owning room. Editing and deleting
//! follow the ownership-or-moderator rule: the author, a Moderator, or an
//! Admin of the owning room.

use super::{EngineError, RoomEngine};
use crate::artifact::FilePayload;
use crate::core_room::{
    ArtifactKind, ChannelAudit, ChannelId, ChannelMessage, MessageId, Role, RoomFile, Timestamp,
    UserId,
};
use crate::store::{RoomStore, WriteBatch, WriteGuard, WriteOp};
use serde_json::json;

impl RoomEngine {
    /// Post a message to a channel, optionally carrying an upload
    pub async fn post_message(
        &self,
        actor: &UserId,
        channel_id: &ChannelId,
        body: String,
        upload: Option<FilePayload>,
    ) -> Result<ChannelMessage, EngineError> {
        let channel = self.store.channel(channel_id).await?;
        let room = self.store.room(&channel.room_id).await?;
        self.require_member(&channel.room_id, actor).await?;

        if let Some(payload) = &upload {
            self.check_file_quotas(&room, payload.size()).await?;
        }

        let uploaded = match &upload {
            Some(payload) => Some(self.uploads.upload(payload, &channel.room_id).await?),
            None => None,
        };

        let mut message = ChannelMessage::new(*channel_id, actor.clone(), body);
        message.upload = uploaded.clone();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertMessage(message.clone()));
        if let Some(artifact) = &uploaded {
            batch.push(WriteOp::InsertFile(RoomFile::new(
                channel.room_id,
                artifact.clone(),
                ArtifactKind::MessageUpload,
            )));
            batch.guard(WriteGuard::FileBytesAtMost {
                room_id: channel.room_id,
                max: room.quotas.total_files_bytes_allowed,
            });
        }

        self.commit(batch, uploaded.as_ref()).await?;
        Ok(self.store.message(&message.id).await?)
    }

    /// Edit a message body; author, Moderator or Admin
    pub async fn edit_message(
        &self,
        actor: &UserId,
        message_id: &MessageId,
        body: String,
    ) -> Result<ChannelMessage, EngineError> {
        let mut message = self.store.message(message_id).await?;
        self.require_ownership_or_moderator(actor, &message).await?;

        message.body = body;
        message.updated_at = Timestamp::now();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::UpdateMessage(message.clone()));
        batch.push(WriteOp::AppendChannelAudit(ChannelAudit::new(
            message.channel_id,
            "message.edited",
            json!({ "by": actor.as_str() }),
        )));

        self.commit(batch, None).await?;
        Ok(self.store.message(message_id).await?)
    }

    /// Delete a message; author, Moderator or Admin
    ///
    /// The upload's file record leaves in the same write; the blob follows
    /// best-effort.
    pub async fn destroy_message(
        &self,
        actor: &UserId,
        message_id: &MessageId,
    ) -> Result<(), EngineError> {
        let message = self.store.message(message_id).await?;
        self.require_ownership_or_moderator(actor, &message).await?;
        let channel = self.store.channel(&message.channel_id).await?;

        let mut batch = WriteBatch::new();
        if let Some(upload) = &message.upload {
            if let Some(record) = self.file_record_by_key(&channel.room_id, &upload.key).await? {
                batch.push(WriteOp::DeleteFile(record.id));
            }
        }
        batch.push(WriteOp::DeleteMessage(*message_id));
        batch.push(WriteOp::AppendChannelAudit(ChannelAudit::new(
            message.channel_id,
            "message.deleted",
            json!({ "by": actor.as_str() }),
        )));

        self.commit(batch, None).await?;
        if let Some(upload) = message.upload {
            self.uploads.remove_best_effort(&[upload.key]).await;
        }
        Ok(())
    }

    /// The ownership-or-moderator rule for message mutation
    async fn require_ownership_or_moderator(
        &self,
        actor: &UserId,
        message: &ChannelMessage,
    ) -> Result<(), EngineError> {
        if message.author.user_id() == Some(actor) {
            return Ok(());
        }
        let is_moderator = self
            .is_in_room_by_channel(&message.channel_id, actor, Some(Role::Moderator))
            .await?;
        let is_admin = self
            .is_in_room_by_channel(&message.channel_id, actor, Some(Role::Admin))
            .await?;
        if is_moderator || is_admin {
            Ok(())
        } else {
            metrics::counter!(crate::metrics::AUTHZ_REJECTIONS).increment(1);
            Err(EngineError::OwnershipOrModeratorRequired)
        }
    }
}
