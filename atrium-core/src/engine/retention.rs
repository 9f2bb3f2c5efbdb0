//! Retention sweep
//!
//! Rooms can bound the lifetime of messages and stored files through their
//! quota settings; a day count of zero keeps entities forever. The sweep is
//! driven externally (the harness loops over rooms on a timer) and removes
//! everything older than the cutoff in one write per room.

use super::{EngineError, RoomEngine};
use crate::core_room::{ArtifactKind, RoomAudit, RoomId, Timestamp};
use crate::store::{RoomStore, WriteBatch, WriteOp};
use serde_json::json;

/// What one sweep removed from a room
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub messages_removed: u64,
    pub files_removed: u64,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.messages_removed == 0 && self.files_removed == 0
    }
}

impl RoomEngine {
    /// Remove messages and uploaded files past the room's retention windows
    pub async fn sweep_room(
        &self,
        room_id: &RoomId,
        now: Timestamp,
    ) -> Result<SweepReport, EngineError> {
        let room = self.store.room(room_id).await?;
        let mut report = SweepReport::default();
        let mut batch = WriteBatch::new();
        let mut stale_keys: Vec<String> = Vec::new();

        if room.quotas.message_days_to_live > 0 {
            let cutoff = now.days_earlier(room.quotas.message_days_to_live);
            for channel in self.store.room_channels(room_id).await? {
                for message in self.store.channel_messages(&channel.id).await? {
                    if message.created_at < cutoff {
                        if let Some(upload) = &message.upload {
                            if let Some(record) =
                                self.file_record_by_key(room_id, &upload.key).await?
                            {
                                batch.push(WriteOp::DeleteFile(record.id));
                                stale_keys.push(upload.key.clone());
                                report.files_removed += 1;
                            }
                        }
                        batch.push(WriteOp::DeleteMessage(message.id));
                        report.messages_removed += 1;
                    }
                }
            }
        }

        if room.quotas.file_days_to_live > 0 {
            let cutoff = now.days_earlier(room.quotas.file_days_to_live);
            for file in self.store.room_files(room_id).await? {
                // Avatars stay until their owner replaces or destroys them
                if file.kind == ArtifactKind::MessageUpload
                    && file.created_at < cutoff
                    && !stale_keys.contains(&file.artifact.key)
                {
                    batch.push(WriteOp::DeleteFile(file.id));
                    stale_keys.push(file.artifact.key.clone());
                    report.files_removed += 1;
                }
            }
        }

        if report.is_empty() {
            return Ok(report);
        }

        batch.push(WriteOp::AppendRoomAudit(RoomAudit::new(
            *room_id,
            "room.retention_sweep",
            json!({
                "messages_removed": report.messages_removed,
                "files_removed": report.files_removed,
            }),
        )));

        self.commit(batch, None).await?;
        metrics::counter!(crate::metrics::RETENTION_REMOVALS)
            .increment(report.messages_removed + report.files_removed);
        tracing::info!(
            room = %room_id,
            messages = report.messages_removed,
            files = report.files_removed,
            "retention sweep applied"
        );
        self.uploads.remove_best_effort(&stale_keys).await;
        Ok(report)
    }
}
