//! In-memory store adapter
//!
//! Entities live in hash maps behind one async lock. A batch is applied to a
//! copy of the state and the copy is swapped in only when every op and guard
//! succeeds, so atomicity falls out of the data structure.

use super::{Metric, RoomStore, StoreError, WriteBatch, WriteGuard, WriteOp};
use crate::core_room::{
    Channel, ChannelAudit, ChannelId, ChannelKind, ChannelMessage, FileId, InviteId, MessageId,
    Role, Room, RoomAudit, RoomFile, RoomId, RoomInviteLink, RoomMember, UserId,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Non-persistent adapter for tests and the harness
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default, Clone)]
struct Inner {
    rooms: HashMap<RoomId, Room>,
    members: HashMap<(RoomId, UserId), RoomMember>,
    channels: HashMap<ChannelId, Channel>,
    messages: HashMap<MessageId, ChannelMessage>,
    invites: HashMap<InviteId, RoomInviteLink>,
    files: HashMap<FileId, RoomFile>,
    room_audits: Vec<RoomAudit>,
    channel_audits: Vec<ChannelAudit>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn room_name_taken(&self, name: &str, exclude: Option<&RoomId>) -> bool {
        self.rooms
            .values()
            .any(|r| r.name == name && Some(&r.id) != exclude)
    }

    fn channel_name_taken(
        &self,
        room_id: &RoomId,
        kind: ChannelKind,
        name: &str,
        exclude: Option<&ChannelId>,
    ) -> bool {
        self.channels.values().any(|c| {
            c.room_id == *room_id && c.kind == kind && c.name == name && Some(&c.id) != exclude
        })
    }

    fn delete_channel_cascade(&mut self, channel_id: &ChannelId) {
        self.messages.retain(|_, m| m.channel_id != *channel_id);
        self.channel_audits.retain(|a| a.channel_id != *channel_id);
        self.channels.remove(channel_id);
    }

    fn delete_room_cascade(&mut self, room_id: &RoomId) {
        let channel_ids: Vec<ChannelId> = self
            .channels
            .values()
            .filter(|c| c.room_id == *room_id)
            .map(|c| c.id)
            .collect();
        for channel_id in &channel_ids {
            self.delete_channel_cascade(channel_id);
        }
        self.members.retain(|(r, _), _| r != room_id);
        self.invites.retain(|_, i| i.room_id != *room_id);
        self.files.retain(|_, f| f.room_id != *room_id);
        self.room_audits.retain(|a| a.room_id != *room_id);
        self.rooms.remove(room_id);
    }

    fn apply(&mut self, op: WriteOp) -> Result<(), StoreError> {
        match op {
            WriteOp::InsertRoom(room) => {
                if self.room_name_taken(&room.name, None) {
                    return Err(StoreError::UniqueViolation {
                        field: "room_name".to_string(),
                        value: room.name,
                    });
                }
                self.rooms.insert(room.id, room);
                Ok(())
            }
            WriteOp::UpdateRoom(room) => {
                if !self.rooms.contains_key(&room.id) {
                    return Err(StoreError::NotFound);
                }
                if self.room_name_taken(&room.name, Some(&room.id)) {
                    return Err(StoreError::UniqueViolation {
                        field: "room_name".to_string(),
                        value: room.name,
                    });
                }
                self.rooms.insert(room.id, room);
                Ok(())
            }
            WriteOp::DeleteRoom(room_id) => {
                if !self.rooms.contains_key(&room_id) {
                    return Err(StoreError::NotFound);
                }
                self.delete_room_cascade(&room_id);
                Ok(())
            }
            WriteOp::InsertMember(member) => {
                if !self.rooms.contains_key(&member.room_id) {
                    return Err(StoreError::FkViolation {
                        field: "room_id".to_string(),
                    });
                }
                let key = (member.room_id, member.user_id.clone());
                if self.members.contains_key(&key) {
                    return Err(StoreError::UniqueViolation {
                        field: "room_user".to_string(),
                        value: member.user_id.to_string(),
                    });
                }
                self.members.insert(key, member);
                Ok(())
            }
            WriteOp::UpdateMemberRole {
                room_id,
                user_id,
                role,
            } => {
                let member = self
                    .members
                    .get_mut(&(room_id, user_id))
                    .ok_or(StoreError::NotFound)?;
                member.role = role;
                Ok(())
            }
            WriteOp::DeleteMember { room_id, user_id } => self
                .members
                .remove(&(room_id, user_id))
                .map(|_| ())
                .ok_or(StoreError::NotFound),
            WriteOp::InsertChannel(channel) => {
                if !self.rooms.contains_key(&channel.room_id) {
                    return Err(StoreError::FkViolation {
                        field: "room_id".to_string(),
                    });
                }
                if self.channel_name_taken(&channel.room_id, channel.kind, &channel.name, None) {
                    return Err(StoreError::UniqueViolation {
                        field: "channel_name".to_string(),
                        value: channel.name,
                    });
                }
                self.channels.insert(channel.id, channel);
                Ok(())
            }
            WriteOp::UpdateChannel(channel) => {
                if !self.channels.contains_key(&channel.id) {
                    return Err(StoreError::NotFound);
                }
                if self.channel_name_taken(
                    &channel.room_id,
                    channel.kind,
                    &channel.name,
                    Some(&channel.id),
                ) {
                    return Err(StoreError::UniqueViolation {
                        field: "channel_name".to_string(),
                        value: channel.name,
                    });
                }
                self.channels.insert(channel.id, channel);
                Ok(())
            }
            WriteOp::DeleteChannel(channel_id) => {
                if !self.channels.contains_key(&channel_id) {
                    return Err(StoreError::NotFound);
                }
                self.delete_channel_cascade(&channel_id);
                Ok(())
            }
            WriteOp::InsertMessage(message) => {
                if !self.channels.contains_key(&message.channel_id) {
                    return Err(StoreError::FkViolation {
                        field: "channel_id".to_string(),
                    });
                }
                self.messages.insert(message.id, message);
                Ok(())
            }
            WriteOp::UpdateMessage(message) => {
                if !self.messages.contains_key(&message.id) {
                    return Err(StoreError::NotFound);
                }
                self.messages.insert(message.id, message);
                Ok(())
            }
            WriteOp::DeleteMessage(message_id) => self
                .messages
                .remove(&message_id)
                .map(|_| ())
                .ok_or(StoreError::NotFound),
            WriteOp::InsertInvite(invite) => {
                if !self.rooms.contains_key(&invite.room_id) {
                    return Err(StoreError::FkViolation {
                        field: "room_id".to_string(),
                    });
                }
                if self.invites.values().any(|i| i.code == invite.code) {
                    return Err(StoreError::UniqueViolation {
                        field: "invite_code".to_string(),
                        value: invite.code,
                    });
                }
                self.invites.insert(invite.id, invite);
                Ok(())
            }
            WriteOp::UpdateInvite(invite) => {
                if !self.invites.contains_key(&invite.id) {
                    return Err(StoreError::NotFound);
                }
                self.invites.insert(invite.id, invite);
                Ok(())
            }
            WriteOp::DeleteInvite(invite_id) => self
                .invites
                .remove(&invite_id)
                .map(|_| ())
                .ok_or(StoreError::NotFound),
            WriteOp::InsertFile(file) => {
                if !self.rooms.contains_key(&file.room_id) {
                    return Err(StoreError::FkViolation {
                        field: "room_id".to_string(),
                    });
                }
                self.files.insert(file.id, file);
                Ok(())
            }
            WriteOp::DeleteFile(file_id) => self
                .files
                .remove(&file_id)
                .map(|_| ())
                .ok_or(StoreError::NotFound),
            WriteOp::AppendRoomAudit(audit) => {
                if !self.rooms.contains_key(&audit.room_id) {
                    return Err(StoreError::FkViolation {
                        field: "room_id".to_string(),
                    });
                }
                self.room_audits.push(audit);
                Ok(())
            }
            WriteOp::AppendChannelAudit(audit) => {
                if !self.channels.contains_key(&audit.channel_id) {
                    return Err(StoreError::FkViolation {
                        field: "channel_id".to_string(),
                    });
                }
                self.channel_audits.push(audit);
                Ok(())
            }
        }
    }

    fn metric(&self, room_id: &RoomId, metric: Metric) -> u64 {
        match metric {
            Metric::MemberCount => self
                .members
                .keys()
                .filter(|(r, _)| r == room_id)
                .count() as u64,
            Metric::AdminCount => self
                .members
                .iter()
                .filter(|((r, _), m)| r == room_id && m.role == Role::Admin)
                .count() as u64,
            Metric::ChannelCount => self
                .channels
                .values()
                .filter(|c| c.room_id == *room_id)
                .count() as u64,
            Metric::FileBytesTotal => self
                .files
                .values()
                .filter(|f| f.room_id == *room_id)
                .map(|f| f.artifact.bytes)
                .sum(),
        }
    }

    fn check_guard(&self, guard: &WriteGuard) -> Result<(), StoreError> {
        let ok = match guard {
            WriteGuard::MemberCountAtMost { room_id, max } => {
                self.metric(room_id, Metric::MemberCount) <= *max
            }
            WriteGuard::ChannelCountAtMost { room_id, max } => {
                self.metric(room_id, Metric::ChannelCount) <= *max
            }
            WriteGuard::FileBytesAtMost { room_id, max } => {
                self.metric(room_id, Metric::FileBytesTotal) <= *max
            }
            WriteGuard::AdminCountAtLeast { room_id, min } => {
                self.metric(room_id, Metric::AdminCount) >= *min
            }
        };
        if ok {
            Ok(())
        } else {
            Err(StoreError::GuardViolated(*guard))
        }
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn room(&self, id: &RoomId) -> Result<Room, StoreError> {
        let inner = self.inner.read().await;
        inner.rooms.get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn channel(&self, id: &ChannelId) -> Result<Channel, StoreError> {
        let inner = self.inner.read().await;
        inner.channels.get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn message(&self, id: &MessageId) -> Result<ChannelMessage, StoreError> {
        let inner = self.inner.read().await;
        inner.messages.get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn invite(&self, id: &InviteId) -> Result<RoomInviteLink, StoreError> {
        let inner = self.inner.read().await;
        inner.invites.get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn invite_by_code(&self, code: &str) -> Result<RoomInviteLink, StoreError> {
        let inner = self.inner.read().await;
        inner
            .invites
            .values()
            .find(|i| i.code == code)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn file(&self, id: &FileId) -> Result<RoomFile, StoreError> {
        let inner = self.inner.read().await;
        inner.files.get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn membership(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<Option<RoomMember>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.members.get(&(*room_id, user_id.clone())).cloned())
    }

    async fn room_members(&self, room_id: &RoomId) -> Result<Vec<RoomMember>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .members
            .values()
            .filter(|m| m.room_id == *room_id)
            .cloned()
            .collect())
    }

    async fn room_channels(&self, room_id: &RoomId) -> Result<Vec<Channel>, StoreError> {
        let inner = self.inner.read().await;
        let mut channels: Vec<Channel> = inner
            .channels
            .values()
            .filter(|c| c.room_id == *room_id)
            .cloned()
            .collect();
        channels.sort_by_key(|c| c.created_at);
        Ok(channels)
    }

    async fn channel_messages(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Vec<ChannelMessage>, StoreError> {
        let inner = self.inner.read().await;
        let mut messages: Vec<ChannelMessage> = inner
            .messages
            .values()
            .filter(|m| m.channel_id == *channel_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn room_files(&self, room_id: &RoomId) -> Result<Vec<RoomFile>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .files
            .values()
            .filter(|f| f.room_id == *room_id)
            .cloned()
            .collect())
    }

    async fn room_invites(&self, room_id: &RoomId) -> Result<Vec<RoomInviteLink>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .invites
            .values()
            .filter(|i| i.room_id == *room_id)
            .cloned()
            .collect())
    }

    async fn aggregate(&self, room_id: &RoomId, metric: Metric) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.metric(room_id, metric))
    }

    async fn write_atomic(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        // Apply to a copy; swap in only when everything holds.
        let mut candidate = inner.clone();
        for op in batch.ops {
            candidate.apply(op)?;
        }
        for guard in &batch.guards {
            candidate.check_guard(guard)?;
        }

        *inner = candidate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_room::{ArtifactKind, ArtifactRef, RoomQuotas};

    fn test_room(name: &str) -> Room {
        Room::new(name.to_string(), "general".to_string(), RoomQuotas::default())
    }

    #[tokio::test]
    async fn test_insert_and_read_room() {
        let store = MemoryStore::new();
        let room = test_room("alpha");
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(room.clone()));
        store.write_atomic(batch).await.unwrap();

        let read = store.room(&room.id).await.unwrap();
        assert_eq!(read.name, "alpha");
    }

    #[tokio::test]
    async fn test_room_name_unique() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(test_room("alpha")));
        store.write_atomic(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(test_room("alpha")));
        let err = store.write_atomic(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { ref field, .. } if field == "room_name"));
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_state_unchanged() {
        let store = MemoryStore::new();
        let room = test_room("alpha");
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(room.clone()));
        store.write_atomic(batch).await.unwrap();

        // Second op fails: duplicate membership
        let member = RoomMember::new(room.id, UserId::new("bob"), Role::Member);
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertMember(member.clone()));
        batch.push(WriteOp::InsertMember(member));
        assert!(store.write_atomic(batch).await.is_err());

        // Nothing from the failed batch is visible
        assert!(store
            .membership(&room.id, &UserId::new("bob"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_guard_violation_rolls_back() {
        let store = MemoryStore::new();
        let room = test_room("alpha");
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(room.clone()));
        store.write_atomic(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertChannel(Channel::new(
            room.id,
            "general".to_string(),
            ChannelKind::Text,
        )));
        batch.guard(WriteGuard::ChannelCountAtMost {
            room_id: room.id,
            max: 0,
        });
        let err = store.write_atomic(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::GuardViolated(_)));
        assert_eq!(
            store.aggregate(&room.id, Metric::ChannelCount).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_file_bytes_guard_rolls_back_insert() {
        let store = MemoryStore::new();
        let room = test_room("alpha");
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(room.clone()));
        store.write_atomic(batch).await.unwrap();

        let file = RoomFile::new(
            room.id,
            ArtifactRef {
                url: "mem://big".to_string(),
                key: "big".to_string(),
                bytes: 60,
            },
            ArtifactKind::RoomAvatar,
        );
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertFile(file));
        batch.guard(WriteGuard::FileBytesAtMost {
            room_id: room.id,
            max: 50,
        });
        let err = store.write_atomic(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::GuardViolated(_)));
        assert_eq!(
            store
                .aggregate(&room.id, Metric::FileBytesTotal)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_room_delete_cascades() {
        let store = MemoryStore::new();
        let room = test_room("alpha");
        let channel = Channel::new(room.id, "general".to_string(), ChannelKind::Text);
        let message =
            ChannelMessage::new(channel.id, UserId::new("alice"), "hi".to_string());
        let file = RoomFile::new(
            room.id,
            ArtifactRef {
                url: "mem://k".to_string(),
                key: "k".to_string(),
                bytes: 10,
            },
            ArtifactKind::MessageUpload,
        );

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(room.clone()));
        batch.push(WriteOp::InsertMember(RoomMember::new(
            room.id,
            UserId::new("alice"),
            Role::Admin,
        )));
        batch.push(WriteOp::InsertChannel(channel.clone()));
        batch.push(WriteOp::InsertMessage(message.clone()));
        batch.push(WriteOp::InsertFile(file.clone()));
        store.write_atomic(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::DeleteRoom(room.id));
        store.write_atomic(batch).await.unwrap();

        assert!(matches!(store.room(&room.id).await, Err(StoreError::NotFound)));
        assert!(matches!(store.channel(&channel.id).await, Err(StoreError::NotFound)));
        assert!(matches!(store.message(&message.id).await, Err(StoreError::NotFound)));
        assert!(matches!(store.file(&file.id).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_aggregates() {
        let store = MemoryStore::new();
        let room = test_room("alpha");
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(room.clone()));
        batch.push(WriteOp::InsertMember(RoomMember::new(
            room.id,
            UserId::new("alice"),
            Role::Admin,
        )));
        batch.push(WriteOp::InsertMember(RoomMember::new(
            room.id,
            UserId::new("bob"),
            Role::Member,
        )));
        batch.push(WriteOp::InsertFile(RoomFile::new(
            room.id,
            ArtifactRef {
                url: "mem://a".to_string(),
                key: "a".to_string(),
                bytes: 100,
            },
            ArtifactKind::RoomAvatar,
        )));
        batch.push(WriteOp::InsertFile(RoomFile::new(
            room.id,
            ArtifactRef {
                url: "mem://b".to_string(),
                key: "b".to_string(),
                bytes: 50,
            },
            ArtifactKind::MessageUpload,
        )));
        store.write_atomic(batch).await.unwrap();

        assert_eq!(store.aggregate(&room.id, Metric::MemberCount).await.unwrap(), 2);
        assert_eq!(store.aggregate(&room.id, Metric::AdminCount).await.unwrap(), 1);
        assert_eq!(
            store.aggregate(&room.id, Metric::FileBytesTotal).await.unwrap(),
            150
        );
    }

    #[tokio::test]
    async fn test_invite_lookup_by_code() {
        let store = MemoryStore::new();
        let room = test_room("alpha");
        let invite = RoomInviteLink::new(room.id, UserId::new("alice"), None);
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(room.clone()));
        batch.push(WriteOp::InsertInvite(invite.clone()));
        store.write_atomic(batch).await.unwrap();

        let found = store.invite_by_code(&invite.code).await.unwrap();
        assert_eq!(found.id, invite.id);
        assert!(matches!(
            store.invite_by_code("NOSUCHCODE").await,
            Err(StoreError::NotFound)
        ));
    }
}
