//! Document store adapter over SQLite
//!
//! One JSON document per room holds the whole aggregate: the room record plus
//! its members, channels, messages, invites, files and audit trail. A write
//! batch becomes a read-modify-write of the affected documents inside one
//! SQLite transaction. Small side tables index entity ids, room names and
//! invite codes so point lookups and cross-room uniqueness stay cheap.

use super::{Metric, RoomStore, StoreError, WriteBatch, WriteGuard, WriteOp};
use crate::core_room::{
    Channel, ChannelAudit, ChannelId, ChannelKind, ChannelMessage, FileId, InviteId, MessageId,
    Role, Room, RoomAudit, RoomFile, RoomId, RoomInviteLink, RoomMember, UserId,
};
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::path::Path;

const BOOTSTRAP_SQL: &str = "
CREATE TABLE IF NOT EXISTS room_docs (
    room_id BLOB PRIMARY KEY,
    doc TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS room_names (
    name TEXT PRIMARY KEY,
    room_id BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS invite_codes (
    code TEXT PRIMARY KEY,
    room_id BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS doc_index (
    entity_id BLOB PRIMARY KEY,
    room_id BLOB NOT NULL
);
";

/// SQLite-backed document adapter
pub struct DocStore {
    pool: Pool<SqliteConnectionManager>,
}

/// The per-room aggregate as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RoomDoc {
    room: Room,
    members: Vec<RoomMember>,
    channels: Vec<Channel>,
    messages: Vec<ChannelMessage>,
    invites: Vec<RoomInviteLink>,
    files: Vec<RoomFile>,
    room_audits: Vec<RoomAudit>,
    channel_audits: Vec<ChannelAudit>,
}

impl RoomDoc {
    fn new(room: Room) -> Self {
        RoomDoc {
            room,
            members: Vec::new(),
            channels: Vec::new(),
            messages: Vec::new(),
            invites: Vec::new(),
            files: Vec::new(),
            room_audits: Vec::new(),
            channel_audits: Vec::new(),
        }
    }

    fn channel_name_taken(&self, kind: ChannelKind, name: &str, exclude: Option<&ChannelId>) -> bool {
        self.channels
            .iter()
            .any(|c| c.kind == kind && c.name == name && Some(&c.id) != exclude)
    }

    fn metric(&self, metric: Metric) -> u64 {
        match metric {
            Metric::MemberCount => self.members.len() as u64,
            Metric::AdminCount => self
                .members
                .iter()
                .filter(|m| m.role == Role::Admin)
                .count() as u64,
            Metric::ChannelCount => self.channels.len() as u64,
            Metric::FileBytesTotal => self.files.iter().map(|f| f.artifact.bytes).sum(),
        }
    }
}

impl DocStore {
    /// Create a store over an existing connection pool
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Result<Self, StoreError> {
        let conn = pool
            .get()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        conn.execute_batch(BOOTSTRAP_SQL)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        drop(conn);
        Ok(Self { pool })
    }

    /// Open (or create) a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::new(manager).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::new(pool)
    }

    /// Create a new in-memory store
    pub fn memory() -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::memory();
        // A single connection so every handle sees the same in-memory database
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::new(pool)
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, StoreError> {
        self.pool
            .get()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn load_doc(conn: &Connection, room_id: &RoomId) -> Result<RoomDoc, StoreError> {
        let text: Option<String> = conn
            .query_row(
                "SELECT doc FROM room_docs WHERE room_id = ?1",
                params![room_id.as_bytes().to_vec()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let text = text.ok_or(StoreError::NotFound)?;
        serde_json::from_str(&text).map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// Resolve a non-room entity id to the room whose document holds it
    fn room_of_entity(conn: &Connection, entity_id: &[u8; 32]) -> Result<RoomId, StoreError> {
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT room_id FROM doc_index WHERE entity_id = ?1",
                params![entity_id.to_vec()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let blob = blob.ok_or(StoreError::NotFound)?;
        if blob.len() != 32 {
            return Err(StoreError::Unavailable("corrupt doc index".to_string()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&blob);
        Ok(RoomId::from(arr))
    }

    fn doc_of_entity(conn: &Connection, entity_id: &[u8; 32]) -> Result<RoomDoc, StoreError> {
        let room_id = Self::room_of_entity(conn, entity_id)?;
        Self::load_doc(conn, &room_id)
    }
}

/// Working set of documents touched by one batch
#[derive(Default)]
struct BatchState {
    docs: HashMap<RoomId, RoomDoc>,
    deleted: HashSet<RoomId>,
}

impl BatchState {
    /// Bring a room's document into the working set, loading it on first touch
    fn doc_mut<'a>(
        &'a mut self,
        tx: &Transaction<'_>,
        room_id: &RoomId,
    ) -> Result<&'a mut RoomDoc, StoreError> {
        if self.deleted.contains(room_id) {
            return Err(StoreError::NotFound);
        }
        match self.docs.entry(*room_id) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => Ok(e.insert(DocStore::load_doc(tx, room_id)?)),
        }
    }

    /// Like `doc_mut` but reports a missing parent as an FK failure
    fn parent_doc_mut<'a>(
        &'a mut self,
        tx: &Transaction<'_>,
        room_id: &RoomId,
        fk_field: &str,
    ) -> Result<&'a mut RoomDoc, StoreError> {
        self.doc_mut(tx, room_id).map_err(|e| match e {
            StoreError::NotFound => StoreError::FkViolation {
                field: fk_field.to_string(),
            },
            other => other,
        })
    }

    /// Resolve an entity id through the working set first, then the index
    fn resolve(
        &mut self,
        tx: &Transaction<'_>,
        entity_id: &[u8; 32],
        find: impl Fn(&RoomDoc) -> bool,
    ) -> Result<RoomId, StoreError> {
        for (room_id, doc) in &self.docs {
            if find(doc) {
                return Ok(*room_id);
            }
        }
        let room_id = DocStore::room_of_entity(tx, entity_id)?;
        if self.deleted.contains(&room_id) {
            return Err(StoreError::NotFound);
        }
        Ok(room_id)
    }

    fn apply(&mut self, tx: &Transaction<'_>, op: WriteOp) -> Result<(), StoreError> {
        match op {
            WriteOp::InsertRoom(room) => {
                let id = room.id;
                self.deleted.remove(&id);
                self.docs.insert(id, RoomDoc::new(room));
                Ok(())
            }
            WriteOp::UpdateRoom(room) => {
                let doc = self.doc_mut(tx, &room.id)?;
                doc.room = room;
                Ok(())
            }
            WriteOp::DeleteRoom(room_id) => {
                // Touch the doc so absence surfaces as NotFound
                self.doc_mut(tx, &room_id)?;
                self.docs.remove(&room_id);
                self.deleted.insert(room_id);
                Ok(())
            }
            WriteOp::InsertMember(member) => {
                let doc = self.parent_doc_mut(tx, &member.room_id, "room_id")?;
                if doc.members.iter().any(|m| m.user_id == member.user_id) {
                    return Err(StoreError::UniqueViolation {
                        field: "room_user".to_string(),
                        value: member.user_id.to_string(),
                    });
                }
                doc.members.push(member);
                Ok(())
            }
            WriteOp::UpdateMemberRole {
                room_id,
                user_id,
                role,
            } => {
                let doc = self.doc_mut(tx, &room_id)?;
                let member = doc
                    .members
                    .iter_mut()
                    .find(|m| m.user_id == user_id)
                    .ok_or(StoreError::NotFound)?;
                member.role = role;
                Ok(())
            }
            WriteOp::DeleteMember { room_id, user_id } => {
                let doc = self.doc_mut(tx, &room_id)?;
                let before = doc.members.len();
                doc.members.retain(|m| m.user_id != user_id);
                if doc.members.len() == before {
                    return Err(StoreError::NotFound);
                }
                Ok(())
            }
            WriteOp::InsertChannel(channel) => {
                let doc = self.parent_doc_mut(tx, &channel.room_id, "room_id")?;
                if doc.channel_name_taken(channel.kind, &channel.name, None) {
                    return Err(StoreError::UniqueViolation {
                        field: "channel_name".to_string(),
                        value: channel.name,
                    });
                }
                doc.channels.push(channel);
                Ok(())
            }
            WriteOp::UpdateChannel(channel) => {
                let doc = self.doc_mut(tx, &channel.room_id)?;
                if doc.channel_name_taken(channel.kind, &channel.name, Some(&channel.id)) {
                    return Err(StoreError::UniqueViolation {
                        field: "channel_name".to_string(),
                        value: channel.name,
                    });
                }
                let slot = doc
                    .channels
                    .iter_mut()
                    .find(|c| c.id == channel.id)
                    .ok_or(StoreError::NotFound)?;
                *slot = channel;
                Ok(())
            }
            WriteOp::DeleteChannel(channel_id) => {
                let room_id = self.resolve(tx, channel_id.as_bytes(), |d| {
                    d.channels.iter().any(|c| c.id == channel_id)
                })?;
                let doc = self.doc_mut(tx, &room_id)?;
                let before = doc.channels.len();
                doc.channels.retain(|c| c.id != channel_id);
                if doc.channels.len() == before {
                    return Err(StoreError::NotFound);
                }
                doc.messages.retain(|m| m.channel_id != channel_id);
                doc.channel_audits.retain(|a| a.channel_id != channel_id);
                Ok(())
            }
            WriteOp::InsertMessage(message) => {
                let room_id = self
                    .resolve(tx, message.channel_id.as_bytes(), |d| {
                        d.channels.iter().any(|c| c.id == message.channel_id)
                    })
                    .map_err(|e| match e {
                        StoreError::NotFound => StoreError::FkViolation {
                            field: "channel_id".to_string(),
                        },
                        other => other,
                    })?;
                let doc = self.doc_mut(tx, &room_id)?;
                doc.messages.push(message);
                Ok(())
            }
            WriteOp::UpdateMessage(message) => {
                let room_id = self.resolve(tx, message.id.as_bytes(), |d| {
                    d.messages.iter().any(|m| m.id == message.id)
                })?;
                let doc = self.doc_mut(tx, &room_id)?;
                let slot = doc
                    .messages
                    .iter_mut()
                    .find(|m| m.id == message.id)
                    .ok_or(StoreError::NotFound)?;
                *slot = message;
                Ok(())
            }
            WriteOp::DeleteMessage(message_id) => {
                let room_id = self.resolve(tx, message_id.as_bytes(), |d| {
                    d.messages.iter().any(|m| m.id == message_id)
                })?;
                let doc = self.doc_mut(tx, &room_id)?;
                let before = doc.messages.len();
                doc.messages.retain(|m| m.id != message_id);
                if doc.messages.len() == before {
                    return Err(StoreError::NotFound);
                }
                Ok(())
            }
            WriteOp::InsertInvite(invite) => {
                let doc = self.parent_doc_mut(tx, &invite.room_id, "room_id")?;
                doc.invites.push(invite);
                Ok(())
            }
            WriteOp::UpdateInvite(invite) => {
                let doc = self.doc_mut(tx, &invite.room_id)?;
                let slot = doc
                    .invites
                    .iter_mut()
                    .find(|i| i.id == invite.id)
                    .ok_or(StoreError::NotFound)?;
                *slot = invite;
                Ok(())
            }
            WriteOp::DeleteInvite(invite_id) => {
                let room_id = self.resolve(tx, invite_id.as_bytes(), |d| {
                    d.invites.iter().any(|i| i.id == invite_id)
                })?;
                let doc = self.doc_mut(tx, &room_id)?;
                let before = doc.invites.len();
                doc.invites.retain(|i| i.id != invite_id);
                if doc.invites.len() == before {
                    return Err(StoreError::NotFound);
                }
                Ok(())
            }
            WriteOp::InsertFile(file) => {
                let doc = self.parent_doc_mut(tx, &file.room_id, "room_id")?;
                doc.files.push(file);
                Ok(())
            }
            WriteOp::DeleteFile(file_id) => {
                let room_id = self.resolve(tx, file_id.as_bytes(), |d| {
                    d.files.iter().any(|f| f.id == file_id)
                })?;
                let doc = self.doc_mut(tx, &room_id)?;
                let before = doc.files.len();
                doc.files.retain(|f| f.id != file_id);
                if doc.files.len() == before {
                    return Err(StoreError::NotFound);
                }
                Ok(())
            }
            WriteOp::AppendRoomAudit(audit) => {
                let doc = self.parent_doc_mut(tx, &audit.room_id, "room_id")?;
                doc.room_audits.push(audit);
                Ok(())
            }
            WriteOp::AppendChannelAudit(audit) => {
                let room_id = self
                    .resolve(tx, audit.channel_id.as_bytes(), |d| {
                        d.channels.iter().any(|c| c.id == audit.channel_id)
                    })
                    .map_err(|e| match e {
                        StoreError::NotFound => StoreError::FkViolation {
                            field: "channel_id".to_string(),
                        },
                        other => other,
                    })?;
                let doc = self.doc_mut(tx, &room_id)?;
                doc.channel_audits.push(audit);
                Ok(())
            }
        }
    }

    fn check_guard(&mut self, tx: &Transaction<'_>, guard: &WriteGuard) -> Result<(), StoreError> {
        let ok = match guard {
            WriteGuard::MemberCountAtMost { room_id, max } => {
                self.doc_mut(tx, room_id)?.metric(Metric::MemberCount) <= *max
            }
            WriteGuard::ChannelCountAtMost { room_id, max } => {
                self.doc_mut(tx, room_id)?.metric(Metric::ChannelCount) <= *max
            }
            WriteGuard::FileBytesAtMost { room_id, max } => {
                self.doc_mut(tx, room_id)?.metric(Metric::FileBytesTotal) <= *max
            }
            WriteGuard::AdminCountAtLeast { room_id, min } => {
                self.doc_mut(tx, room_id)?.metric(Metric::AdminCount) >= *min
            }
        };
        if ok {
            Ok(())
        } else {
            Err(StoreError::GuardViolated(*guard))
        }
    }

    /// Flush the working set back to the tables
    fn write_back(self, tx: &Transaction<'_>) -> Result<(), StoreError> {
        let unavailable = |e: rusqlite::Error| StoreError::Unavailable(e.to_string());

        let touched: Vec<RoomId> = self
            .deleted
            .iter()
            .chain(self.docs.keys())
            .copied()
            .collect();
        // Clear index rows first so renames within the batch cannot
        // self-collide
        for room_id in &touched {
            let blob = room_id.as_bytes().to_vec();
            tx.execute("DELETE FROM room_names WHERE room_id = ?1", params![blob])
                .map_err(unavailable)?;
            tx.execute("DELETE FROM invite_codes WHERE room_id = ?1", params![blob])
                .map_err(unavailable)?;
            tx.execute("DELETE FROM doc_index WHERE room_id = ?1", params![blob])
                .map_err(unavailable)?;
        }
        for room_id in &self.deleted {
            tx.execute(
                "DELETE FROM room_docs WHERE room_id = ?1",
                params![room_id.as_bytes().to_vec()],
            )
            .map_err(unavailable)?;
        }

        for (room_id, doc) in &self.docs {
            let blob = room_id.as_bytes().to_vec();
            let text =
                serde_json::to_string(doc).map_err(|e| StoreError::Unavailable(e.to_string()))?;
            tx.execute(
                "INSERT INTO room_docs (room_id, doc) VALUES (?1, ?2)
                 ON CONFLICT(room_id) DO UPDATE SET doc = excluded.doc",
                params![blob, text],
            )
            .map_err(unavailable)?;

            // Primary keys on these tables enforce cross-room uniqueness
            tx.execute(
                "INSERT INTO room_names (name, room_id) VALUES (?1, ?2)",
                params![doc.room.name, blob],
            )
            .map_err(|e| map_index_error(e, &doc.room.name))?;
            for invite in &doc.invites {
                tx.execute(
                    "INSERT INTO invite_codes (code, room_id) VALUES (?1, ?2)",
                    params![invite.code, blob],
                )
                .map_err(|e| map_index_error(e, &invite.code))?;
            }

            let mut index = tx
                .prepare("INSERT INTO doc_index (entity_id, room_id) VALUES (?1, ?2)")
                .map_err(unavailable)?;
            for channel in &doc.channels {
                index
                    .execute(params![channel.id.as_bytes().to_vec(), blob])
                    .map_err(unavailable)?;
            }
            for message in &doc.messages {
                index
                    .execute(params![message.id.as_bytes().to_vec(), blob])
                    .map_err(unavailable)?;
            }
            for invite in &doc.invites {
                index
                    .execute(params![invite.id.as_bytes().to_vec(), blob])
                    .map_err(unavailable)?;
            }
            for file in &doc.files {
                index
                    .execute(params![file.id.as_bytes().to_vec(), blob])
                    .map_err(unavailable)?;
            }
        }
        Ok(())
    }
}

fn map_index_error(e: rusqlite::Error, value: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref err, Some(ref msg)) = e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            if msg.contains("room_names.name") {
                return StoreError::UniqueViolation {
                    field: "room_name".to_string(),
                    value: value.to_string(),
                };
            }
            if msg.contains("invite_codes.code") {
                return StoreError::UniqueViolation {
                    field: "invite_code".to_string(),
                    value: value.to_string(),
                };
            }
        }
    }
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl RoomStore for DocStore {
    async fn room(&self, id: &RoomId) -> Result<Room, StoreError> {
        let conn = self.conn()?;
        Ok(Self::load_doc(&conn, id)?.room)
    }

    async fn channel(&self, id: &ChannelId) -> Result<Channel, StoreError> {
        let conn = self.conn()?;
        let doc = Self::doc_of_entity(&conn, id.as_bytes())?;
        doc.channels
            .into_iter()
            .find(|c| c.id == *id)
            .ok_or(StoreError::NotFound)
    }

    async fn message(&self, id: &MessageId) -> Result<ChannelMessage, StoreError> {
        let conn = self.conn()?;
        let doc = Self::doc_of_entity(&conn, id.as_bytes())?;
        doc.messages
            .into_iter()
            .find(|m| m.id == *id)
            .ok_or(StoreError::NotFound)
    }

    async fn invite(&self, id: &InviteId) -> Result<RoomInviteLink, StoreError> {
        let conn = self.conn()?;
        let doc = Self::doc_of_entity(&conn, id.as_bytes())?;
        doc.invites
            .into_iter()
            .find(|i| i.id == *id)
            .ok_or(StoreError::NotFound)
    }

    async fn invite_by_code(&self, code: &str) -> Result<RoomInviteLink, StoreError> {
        let conn = self.conn()?;
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT room_id FROM invite_codes WHERE code = ?1",
                params![code],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let blob = blob.ok_or(StoreError::NotFound)?;
        if blob.len() != 32 {
            return Err(StoreError::Unavailable("corrupt code index".to_string()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&blob);
        let doc = Self::load_doc(&conn, &RoomId::from(arr))?;
        doc.invites
            .into_iter()
            .find(|i| i.code == code)
            .ok_or(StoreError::NotFound)
    }

    async fn file(&self, id: &FileId) -> Result<RoomFile, StoreError> {
        let conn = self.conn()?;
        let doc = Self::doc_of_entity(&conn, id.as_bytes())?;
        doc.files
            .into_iter()
            .find(|f| f.id == *id)
            .ok_or(StoreError::NotFound)
    }

    async fn membership(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<Option<RoomMember>, StoreError> {
        let conn = self.conn()?;
        let doc = match Self::load_doc(&conn, room_id) {
            Ok(doc) => doc,
            Err(StoreError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(doc.members.into_iter().find(|m| m.user_id == *user_id))
    }

    async fn room_members(&self, room_id: &RoomId) -> Result<Vec<RoomMember>, StoreError> {
        let conn = self.conn()?;
        Ok(Self::load_doc(&conn, room_id)?.members)
    }

    async fn room_channels(&self, room_id: &RoomId) -> Result<Vec<Channel>, StoreError> {
        let conn = self.conn()?;
        let mut channels = Self::load_doc(&conn, room_id)?.channels;
        channels.sort_by_key(|c| c.created_at);
        Ok(channels)
    }

    async fn channel_messages(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Vec<ChannelMessage>, StoreError> {
        let conn = self.conn()?;
        let doc = Self::doc_of_entity(&conn, channel_id.as_bytes())?;
        let mut messages: Vec<ChannelMessage> = doc
            .messages
            .into_iter()
            .filter(|m| m.channel_id == *channel_id)
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn room_files(&self, room_id: &RoomId) -> Result<Vec<RoomFile>, StoreError> {
        let conn = self.conn()?;
        Ok(Self::load_doc(&conn, room_id)?.files)
    }

    async fn room_invites(&self, room_id: &RoomId) -> Result<Vec<RoomInviteLink>, StoreError> {
        let conn = self.conn()?;
        Ok(Self::load_doc(&conn, room_id)?.invites)
    }

    async fn aggregate(&self, room_id: &RoomId, metric: Metric) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        Ok(Self::load_doc(&conn, room_id)?.metric(metric))
    }

    async fn write_atomic(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let mut state = BatchState::default();
        for op in batch.ops {
            state.apply(&tx, op)?;
        }
        for guard in &batch.guards {
            state.check_guard(&tx, guard)?;
        }
        state.write_back(&tx)?;

        tx.commit()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_room::{ChannelKind, RoomQuotas};

    fn test_room(name: &str) -> Room {
        Room::new(name.to_string(), "general".to_string(), RoomQuotas::default())
    }

    #[tokio::test]
    async fn test_document_round_trip() {
        let store = DocStore::memory().unwrap();
        let room = test_room("alpha");
        let channel = Channel::new(room.id, "general".to_string(), ChannelKind::Text);
        let message = ChannelMessage::new(channel.id, UserId::new("alice"), "hi".to_string());

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(room.clone()));
        batch.push(WriteOp::InsertMember(RoomMember::new(
            room.id,
            UserId::new("alice"),
            Role::Admin,
        )));
        batch.push(WriteOp::InsertChannel(channel.clone()));
        batch.push(WriteOp::InsertMessage(message.clone()));
        store.write_atomic(batch).await.unwrap();

        assert_eq!(store.room(&room.id).await.unwrap().name, "alpha");
        assert_eq!(store.channel(&channel.id).await.unwrap().name, "general");
        assert_eq!(store.message(&message.id).await.unwrap().body, "hi");
        assert_eq!(
            store.aggregate(&room.id, Metric::MemberCount).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_room_name_unique_across_documents() {
        let store = DocStore::memory().unwrap();
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(test_room("alpha")));
        store.write_atomic(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(test_room("alpha")));
        let err = store.write_atomic(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { ref field, .. } if field == "room_name"));

        // The failed batch left no document behind
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(test_room("beta")));
        store.write_atomic(batch).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_op_rolls_back_document() {
        let store = DocStore::memory().unwrap();
        let room = test_room("alpha");
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(room.clone()));
        store.write_atomic(batch).await.unwrap();

        let member = RoomMember::new(room.id, UserId::new("bob"), Role::Member);
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertMember(member.clone()));
        batch.push(WriteOp::InsertMember(member));
        let err = store.write_atomic(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { ref field, .. } if field == "room_user"));

        assert!(store
            .membership(&room.id, &UserId::new("bob"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_guard_violation_rolls_back() {
        let store = DocStore::memory().unwrap();
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
    async fn test_room_delete_drops_indexes() {
        let store = DocStore::memory().unwrap();
        let room = test_room("alpha");
        let invite = RoomInviteLink::new(room.id, UserId::new("alice"), None);
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(room.clone()));
        batch.push(WriteOp::InsertInvite(invite.clone()));
        store.write_atomic(batch).await.unwrap();

        assert_eq!(store.invite_by_code(&invite.code).await.unwrap().id, invite.id);

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::DeleteRoom(room.id));
        store.write_atomic(batch).await.unwrap();

        assert!(matches!(store.room(&room.id).await, Err(StoreError::NotFound)));
        assert!(matches!(
            store.invite_by_code(&invite.code).await,
            Err(StoreError::NotFound)
        ));

        // The released name is reusable
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(test_room("alpha")));
        store.write_atomic(batch).await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_delete_cascades_messages() {
        let store = DocStore::memory().unwrap();
        let room = test_room("alpha");
        let channel = Channel::new(room.id, "general".to_string(), ChannelKind::Text);
        let message = ChannelMessage::new(channel.id, UserId::new("alice"), "hi".to_string());
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(room.clone()));
        batch.push(WriteOp::InsertChannel(channel.clone()));
        batch.push(WriteOp::InsertMessage(message.clone()));
        store.write_atomic(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::DeleteChannel(channel.id));
        store.write_atomic(batch).await.unwrap();

        assert!(matches!(store.channel(&channel.id).await, Err(StoreError::NotFound)));
        assert!(matches!(store.message(&message.id).await, Err(StoreError::NotFound)));
    }
}
