//! Relational store adapter over SQLite
//!
//! One row per entity, schema-level UNIQUE and FOREIGN KEY constraints, and
//! one SQLite transaction per write batch. Guard re-checks run as COUNT/SUM
//! queries inside the same transaction as the batch ops.

use super::{migrations, Metric, RoomStore, StoreError, WriteBatch, WriteGuard, WriteOp};
use crate::core_room::{
    ArtifactKind, ArtifactRef, Author, Channel, ChannelId, ChannelKind, ChannelMessage, FileId,
    InviteId, JoinSettings, MessageId, Role, Room, RoomFile, RoomId, RoomInviteLink, RoomMember,
    RoomQuotas, Timestamp, UserId,
};
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite-backed relational adapter
pub struct SqlStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqlStore {
    /// Create a store over an existing connection pool
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Result<Self, StoreError> {
        migrations::migrate(&pool).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Open (or create) a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::new(manager).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::new(pool)
    }

    /// Create a new in-memory store
    pub fn memory() -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
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
}

/// Map a rusqlite constraint failure onto the closed error set.
///
/// `value` is the conflicting value known from the op being applied;
/// `fk_field` names the parent reference the op depends on.
fn map_sql_error(e: rusqlite::Error, value: &str, fk_field: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref err, Some(ref msg)) = e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            if msg.contains("UNIQUE constraint failed") {
                let field = if msg.contains("rooms.name") {
                    "room_name"
                } else if msg.contains("room_members.") {
                    "room_user"
                } else if msg.contains("channels.") {
                    "channel_name"
                } else if msg.contains("room_invites.code") {
                    "invite_code"
                } else {
                    "unknown"
                };
                return StoreError::UniqueViolation {
                    field: field.to_string(),
                    value: value.to_string(),
                };
            }
            if msg.contains("FOREIGN KEY constraint failed") {
                return StoreError::FkViolation {
                    field: fk_field.to_string(),
                };
            }
        }
    }
    StoreError::Unavailable(e.to_string())
}

fn id_from_blob<T: From<[u8; 32]>>(blob: Vec<u8>) -> rusqlite::Result<T> {
    if blob.len() != 32 {
        return Err(rusqlite::Error::InvalidQuery);
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&blob);
    Ok(T::from(arr))
}

fn artifact_from_row(
    url: Option<String>,
    key: Option<String>,
    bytes: Option<i64>,
) -> Option<ArtifactRef> {
    match (url, key, bytes) {
        (Some(url), Some(key), Some(bytes)) => Some(ArtifactRef {
            url,
            key,
            bytes: bytes.max(0) as u64,
        }),
        _ => None,
    }
}

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<Room> {
    let announce: Option<Vec<u8>> = row.get(11)?;
    let announce_channel = match announce {
        Some(blob) => Some(id_from_blob::<ChannelId>(blob)?),
        None => None,
    };

    Ok(Room {
        id: id_from_blob(row.get::<_, Vec<u8>>(0)?)?,
        name: row.get(1)?,
        category: row.get(2)?,
        rules: row.get(3)?,
        quotas: RoomQuotas {
            max_users: row.get::<_, i64>(4)?.max(0) as u64,
            max_channels: row.get::<_, i64>(5)?.max(0) as u64,
            total_files_bytes_allowed: row.get::<_, i64>(6)?.max(0) as u64,
            single_file_bytes_allowed: row.get::<_, i64>(7)?.max(0) as u64,
            message_days_to_live: row.get::<_, i64>(8)?.max(0) as u32,
            file_days_to_live: row.get::<_, i64>(9)?.max(0) as u32,
        },
        join_settings: JoinSettings {
            welcome_message: row.get(10)?,
            announce_channel,
        },
        avatar: artifact_from_row(row.get(12)?, row.get(13)?, row.get(14)?),
        created_at: Timestamp::from_millis(row.get::<_, i64>(15)?.max(0) as u64),
        updated_at: Timestamp::from_millis(row.get::<_, i64>(16)?.max(0) as u64),
    })
}

const ROOM_COLUMNS: &str = "id, name, category, rules, max_users, max_channels, \
     total_files_bytes_allowed, single_file_bytes_allowed, message_days_to_live, \
     file_days_to_live, welcome_message, announce_channel, avatar_url, avatar_key, \
     avatar_bytes, created_at, updated_at";

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<Channel> {
    let kind_str: String = row.get(3)?;
    Ok(Channel {
        id: id_from_blob(row.get::<_, Vec<u8>>(0)?)?,
        room_id: id_from_blob(row.get::<_, Vec<u8>>(1)?)?,
        name: row.get(2)?,
        kind: ChannelKind::from_str(&kind_str).unwrap_or(ChannelKind::Text),
        avatar: artifact_from_row(row.get(4)?, row.get(5)?, row.get(6)?),
        created_at: Timestamp::from_millis(row.get::<_, i64>(7)?.max(0) as u64),
        updated_at: Timestamp::from_millis(row.get::<_, i64>(8)?.max(0) as u64),
    })
}

const CHANNEL_COLUMNS: &str =
    "id, room_id, name, kind, avatar_url, avatar_key, avatar_bytes, created_at, updated_at";

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelMessage> {
    let author: Option<String> = row.get(2)?;
    Ok(ChannelMessage {
        id: id_from_blob(row.get::<_, Vec<u8>>(0)?)?,
        channel_id: id_from_blob(row.get::<_, Vec<u8>>(1)?)?,
        author: match author {
            Some(user) => Author::User(UserId::new(user)),
            None => Author::System,
        },
        body: row.get(3)?,
        upload: artifact_from_row(row.get(4)?, row.get(5)?, row.get(6)?),
        created_at: Timestamp::from_millis(row.get::<_, i64>(7)?.max(0) as u64),
        updated_at: Timestamp::from_millis(row.get::<_, i64>(8)?.max(0) as u64),
    })
}

const MESSAGE_COLUMNS: &str =
    "id, channel_id, author_user, body, upload_url, upload_key, upload_bytes, created_at, updated_at";

fn invite_from_row(row: &Row<'_>) -> rusqlite::Result<RoomInviteLink> {
    Ok(RoomInviteLink {
        id: id_from_blob(row.get::<_, Vec<u8>>(0)?)?,
        room_id: id_from_blob(row.get::<_, Vec<u8>>(1)?)?,
        code: row.get(2)?,
        created_by: UserId::new(row.get::<_, String>(3)?),
        expires_at: row
            .get::<_, Option<i64>>(4)?
            .map(|ms| Timestamp::from_millis(ms.max(0) as u64)),
        created_at: Timestamp::from_millis(row.get::<_, i64>(5)?.max(0) as u64),
    })
}

const INVITE_COLUMNS: &str = "id, room_id, code, created_by, expires_at, created_at";

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<RoomFile> {
    let kind_str: String = row.get(5)?;
    Ok(RoomFile {
        id: id_from_blob(row.get::<_, Vec<u8>>(0)?)?,
        room_id: id_from_blob(row.get::<_, Vec<u8>>(1)?)?,
        artifact: ArtifactRef {
            url: row.get(2)?,
            key: row.get(3)?,
            bytes: row.get::<_, i64>(4)?.max(0) as u64,
        },
        kind: ArtifactKind::from_str(&kind_str).unwrap_or(ArtifactKind::MessageUpload),
        created_at: Timestamp::from_millis(row.get::<_, i64>(6)?.max(0) as u64),
    })
}

const FILE_COLUMNS: &str = "id, room_id, url, key, bytes, kind, created_at";

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<RoomMember> {
    let role_str: String = row.get(2)?;
    Ok(RoomMember {
        room_id: id_from_blob(row.get::<_, Vec<u8>>(0)?)?,
        user_id: UserId::new(row.get::<_, String>(1)?),
        role: Role::from_str(&role_str).unwrap_or(Role::Member),
        joined_at: Timestamp::from_millis(row.get::<_, i64>(3)?.max(0) as u64),
    })
}

fn apply_op(tx: &Connection, op: WriteOp) -> Result<(), StoreError> {
    match op {
        WriteOp::InsertRoom(room) => {
            let value = room.name.clone();
            tx.execute(
                "INSERT INTO rooms (id, name, category, rules, max_users, max_channels,
                    total_files_bytes_allowed, single_file_bytes_allowed,
                    message_days_to_live, file_days_to_live, welcome_message,
                    announce_channel, avatar_url, avatar_key, avatar_bytes,
                    created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params_from_iter(room_values(&room)),
            )
            .map_err(|e| map_sql_error(e, &value, "room_id"))?;
            Ok(())
        }
        WriteOp::UpdateRoom(room) => {
            let value = room.name.clone();
            let changed = tx
                .execute(
                    "UPDATE rooms SET name = ?2, category = ?3, rules = ?4, max_users = ?5,
                        max_channels = ?6, total_files_bytes_allowed = ?7,
                        single_file_bytes_allowed = ?8, message_days_to_live = ?9,
                        file_days_to_live = ?10, welcome_message = ?11,
                        announce_channel = ?12, avatar_url = ?13, avatar_key = ?14,
                        avatar_bytes = ?15, created_at = ?16, updated_at = ?17
                     WHERE id = ?1",
                    params_from_iter(room_values(&room)),
                )
                .map_err(|e| map_sql_error(e, &value, "room_id"))?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }
        WriteOp::DeleteRoom(room_id) => {
            let changed = tx
                .execute("DELETE FROM rooms WHERE id = ?", params![room_id.as_bytes()])
                .map_err(|e| map_sql_error(e, "", "room_id"))?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }
        WriteOp::InsertMember(member) => {
            let value = member.user_id.to_string();
            tx.execute(
                "INSERT INTO room_members (room_id, user_id, role, joined_at)
                 VALUES (?, ?, ?, ?)",
                params![
                    member.room_id.as_bytes(),
                    member.user_id.to_string(),
                    member.role.as_str(),
                    member.joined_at.as_millis() as i64,
                ],
            )
            .map_err(|e| map_sql_error(e, &value, "room_id"))?;
            Ok(())
        }
        WriteOp::UpdateMemberRole {
            room_id,
            user_id,
            role,
        } => {
            let changed = tx
                .execute(
                    "UPDATE room_members SET role = ? WHERE room_id = ? AND user_id = ?",
                    params![role.as_str(), room_id.as_bytes(), user_id.to_string()],
                )
                .map_err(|e| map_sql_error(e, "", "room_id"))?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }
        WriteOp::DeleteMember { room_id, user_id } => {
            let changed = tx
                .execute(
                    "DELETE FROM room_members WHERE room_id = ? AND user_id = ?",
                    params![room_id.as_bytes(), user_id.to_string()],
                )
                .map_err(|e| map_sql_error(e, "", "room_id"))?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }
        WriteOp::InsertChannel(channel) => {
            let value = channel.name.clone();
            tx.execute(
                "INSERT INTO channels (id, room_id, name, kind, avatar_url, avatar_key,
                    avatar_bytes, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params_from_iter(channel_values(&channel)),
            )
            .map_err(|e| map_sql_error(e, &value, "room_id"))?;
            Ok(())
        }
        WriteOp::UpdateChannel(channel) => {
            let value = channel.name.clone();
            let changed = tx
                .execute(
                    "UPDATE channels SET room_id = ?2, name = ?3, kind = ?4, avatar_url = ?5,
                        avatar_key = ?6, avatar_bytes = ?7, created_at = ?8, updated_at = ?9
                     WHERE id = ?1",
                    params_from_iter(channel_values(&channel)),
                )
                .map_err(|e| map_sql_error(e, &value, "room_id"))?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }
        WriteOp::DeleteChannel(channel_id) => {
            let changed = tx
                .execute(
                    "DELETE FROM channels WHERE id = ?",
                    params![channel_id.as_bytes()],
                )
                .map_err(|e| map_sql_error(e, "", "channel_id"))?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }
        WriteOp::InsertMessage(message) => {
            tx.execute(
                "INSERT INTO messages (id, channel_id, author_user, body, upload_url,
                    upload_key, upload_bytes, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params_from_iter(message_values(&message)),
            )
            .map_err(|e| map_sql_error(e, "", "channel_id"))?;
            Ok(())
        }
        WriteOp::UpdateMessage(message) => {
            let changed = tx
                .execute(
                    "UPDATE messages SET channel_id = ?2, author_user = ?3, body = ?4,
                        upload_url = ?5, upload_key = ?6, upload_bytes = ?7,
                        created_at = ?8, updated_at = ?9
                     WHERE id = ?1",
                    params_from_iter(message_values(&message)),
                )
                .map_err(|e| map_sql_error(e, "", "channel_id"))?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }
        WriteOp::DeleteMessage(message_id) => {
            let changed = tx
                .execute(
                    "DELETE FROM messages WHERE id = ?",
                    params![message_id.as_bytes()],
                )
                .map_err(|e| map_sql_error(e, "", "channel_id"))?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }
        WriteOp::InsertInvite(invite) => {
            let value = invite.code.clone();
            tx.execute(
                "INSERT INTO room_invites (id, room_id, code, created_by, expires_at, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params_from_iter(invite_values(&invite)),
            )
            .map_err(|e| map_sql_error(e, &value, "room_id"))?;
            Ok(())
        }
        WriteOp::UpdateInvite(invite) => {
            let value = invite.code.clone();
            let changed = tx
                .execute(
                    "UPDATE room_invites SET room_id = ?2, code = ?3, created_by = ?4,
                        expires_at = ?5, created_at = ?6
                     WHERE id = ?1",
                    params_from_iter(invite_values(&invite)),
                )
                .map_err(|e| map_sql_error(e, &value, "room_id"))?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }
        WriteOp::DeleteInvite(invite_id) => {
            let changed = tx
                .execute(
                    "DELETE FROM room_invites WHERE id = ?",
                    params![invite_id.as_bytes()],
                )
                .map_err(|e| map_sql_error(e, "", "room_id"))?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }
        WriteOp::InsertFile(file) => {
            tx.execute(
                "INSERT INTO room_files (id, room_id, url, key, bytes, kind, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    file.id.as_bytes(),
                    file.room_id.as_bytes(),
                    &file.artifact.url,
                    &file.artifact.key,
                    file.artifact.bytes as i64,
                    file.kind.as_str(),
                    file.created_at.as_millis() as i64,
                ],
            )
            .map_err(|e| map_sql_error(e, "", "room_id"))?;
            Ok(())
        }
        WriteOp::DeleteFile(file_id) => {
            let changed = tx
                .execute(
                    "DELETE FROM room_files WHERE id = ?",
                    params![file_id.as_bytes()],
                )
                .map_err(|e| map_sql_error(e, "", "room_id"))?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }
        WriteOp::AppendRoomAudit(audit) => {
            tx.execute(
                "INSERT INTO room_audits (room_id, type_name, body, created_at)
                 VALUES (?, ?, ?, ?)",
                params![
                    audit.room_id.as_bytes(),
                    &audit.type_name,
                    audit.body.to_string(),
                    audit.created_at.as_millis() as i64,
                ],
            )
            .map_err(|e| map_sql_error(e, "", "room_id"))?;
            Ok(())
        }
        WriteOp::AppendChannelAudit(audit) => {
            tx.execute(
                "INSERT INTO channel_audits (channel_id, type_name, body, created_at)
                 VALUES (?, ?, ?, ?)",
                params![
                    audit.channel_id.as_bytes(),
                    &audit.type_name,
                    audit.body.to_string(),
                    audit.created_at.as_millis() as i64,
                ],
            )
            .map_err(|e| map_sql_error(e, "", "channel_id"))?;
            Ok(())
        }
    }
}

fn opt_text(value: Option<String>) -> Value {
    value.map(Value::Text).unwrap_or(Value::Null)
}

fn opt_int(value: Option<i64>) -> Value {
    value.map(Value::Integer).unwrap_or(Value::Null)
}

fn room_values(room: &Room) -> Vec<Value> {
    vec![
        Value::Blob(room.id.as_bytes().to_vec()),
        Value::Text(room.name.clone()),
        Value::Text(room.category.clone()),
        Value::Text(room.rules.clone()),
        Value::Integer(room.quotas.max_users as i64),
        Value::Integer(room.quotas.max_channels as i64),
        Value::Integer(room.quotas.total_files_bytes_allowed as i64),
        Value::Integer(room.quotas.single_file_bytes_allowed as i64),
        Value::Integer(room.quotas.message_days_to_live as i64),
        Value::Integer(room.quotas.file_days_to_live as i64),
        Value::Text(room.join_settings.welcome_message.clone()),
        room.join_settings
            .announce_channel
            .as_ref()
            .map(|c| Value::Blob(c.as_bytes().to_vec()))
            .unwrap_or(Value::Null),
        opt_text(room.avatar.as_ref().map(|a| a.url.clone())),
        opt_text(room.avatar.as_ref().map(|a| a.key.clone())),
        opt_int(room.avatar.as_ref().map(|a| a.bytes as i64)),
        Value::Integer(room.created_at.as_millis() as i64),
        Value::Integer(room.updated_at.as_millis() as i64),
    ]
}

fn channel_values(channel: &Channel) -> Vec<Value> {
    vec![
        Value::Blob(channel.id.as_bytes().to_vec()),
        Value::Blob(channel.room_id.as_bytes().to_vec()),
        Value::Text(channel.name.clone()),
        Value::Text(channel.kind.as_str().to_string()),
        opt_text(channel.avatar.as_ref().map(|a| a.url.clone())),
        opt_text(channel.avatar.as_ref().map(|a| a.key.clone())),
        opt_int(channel.avatar.as_ref().map(|a| a.bytes as i64)),
        Value::Integer(channel.created_at.as_millis() as i64),
        Value::Integer(channel.updated_at.as_millis() as i64),
    ]
}

fn message_values(message: &ChannelMessage) -> Vec<Value> {
    vec![
        Value::Blob(message.id.as_bytes().to_vec()),
        Value::Blob(message.channel_id.as_bytes().to_vec()),
        opt_text(message.author.user_id().map(|u| u.to_string())),
        Value::Text(message.body.clone()),
        opt_text(message.upload.as_ref().map(|a| a.url.clone())),
        opt_text(message.upload.as_ref().map(|a| a.key.clone())),
        opt_int(message.upload.as_ref().map(|a| a.bytes as i64)),
        Value::Integer(message.created_at.as_millis() as i64),
        Value::Integer(message.updated_at.as_millis() as i64),
    ]
}

fn invite_values(invite: &RoomInviteLink) -> Vec<Value> {
    vec![
        Value::Blob(invite.id.as_bytes().to_vec()),
        Value::Blob(invite.room_id.as_bytes().to_vec()),
        Value::Text(invite.code.clone()),
        Value::Text(invite.created_by.to_string()),
        opt_int(invite.expires_at.map(|t| t.as_millis() as i64)),
        Value::Integer(invite.created_at.as_millis() as i64),
    ]
}

fn check_guard(tx: &Connection, guard: &WriteGuard) -> Result<(), StoreError> {
    let unavailable = |e: rusqlite::Error| StoreError::Unavailable(e.to_string());
    let ok = match guard {
        WriteGuard::MemberCountAtMost { room_id, max } => {
            let count: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM room_members WHERE room_id = ?",
                    params![room_id.as_bytes()],
                    |row| row.get(0),
                )
                .map_err(unavailable)?;
            count.max(0) as u64 <= *max
        }
        WriteGuard::ChannelCountAtMost { room_id, max } => {
            let count: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM channels WHERE room_id = ?",
                    params![room_id.as_bytes()],
                    |row| row.get(0),
                )
                .map_err(unavailable)?;
            count.max(0) as u64 <= *max
        }
        WriteGuard::FileBytesAtMost { room_id, max } => {
            let total: i64 = tx
                .query_row(
                    "SELECT COALESCE(SUM(bytes), 0) FROM room_files WHERE room_id = ?",
                    params![room_id.as_bytes()],
                    |row| row.get(0),
                )
                .map_err(unavailable)?;
            total.max(0) as u64 <= *max
        }
        WriteGuard::AdminCountAtLeast { room_id, min } => {
            let count: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM room_members WHERE room_id = ? AND role = 'Admin'",
                    params![room_id.as_bytes()],
                    |row| row.get(0),
                )
                .map_err(unavailable)?;
            count.max(0) as u64 >= *min
        }
    };
    if ok {
        Ok(())
    } else {
        Err(StoreError::GuardViolated(*guard))
    }
}

#[async_trait]
impl RoomStore for SqlStore {
    async fn room(&self, id: &RoomId) -> Result<Room, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?"),
            params![id.as_bytes()],
            room_from_row,
        )
        .optional()
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
        .ok_or(StoreError::NotFound)
    }

    async fn channel(&self, id: &ChannelId) -> Result<Channel, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?"),
            params![id.as_bytes()],
            channel_from_row,
        )
        .optional()
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
        .ok_or(StoreError::NotFound)
    }

    async fn message(&self, id: &MessageId) -> Result<ChannelMessage, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"),
            params![id.as_bytes()],
            message_from_row,
        )
        .optional()
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
        .ok_or(StoreError::NotFound)
    }

    async fn invite(&self, id: &InviteId) -> Result<RoomInviteLink, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {INVITE_COLUMNS} FROM room_invites WHERE id = ?"),
            params![id.as_bytes()],
            invite_from_row,
        )
        .optional()
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
        .ok_or(StoreError::NotFound)
    }

    async fn invite_by_code(&self, code: &str) -> Result<RoomInviteLink, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {INVITE_COLUMNS} FROM room_invites WHERE code = ?"),
            params![code],
            invite_from_row,
        )
        .optional()
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
        .ok_or(StoreError::NotFound)
    }

    async fn file(&self, id: &FileId) -> Result<RoomFile, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {FILE_COLUMNS} FROM room_files WHERE id = ?"),
            params![id.as_bytes()],
            file_from_row,
        )
        .optional()
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
        .ok_or(StoreError::NotFound)
    }

    async fn membership(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<Option<RoomMember>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT room_id, user_id, role, joined_at FROM room_members
             WHERE room_id = ? AND user_id = ?",
            params![room_id.as_bytes(), user_id.to_string()],
            member_from_row,
        )
        .optional()
        .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn room_members(&self, room_id: &RoomId) -> Result<Vec<RoomMember>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT room_id, user_id, role, joined_at FROM room_members WHERE room_id = ?",
            )
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let members = stmt
            .query_map(params![room_id.as_bytes()], member_from_row)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(members)
    }

    async fn room_channels(&self, room_id: &RoomId) -> Result<Vec<Channel>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels WHERE room_id = ? ORDER BY created_at"
            ))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let channels = stmt
            .query_map(params![room_id.as_bytes()], channel_from_row)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(channels)
    }

    async fn channel_messages(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Vec<ChannelMessage>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE channel_id = ? ORDER BY created_at"
            ))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let messages = stmt
            .query_map(params![channel_id.as_bytes()], message_from_row)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(messages)
    }

    async fn room_files(&self, room_id: &RoomId) -> Result<Vec<RoomFile>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {FILE_COLUMNS} FROM room_files WHERE room_id = ?"
            ))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let files = stmt
            .query_map(params![room_id.as_bytes()], file_from_row)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(files)
    }

    async fn room_invites(&self, room_id: &RoomId) -> Result<Vec<RoomInviteLink>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {INVITE_COLUMNS} FROM room_invites WHERE room_id = ?"
            ))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let invites = stmt
            .query_map(params![room_id.as_bytes()], invite_from_row)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(invites)
    }

    async fn aggregate(&self, room_id: &RoomId, metric: Metric) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let sql = match metric {
            Metric::MemberCount => "SELECT COUNT(*) FROM room_members WHERE room_id = ?",
            Metric::AdminCount => {
                "SELECT COUNT(*) FROM room_members WHERE room_id = ? AND role = 'Admin'"
            }
            Metric::ChannelCount => "SELECT COUNT(*) FROM channels WHERE room_id = ?",
            Metric::FileBytesTotal => {
                "SELECT COALESCE(SUM(bytes), 0) FROM room_files WHERE room_id = ?"
            }
        };
        let value: i64 = conn
            .query_row(sql, params![room_id.as_bytes()], |row| row.get(0))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(value.max(0) as u64)
    }

    async fn write_atomic(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        for op in batch.ops {
            apply_op(&tx, op)?;
        }
        for guard in &batch.guards {
            check_guard(&tx, guard)?;
        }

        tx.commit()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_room::RoomQuotas;

    fn test_room(name: &str) -> Room {
        Room::new(name.to_string(), "general".to_string(), RoomQuotas::default())
    }

    #[tokio::test]
    async fn test_room_round_trip() {
        let store = SqlStore::memory().unwrap();
        let mut room = test_room("alpha");
        room.avatar = Some(ArtifactRef {
            url: "fs://avatars/a".to_string(),
            key: "avatars/a".to_string(),
            bytes: 128,
        });

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(room.clone()));
        store.write_atomic(batch).await.unwrap();

        let read = store.room(&room.id).await.unwrap();
        assert_eq!(read.name, "alpha");
        assert_eq!(read.avatar, room.avatar);
        assert_eq!(read.quotas, room.quotas);
    }

    #[tokio::test]
    async fn test_unique_room_name_maps_to_field() {
        let store = SqlStore::memory().unwrap();
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(test_room("alpha")));
        store.write_atomic(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(test_room("alpha")));
        let err = store.write_atomic(batch).await.unwrap_err();
        match err {
            StoreError::UniqueViolation { field, value } => {
                assert_eq!(field, "room_name");
                assert_eq!(value, "alpha");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fk_violation_on_orphan_member() {
        let store = SqlStore::memory().unwrap();
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertMember(RoomMember::new(
            RoomId::generate(),
            UserId::new("alice"),
            Role::Admin,
        )));
        let err = store.write_atomic(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::FkViolation { .. }));
    }

    #[tokio::test]
    async fn test_batch_rolls_back_on_guard_violation() {
        let store = SqlStore::memory().unwrap();
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
    async fn test_channel_name_unique_within_room_and_kind() {
        let store = SqlStore::memory().unwrap();
        let room = test_room("alpha");
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(room.clone()));
        batch.push(WriteOp::InsertChannel(Channel::new(
            room.id,
            "general".to_string(),
            ChannelKind::Text,
        )));
        // Same name, different kind: allowed
        batch.push(WriteOp::InsertChannel(Channel::new(
            room.id,
            "general".to_string(),
            ChannelKind::Announcement,
        )));
        store.write_atomic(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertChannel(Channel::new(
            room.id,
            "general".to_string(),
            ChannelKind::Text,
        )));
        let err = store.write_atomic(batch).await.unwrap_err();
        assert!(
            matches!(err, StoreError::UniqueViolation { ref field, .. } if field == "channel_name")
        );
    }

    #[tokio::test]
    async fn test_message_and_invite_round_trip() {
        let store = SqlStore::memory().unwrap();
        let room = test_room("alpha");
        let channel = Channel::new(room.id, "general".to_string(), ChannelKind::Text);
        let message = ChannelMessage::new(channel.id, UserId::new("alice"), "hi".to_string());
        let system = ChannelMessage::system(channel.id, "alice joined".to_string());
        let invite = RoomInviteLink::new(room.id, UserId::new("alice"), Some(Timestamp::from_millis(99)));

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRoom(room.clone()));
        batch.push(WriteOp::InsertChannel(channel.clone()));
        batch.push(WriteOp::InsertMessage(message.clone()));
        batch.push(WriteOp::InsertMessage(system.clone()));
        batch.push(WriteOp::InsertInvite(invite.clone()));
        store.write_atomic(batch).await.unwrap();

        let read = store.message(&message.id).await.unwrap();
        assert_eq!(read.author, Author::User(UserId::new("alice")));

        let read = store.message(&system.id).await.unwrap();
        assert_eq!(read.author, Author::System);

        let read = store.invite_by_code(&invite.code).await.unwrap();
        assert_eq!(read.expires_at, Some(Timestamp::from_millis(99)));

        let messages = store.channel_messages(&channel.id).await.unwrap();
        assert_eq!(messages.len(), 2);
    }
}
