//! Primary-store adapters
//!
//! One engine, several storage paradigms. The engine is written against the
//! [`RoomStore`] trait; each adapter maps the typed write batch onto its own
//! transaction mechanics and reports failures through the closed
//! [`StoreError`] set.

use crate::core_room::{
    Channel, ChannelAudit, ChannelId, ChannelMessage, FileId, InviteId, MessageId, Role, Room,
    RoomAudit, RoomFile, RoomId, RoomInviteLink, RoomMember, UserId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod doc;
pub mod memory;
mod migrations;
pub mod sql;

pub use doc::DocStore;
pub use memory::MemoryStore;
pub use sql::SqlStore;

/// Closed error set every adapter maps onto
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("entity not found")]
    NotFound,

    #[error("unique constraint violated on {field}: {value}")]
    UniqueViolation { field: String, value: String },

    #[error("missing foreign reference on {field}")]
    FkViolation { field: String },

    #[error("write guard violated: {0:?}")]
    GuardViolated(WriteGuard),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Aggregate metrics the engine reads for quota evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Number of memberships in a room
    MemberCount,
    /// Number of memberships with the Admin role
    AdminCount,
    /// Number of channels in a room
    ChannelCount,
    /// Sum of stored file bytes in a room
    FileBytesTotal,
}

/// Assertion re-checked inside the adapter's transaction, after the batch
/// ops are applied. Shrinks the window of the read-then-decide quota race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteGuard {
    MemberCountAtMost { room_id: RoomId, max: u64 },
    ChannelCountAtMost { room_id: RoomId, max: u64 },
    FileBytesAtMost { room_id: RoomId, max: u64 },
    AdminCountAtLeast { room_id: RoomId, min: u64 },
}

/// A single typed mutation within an atomic write
#[derive(Debug, Clone)]
pub enum WriteOp {
    InsertRoom(Room),
    UpdateRoom(Room),
    /// Cascades to members, channels, messages, files, invites and audits
    DeleteRoom(RoomId),

    InsertMember(RoomMember),
    UpdateMemberRole {
        room_id: RoomId,
        user_id: UserId,
        role: Role,
    },
    DeleteMember {
        room_id: RoomId,
        user_id: UserId,
    },

    InsertChannel(Channel),
    UpdateChannel(Channel),
    /// Cascades to the channel's messages and audits
    DeleteChannel(ChannelId),

    InsertMessage(ChannelMessage),
    UpdateMessage(ChannelMessage),
    DeleteMessage(MessageId),

    InsertInvite(RoomInviteLink),
    UpdateInvite(RoomInviteLink),
    DeleteInvite(InviteId),

    InsertFile(RoomFile),
    DeleteFile(FileId),

    AppendRoomAudit(RoomAudit),
    AppendChannelAudit(ChannelAudit),
}

/// An all-or-nothing write: ops applied in order, then guards checked
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub ops: Vec<WriteOp>,
    pub guards: Vec<WriteGuard>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn guard(&mut self, guard: WriteGuard) -> &mut Self {
        self.guards.push(guard);
        self
    }
}

/// Storage capability contract consumed by the engine
///
/// Reads are point-in-time snapshots; only `write_atomic` mutates state.
/// Adapters must enforce, inside the same transaction as the batch:
/// - global uniqueness of room names (`field = "room_name"`),
/// - uniqueness of channel names within (room, kind) (`field = "channel_name"`),
/// - one membership per (room, user) (`field = "room_user"`),
/// - existence of referenced parents (`FkViolation`),
/// - every guard in the batch.
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn room(&self, id: &RoomId) -> Result<Room, StoreError>;
    async fn channel(&self, id: &ChannelId) -> Result<Channel, StoreError>;
    async fn message(&self, id: &MessageId) -> Result<ChannelMessage, StoreError>;
    async fn invite(&self, id: &InviteId) -> Result<RoomInviteLink, StoreError>;
    async fn invite_by_code(&self, code: &str) -> Result<RoomInviteLink, StoreError>;
    async fn file(&self, id: &FileId) -> Result<RoomFile, StoreError>;

    /// The membership for (room, user), or `None` when the user is not in the room
    async fn membership(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<Option<RoomMember>, StoreError>;

    async fn room_members(&self, room_id: &RoomId) -> Result<Vec<RoomMember>, StoreError>;

    /// Channels of a room, oldest first
    async fn room_channels(&self, room_id: &RoomId) -> Result<Vec<Channel>, StoreError>;

    /// Messages of a channel, oldest first
    async fn channel_messages(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Vec<ChannelMessage>, StoreError>;

    async fn room_files(&self, room_id: &RoomId) -> Result<Vec<RoomFile>, StoreError>;
    async fn room_invites(&self, room_id: &RoomId) -> Result<Vec<RoomInviteLink>, StoreError>;

    /// Live aggregate over current state, read at evaluation time
    async fn aggregate(&self, room_id: &RoomId, metric: Metric) -> Result<u64, StoreError>;

    /// Apply a batch atomically: every op and every guard, or nothing
    async fn write_atomic(&self, batch: WriteBatch) -> Result<(), StoreError>;
}
