//! Room domain model
//!
//! Data structures for rooms, channels, messages, memberships, invite links,
//! file records and audit entries. Business rules live in [`crate::engine`];
//! this module only carries the shapes and their intrinsic helpers.

pub mod audit;
pub mod channel;
pub mod file;
pub mod invite;
pub mod message;
pub mod room;
pub mod types;

pub use audit::{ChannelAudit, RoomAudit};
pub use channel::{Channel, ChannelKind};
pub use file::{ArtifactKind, ArtifactRef, RoomFile};
pub use invite::RoomInviteLink;
pub use message::{Author, ChannelMessage};
pub use room::{JoinSettings, Role, Room, RoomMember, RoomQuotas, NAME_PLACEHOLDER};
pub use types::{ChannelId, FileId, InviteId, MessageId, RoomId, Timestamp, UserId};
