//! Channel data structures

use super::file::ArtifactRef;
use super::types::{ChannelId, RoomId, Timestamp};
use serde::{Deserialize, Serialize};

/// A Channel is a sub-space within a Room where messages are exchanged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// Unique identifier
    pub id: ChannelId,

    /// Owning Room
    pub room_id: RoomId,

    /// Name, unique within (room, kind)
    pub name: String,

    /// Channel type
    pub kind: ChannelKind,

    /// Optional avatar stored in the external artifact store
    pub avatar: Option<ArtifactRef>,

    /// When the channel was created
    pub created_at: Timestamp,

    /// Last time channel metadata was updated
    pub updated_at: Timestamp,
}

impl Channel {
    /// Create a new Channel in a Room
    pub fn new(room_id: RoomId, name: String, kind: ChannelKind) -> Self {
        let now = Timestamp::now();
        Channel {
            id: ChannelId::generate(),
            room_id,
            name,
            kind,
            avatar: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Channel types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Text channel for messages
    Text,
    /// Announcement channel, typically admin-posted
    Announcement,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Text => "Text",
            ChannelKind::Announcement => "Announcement",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Text" => Some(ChannelKind::Text),
            "Announcement" => Some(ChannelKind::Announcement),
            _ => None,
        }
    }
}
