//! Append-only audit log entries
//!
//! Written inside the same atomic write as the mutation they describe,
//! never read back or mutated by the engine.

use super::types::{ChannelId, RoomId, Timestamp};
use serde::{Deserialize, Serialize};

/// Audit entry attached to a Room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomAudit {
    pub room_id: RoomId,

    /// Short type name of the mutation, e.g. `channel.created`
    pub type_name: String,

    /// Free-form JSON body with the salient fields
    pub body: serde_json::Value,

    pub created_at: Timestamp,
}

impl RoomAudit {
    pub fn new(room_id: RoomId, type_name: impl Into<String>, body: serde_json::Value) -> Self {
        RoomAudit {
            room_id,
            type_name: type_name.into(),
            body,
            created_at: Timestamp::now(),
        }
    }
}

/// Audit entry attached to a Channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAudit {
    pub channel_id: ChannelId,

    /// Short type name of the mutation, e.g. `message.edited`
    pub type_name: String,

    /// Free-form JSON body with the salient fields
    pub body: serde_json::Value,

    pub created_at: Timestamp,
}

impl ChannelAudit {
    pub fn new(
        channel_id: ChannelId,
        type_name: impl Into<String>,
        body: serde_json::Value,
    ) -> Self {
        ChannelAudit {
            channel_id,
            type_name: type_name.into(),
            body,
            created_at: Timestamp::now(),
        }
    }
}
