//! Room file records and artifact references

use super::types::{FileId, RoomId, Timestamp};
use serde::{Deserialize, Serialize};

/// Opaque reference to an externally stored binary artifact
///
/// The reference is fully known before the primary-store write that commits
/// it, so a failed write can be compensated by deleting `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Public URL of the payload
    pub url: String,

    /// Backend-specific deletion key
    pub key: String,

    /// Payload size in bytes
    pub bytes: u64,
}

/// Logical type of a stored artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    RoomAvatar,
    ChannelAvatar,
    MessageUpload,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::RoomAvatar => "RoomAvatar",
            ArtifactKind::ChannelAvatar => "ChannelAvatar",
            ArtifactKind::MessageUpload => "MessageUpload",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "RoomAvatar" => Some(ArtifactKind::RoomAvatar),
            "ChannelAvatar" => Some(ArtifactKind::ChannelAvatar),
            "MessageUpload" => Some(ArtifactKind::MessageUpload),
            _ => None,
        }
    }
}

/// Primary-store record for an external artifact
///
/// Physically owned by the Room for quota accounting, referenced by the
/// artifact's logical parent (avatar holder or message).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomFile {
    /// Unique identifier
    pub id: FileId,

    /// Owning Room
    pub room_id: RoomId,

    /// External artifact reference
    pub artifact: ArtifactRef,

    /// Logical type
    pub kind: ArtifactKind,

    /// When the record was created
    pub created_at: Timestamp,
}

impl RoomFile {
    pub fn new(room_id: RoomId, artifact: ArtifactRef, kind: ArtifactKind) -> Self {
        RoomFile {
            id: FileId::generate(),
            room_id,
            artifact,
            kind,
            created_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_file() {
        let artifact = ArtifactRef {
            url: "mem://abc".to_string(),
            key: "abc".to_string(),
            bytes: 42,
        };
        let file = RoomFile::new(RoomId::generate(), artifact, ArtifactKind::MessageUpload);
        assert_eq!(file.artifact.bytes, 42);
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            ArtifactKind::RoomAvatar,
            ArtifactKind::ChannelAvatar,
            ArtifactKind::MessageUpload,
        ] {
            assert_eq!(ArtifactKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ArtifactKind::from_str("Banner"), None);
    }
}
