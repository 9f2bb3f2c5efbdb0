//! Engine error taxonomy
//!
//! A closed set of stable kinds. Callers branch on the variant; the display
//! strings are human-readable and never leak storage internals.

use crate::artifact::ArtifactError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("the requested entity does not exist")]
    EntityNotFound,

    #[error("the invite link has expired")]
    EntityExpired,

    #[error("an entry with this {field} already exists: {value}")]
    DuplicateEntry { field: String, value: String },

    #[error("the user is already a member of this room")]
    DuplicateRoomUser,

    #[error("this action requires the Admin role")]
    AdminPermissionRequired,

    #[error("this action requires message ownership or at least the Moderator role")]
    OwnershipOrModeratorRequired,

    #[error("this action requires room membership")]
    RoomMemberRequired,

    #[error("a room must keep at least one Admin")]
    RoomLeastOneAdminRequired,

    #[error("this action requires a verified email address")]
    VerifiedEmailRequired,

    #[error("the room has reached its member limit")]
    ExceedsRoomUserCount,

    #[error("the room has reached its channel limit")]
    ExceedsRoomChannelCount,

    #[error("the file exceeds the room's single-file size limit")]
    ExceedsSingleFileSize,

    #[error("the file would exceed the room's total storage limit")]
    ExceedsRoomTotalFilesLimit,

    #[error("the welcome message must contain the {{name}} placeholder")]
    InvalidJoinMessage,

    #[error("the supplied credentials are invalid")]
    InvalidCredentials,

    #[error("storage failure: {0}")]
    Store(String),

    #[error("artifact storage failure: {0}")]
    Artifact(String),
}

impl From<ArtifactError> for EngineError {
    fn from(e: ArtifactError) -> Self {
        EngineError::Artifact(e.to_string())
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => EngineError::EntityNotFound,
            StoreError::UniqueViolation { field, value } => {
                if field == "room_user" {
                    EngineError::DuplicateRoomUser
                } else {
                    EngineError::DuplicateEntry { field, value }
                }
            }
            StoreError::FkViolation { .. } => EngineError::EntityNotFound,
            StoreError::GuardViolated(guard) => {
                use crate::store::WriteGuard;
                match guard {
                    WriteGuard::MemberCountAtMost { .. } => EngineError::ExceedsRoomUserCount,
                    WriteGuard::ChannelCountAtMost { .. } => EngineError::ExceedsRoomChannelCount,
                    WriteGuard::FileBytesAtMost { .. } => EngineError::ExceedsRoomTotalFilesLimit,
                    WriteGuard::AdminCountAtLeast { .. } => EngineError::RoomLeastOneAdminRequired,
                }
            }
            StoreError::Unavailable(msg) => EngineError::Store(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_room::RoomId;
    use crate::store::WriteGuard;

    #[test]
    fn test_unique_violation_mapping() {
        let err: EngineError = StoreError::UniqueViolation {
            field: "room_name".to_string(),
            value: "alpha".to_string(),
        }
        .into();
        assert!(matches!(err, EngineError::DuplicateEntry { ref field, .. } if field == "room_name"));

        let err: EngineError = StoreError::UniqueViolation {
            field: "room_user".to_string(),
            value: "alice".to_string(),
        }
        .into();
        assert!(matches!(err, EngineError::DuplicateRoomUser));
    }

    #[test]
    fn test_guard_mapping() {
        let room_id = RoomId::generate();
        let err: EngineError =
            StoreError::GuardViolated(WriteGuard::AdminCountAtLeast { room_id, min: 1 }).into();
        assert!(matches!(err, EngineError::RoomLeastOneAdminRequired));

        let err: EngineError =
            StoreError::GuardViolated(WriteGuard::FileBytesAtMost { room_id, max: 0 }).into();
        assert!(matches!(err, EngineError::ExceedsRoomTotalFilesLimit));
    }

    #[test]
    fn test_messages_hide_backend_detail() {
        let err: EngineError = StoreError::FkViolation {
            field: "room_id".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "the requested entity does not exist");
    }
}
