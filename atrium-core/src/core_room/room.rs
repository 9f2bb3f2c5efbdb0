//! Room data structures: quota settings, join settings, roles, memberships

use super::file::ArtifactRef;
use super::types::{ChannelId, RoomId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Placeholder token substituted with the joining user's display name
pub const NAME_PLACEHOLDER: &str = "{name}";

/// A Room is the top-level tenant unit containing channels and memberships
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    /// Unique identifier
    pub id: RoomId,

    /// Globally unique, human-readable name
    pub name: String,

    /// Free-form category label
    pub category: String,

    /// Room rules text shown to members
    pub rules: String,

    /// Configured resource limits
    pub quotas: RoomQuotas,

    /// Join announcement configuration
    pub join_settings: JoinSettings,

    /// Optional avatar stored in the external artifact store
    pub avatar: Option<ArtifactRef>,

    /// When the Room was created
    pub created_at: Timestamp,

    /// Last time Room metadata was updated
    pub updated_at: Timestamp,
}

impl Room {
    /// Create a new Room with the given quota settings
    pub fn new(name: String, category: String, quotas: RoomQuotas) -> Self {
        let now = Timestamp::now();
        Room {
            id: RoomId::generate(),
            name,
            category,
            rules: String::new(),
            quotas,
            join_settings: JoinSettings::default(),
            avatar: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Configured upper bounds on a Room's resources
///
/// A value of zero for the day-based settings means "keep forever".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomQuotas {
    /// Maximum number of memberships
    pub max_users: u64,

    /// Maximum number of channels
    pub max_channels: u64,

    /// Cumulative byte budget for all stored files
    pub total_files_bytes_allowed: u64,

    /// Byte budget for any single stored file
    pub single_file_bytes_allowed: u64,

    /// Days before messages are eligible for the retention sweep
    pub message_days_to_live: u32,

    /// Days before files are eligible for the retention sweep
    pub file_days_to_live: u32,
}

impl Default for RoomQuotas {
    fn default() -> Self {
        RoomQuotas {
            max_users: 100,
            max_channels: 20,
            total_files_bytes_allowed: 100 * 1024 * 1024,
            single_file_bytes_allowed: 5 * 1024 * 1024,
            message_days_to_live: 0,
            file_days_to_live: 0,
        }
    }
}

/// Join announcement configuration for a Room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSettings {
    /// Welcome-message template; must contain the `{name}` placeholder
    pub welcome_message: String,

    /// Channel the welcome message is posted to; falls back to the room's
    /// oldest channel when unset
    pub announce_channel: Option<ChannelId>,
}

impl JoinSettings {
    /// Whether the template carries the required placeholder token
    pub fn has_placeholder(&self) -> bool {
        self.welcome_message.contains(NAME_PLACEHOLDER)
    }

    /// Render the welcome message for a joining user
    pub fn render(&self, display_name: &str) -> String {
        self.welcome_message.replace(NAME_PLACEHOLDER, display_name)
    }
}

impl Default for JoinSettings {
    fn default() -> Self {
        JoinSettings {
            welcome_message: format!("Welcome to the room, {}!", NAME_PLACEHOLDER),
            announce_channel: None,
        }
    }
}

/// Room-scoped roles
///
/// Role checks are exact: Admin does not imply Moderator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Can manage the room, its channels, invites and memberships
    Admin,
    /// Can edit and delete other members' messages
    Moderator,
    /// Default role, can participate in channels
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Moderator => "Moderator",
            Role::Member => "Member",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Admin" => Some(Role::Admin),
            "Moderator" => Some(Role::Moderator),
            "Member" => Some(Role::Member),
            _ => None,
        }
    }
}

/// The (user, room, role) relationship
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomMember {
    /// Owning Room
    pub room_id: RoomId,

    /// Member identity
    pub user_id: UserId,

    /// Role in the Room
    pub role: Role,

    /// When the member joined
    pub joined_at: Timestamp,
}

impl RoomMember {
    pub fn new(room_id: RoomId, user_id: UserId, role: Role) -> Self {
        RoomMember {
            room_id,
            user_id,
            role,
            joined_at: Timestamp::now(),
        }
    }
}
