//! Identifier and time primitives for rooms and their owned entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Defines a 32-byte random identifier newtype with hex display.
macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Create a new random identifier
            pub fn generate() -> Self {
                use rand::RngCore;
                let mut id = [0u8; 32];
                rand::rng().fill_bytes(&mut id);
                $name(id)
            }

            /// Create an identifier from raw bytes
            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                $name(bytes)
            }

            /// Get bytes representation
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Parse from a hex string
            pub fn from_hex(s: &str) -> Option<Self> {
                let bytes = hex::decode(s).ok()?;
                if bytes.len() != 32 {
                    return None;
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                Some($name(arr))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                $name(bytes)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a Room
    RoomId
);
define_id!(
    /// Unique identifier for a Channel
    ChannelId
);
define_id!(
    /// Unique identifier for a ChannelMessage
    MessageId
);
define_id!(
    /// Unique identifier for a RoomInviteLink
    InviteId
);
define_id!(
    /// Unique identifier for a RoomFile record
    FileId
);

/// Opaque user identity, owned by the identity subsystem
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Create a timestamp representing the current time
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_millis() as u64)
    }

    /// Create a timestamp from milliseconds since epoch
    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    /// Get milliseconds since epoch
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// The timestamp `days` whole days earlier, saturating at the epoch
    pub fn days_earlier(&self, days: u32) -> Self {
        const DAY_MILLIS: u64 = 24 * 60 * 60 * 1000;
        Timestamp(self.0.saturating_sub(days as u64 * DAY_MILLIS))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_generation() {
        let id1 = RoomId::generate();
        let id2 = RoomId::generate();
        assert_ne!(id1, id2, "Generated IDs should be unique");
    }

    #[test]
    fn test_id_hex_round_trip() {
        let original = ChannelId::generate();
        let restored = ChannelId::from_hex(&original.to_string()).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn test_id_from_hex_rejects_wrong_length() {
        assert!(MessageId::from_hex("abcd").is_none());
        assert!(MessageId::from_hex("not hex at all").is_none());
    }

    #[test]
    fn test_id_display() {
        let id = FileId::from_bytes([0xAB; 32]);
        let display = format!("{}", id);
        assert_eq!(display.len(), 64); // 32 bytes * 2 hex chars
        assert!(display.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_timestamp_days_earlier() {
        let now = Timestamp::from_millis(10 * 24 * 60 * 60 * 1000);
        let earlier = now.days_earlier(3);
        assert_eq!(earlier.as_millis(), 7 * 24 * 60 * 60 * 1000);

        // Saturates instead of wrapping
        assert_eq!(now.days_earlier(100).as_millis(), 0);
    }
}
