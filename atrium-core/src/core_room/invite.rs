//! Room invite links

use super::types::{InviteId, RoomId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// A shareable, optionally expiring link granting Member-role join rights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomInviteLink {
    /// Unique identifier
    pub id: InviteId,

    /// Owning Room
    pub room_id: RoomId,

    /// Shareable code embedded in the link URL
    pub code: String,

    /// Who created the link
    pub created_by: UserId,

    /// Optional expiration time; `None` never expires
    pub expires_at: Option<Timestamp>,

    /// When the link was created
    pub created_at: Timestamp,
}

impl RoomInviteLink {
    /// Create a new invite link for a Room
    pub fn new(room_id: RoomId, created_by: UserId, expires_at: Option<Timestamp>) -> Self {
        RoomInviteLink {
            id: InviteId::generate(),
            room_id,
            code: Self::generate_code(),
            created_by,
            expires_at,
            created_at: Timestamp::now(),
        }
    }

    /// Whether the link has passed its expiry at the given instant
    pub fn is_expired(&self, now: Timestamp) -> bool {
        match self.expires_at {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }

    /// Generate a random share code
    fn generate_code() -> String {
        use rand::Rng;
        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        const CODE_LEN: usize = 12;

        let mut rng = rand::rng();
        (0..CODE_LEN)
            .map(|_| {
                let idx = rng.random_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_invite_is_not_expired() {
        let invite = RoomInviteLink::new(RoomId::generate(), UserId::new("alice"), None);
        assert!(!invite.is_expired(Timestamp::now()));
        assert_eq!(invite.code.len(), 12);
        assert!(invite.code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_expiry_boundary() {
        let expiry = Timestamp::from_millis(1_000);
        let invite = RoomInviteLink::new(
            RoomId::generate(),
            UserId::new("alice"),
            Some(expiry),
        );

        // Exactly at the expiry instant is still valid; only past it expires
        assert!(!invite.is_expired(Timestamp::from_millis(1_000)));
        assert!(invite.is_expired(Timestamp::from_millis(1_001)));
    }

    #[test]
    fn test_codes_are_unique() {
        let a = RoomInviteLink::new(RoomId::generate(), UserId::new("alice"), None);
        let b = RoomInviteLink::new(RoomId::generate(), UserId::new("alice"), None);
        assert_ne!(a.code, b.code);
    }
}
