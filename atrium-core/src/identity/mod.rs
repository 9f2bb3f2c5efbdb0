//! Identity provider seam
//!
//! The engine only reads identity: who a credential belongs to, whether the
//! user's email is verified, and a display name for join announcements. The
//! actual credential machinery (hashing, token issuance) lives elsewhere.

use crate::core_room::UserId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Capability contract consumed from the identity subsystem
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a credential to a user identity, or `None` when invalid
    async fn verify_and_decode(&self, credential: &str) -> Option<UserId>;

    /// Whether the user's email-verification record exists and is verified
    async fn is_verified(&self, user_id: &UserId) -> bool;

    /// Display name for join announcements; falls back to the raw id
    async fn display_name(&self, user_id: &UserId) -> String;
}

#[derive(Clone)]
struct LocalUser {
    credential: String,
    verified: bool,
    display_name: String,
}

/// In-memory identity registry for tests and the harness
#[derive(Default)]
pub struct LocalIdentity {
    users: Mutex<HashMap<UserId, LocalUser>>,
}

impl LocalIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with a plain-text credential
    pub fn register(&self, user_id: UserId, credential: &str, display_name: &str, verified: bool) {
        self.users.lock().unwrap().insert(
            user_id,
            LocalUser {
                credential: credential.to_string(),
                verified,
                display_name: display_name.to_string(),
            },
        );
    }

    /// Flip a user's verification flag
    pub fn set_verified(&self, user_id: &UserId, verified: bool) {
        if let Some(user) = self.users.lock().unwrap().get_mut(user_id) {
            user.verified = verified;
        }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
    async fn verify_and_decode(&self, credential: &str) -> Option<UserId> {
        let users = self.users.lock().unwrap();
        users
            .iter()
            .find(|(_, u)| u.credential == credential)
            .map(|(id, _)| id.clone())
    }

    async fn is_verified(&self, user_id: &UserId) -> bool {
        self.users
            .lock()
            .unwrap()
            .get(user_id)
            .map(|u| u.verified)
            .unwrap_or(false)
    }

    async fn display_name(&self, user_id: &UserId) -> String {
        self.users
            .lock()
            .unwrap()
            .get(user_id)
            .map(|u| u.display_name.clone())
            .unwrap_or_else(|| user_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_decode_and_verification() {
        let identity = LocalIdentity::new();
        let alice = UserId::new("alice");
        identity.register(alice.clone(), "token-a", "Alice", true);

        assert_eq!(identity.verify_and_decode("token-a").await, Some(alice.clone()));
        assert_eq!(identity.verify_and_decode("bogus").await, None);
        assert!(identity.is_verified(&alice).await);
        assert_eq!(identity.display_name(&alice).await, "Alice");

        identity.set_verified(&alice, false);
        assert!(!identity.is_verified(&alice).await);
    }

    #[tokio::test]
    async fn test_unknown_user_is_unverified() {
        let identity = LocalIdentity::new();
        let ghost = UserId::new("ghost");
        assert!(!identity.is_verified(&ghost).await);
        assert_eq!(identity.display_name(&ghost).await, "ghost");
    }
}
