//! Channel message data structures

use super::file::ArtifactRef;
use super::types::{ChannelId, MessageId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Who authored a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Author {
    /// A room member
    User(UserId),
    /// The system itself (join announcements and similar)
    System,
}

impl Author {
    /// The user behind the message, if any
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Author::User(id) => Some(id),
            Author::System => None,
        }
    }
}

/// A message posted to a Channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Unique identifier
    pub id: MessageId,

    /// Owning channel
    pub channel_id: ChannelId,

    /// Message author
    pub author: Author,

    /// Message body
    pub body: String,

    /// Optional upload stored in the external artifact store
    pub upload: Option<ArtifactRef>,

    /// When the message was posted
    pub created_at: Timestamp,

    /// Last time the body was edited
    pub updated_at: Timestamp,
}

impl ChannelMessage {
    /// Create a new user-authored message
    pub fn new(channel_id: ChannelId, author: UserId, body: String) -> Self {
        let now = Timestamp::now();
        ChannelMessage {
            id: MessageId::generate(),
            channel_id,
            author: Author::User(author),
            body,
            upload: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a system-authored message
    pub fn system(channel_id: ChannelId, body: String) -> Self {
        let now = Timestamp::now();
        ChannelMessage {
            id: MessageId::generate(),
            channel_id,
            author: Author::System,
            body,
            upload: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message() {
        let channel_id = ChannelId::generate();
        let alice = UserId::new("alice");
        let msg = ChannelMessage::new(channel_id, alice.clone(), "hello".to_string());

        assert_eq!(msg.author.user_id(), Some(&alice));
        assert_eq!(msg.body, "hello");
        assert!(msg.upload.is_none());
    }

    #[test]
    fn test_system_message_has_no_user() {
        let msg = ChannelMessage::system(ChannelId::generate(), "alice joined".to_string());
        assert_eq!(msg.author, Author::System);
        assert_eq!(msg.author.user_id(), None);
    }
}
