//! Private message model
//!
//! A message is shared by two parties. Each party deletes it independently;
//! the row itself is only removed once both have.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub id: i64,
    pub subject: String,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub content: String,
    pub content_html: String,
    pub sent_at: DateTime<Utc>,
    pub sender_deleted_at: Option<DateTime<Utc>>,
    pub recipient_deleted_at: Option<DateTime<Utc>>,
}

impl PrivateMessage {
    pub fn is_participant(&self, user_id: i64) -> bool {
        self.sender_id == user_id || self.recipient_id == user_id
    }

    /// Whether the message still shows up for `user_id` in at least one box.
    pub fn is_visible_to(&self, user_id: i64) -> bool {
        (self.sender_id == user_id && self.sender_deleted_at.is_none())
            || (self.recipient_id == user_id && self.recipient_deleted_at.is_none())
    }

    /// The party a reply from `user_id` goes to.
    pub fn other_party(&self, user_id: i64) -> i64 {
        if self.sender_id == user_id {
            self.recipient_id
        } else {
            self.sender_id
        }
    }

    /// Subject pre-filled in the reply form.
    pub fn reply_subject(&self) -> String {
        format!("Re: {}", self.subject)
    }
}

/// Which side of the conversation a listing shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageBox {
    Inbox,
    Outbox,
}

/// Message joined with both parties' usernames
#[derive(Debug, Clone, Serialize)]
pub struct MessageWithMeta {
    #[serde(flatten)]
    pub message: PrivateMessage,
    pub sender_username: String,
    pub recipient_username: String,
}

#[derive(Debug, Clone)]
pub struct CreateMessageInput {
    pub recipient_id: i64,
    pub subject: String,
    pub content: String,
}

impl CreateMessageInput {
    pub fn new(recipient_id: i64, subject: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            recipient_id,
            subject: subject.into(),
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender_id: i64, recipient_id: i64) -> PrivateMessage {
        PrivateMessage {
            id: 1,
            subject: "Bonjour".into(),
            sender_id,
            recipient_id,
            content: "Salut".into(),
            content_html: "<p>Salut</p>".into(),
            sent_at: Utc::now(),
            sender_deleted_at: None,
            recipient_deleted_at: None,
        }
    }

    #[test]
    fn test_participants() {
        let msg = message(1, 2);
        assert!(msg.is_participant(1));
        assert!(msg.is_participant(2));
        assert!(!msg.is_participant(3));
        assert_eq!(msg.other_party(1), 2);
        assert_eq!(msg.other_party(2), 1);
    }

    #[test]
    fn test_visibility_after_one_side_deletes() {
        let mut msg = message(1, 2);
        msg.sender_deleted_at = Some(Utc::now());
        assert!(!msg.is_visible_to(1));
        assert!(msg.is_visible_to(2));
        assert!(!msg.is_visible_to(3));
    }

    #[test]
    fn test_message_to_self_visible_until_both_flags_set() {
        let mut msg = message(1, 1);
        msg.recipient_deleted_at = Some(Utc::now());
        assert!(msg.is_visible_to(1));
        msg.sender_deleted_at = Some(Utc::now());
        assert!(!msg.is_visible_to(1));
    }

    #[test]
    fn test_reply_subject() {
        assert_eq!(message(1, 2).reply_subject(), "Re: Bonjour");
    }
}
