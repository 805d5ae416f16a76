use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub match_id: String,
    pub message_id: String,
    pub sender_identity: String,
    pub sender_handle: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(match_id: &str, sender_identity: &str, sender_handle: &str, text: &str) -> Self {
        ChatMessage {
            match_id: match_id.to_string(),
            message_id: Uuid::new_v4().to_string(),
            sender_identity: sender_identity.to_string(),
            sender_handle: sender_handle.to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Channel order: creation time, ties broken by message id.
    pub fn order_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, self.message_id.as_str())
    }
}

/// Sorts oldest first and keeps only the `limit` most recent messages.
pub fn most_recent(mut messages: Vec<ChatMessage>, limit: usize) -> Vec<ChatMessage> {
    messages.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    let skip = messages.len().saturating_sub(limit);
    messages.split_off(skip)
}
