//! Assistant chat transcript models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use concierge_core::{ChatMessageId, ChatRole, ChatSessionId, UserId};

/// An assistant chat session.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSession {
    pub id: ChatSessionId,
    pub user_id: UserId,
    /// Derived from the first user message.
    pub title: Option<String>,
    /// Set once the session escalates to a human agent; further assistant
    /// turns are refused.
    pub handed_off: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message within an assistant chat session.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: ChatMessageId,
    pub chat_session_id: ChatSessionId,
    pub role: ChatRole,
    /// JSONB content, `{"text": "..."}` for plain turns.
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// The plain-text body of the message, if present.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.content.get("text").and_then(|v| v.as_str())
    }
}
