//! Support conversation models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use concierge_core::{ConversationId, ConversationOrigin, ConversationStatus, SupportMessageId, UserId};

/// A support conversation thread.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: ConversationId,
    /// The user the conversation belongs to.
    pub user_id: UserId,
    pub subject: String,
    pub status: ConversationStatus,
    /// Agent currently assigned, if any.
    pub assigned_to: Option<UserId>,
    pub origin: ConversationOrigin,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message within a support conversation.
#[derive(Debug, Clone, Serialize)]
pub struct SupportMessage {
    pub id: SupportMessageId,
    pub conversation_id: ConversationId,
    /// `None` for system messages (e.g. the handoff transcript summary).
    pub author_id: Option<UserId>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
