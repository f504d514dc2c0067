//! Chat service for orchestrating assistant conversations.
//!
//! Handles the complete flow of:
//! 1. Saving user messages
//! 2. Handoff detection over the transcript
//! 3. Calling the Claude API (blocking or streaming)
//! 4. Saving assistant responses

use async_stream::stream;
use futures::Stream;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{instrument, warn};

use concierge_core::{ChatRole, ChatSessionId, ConversationOrigin, UserId};

use crate::claude::{ClaudeClient, ClaudeError, ContentBlockDelta, Message, StreamEvent};
use crate::db::{ChatRepository, ConversationRepository, RepositoryError, UserRepository};
use crate::models::{ChatMessage, ChatSession, Conversation};

use super::handoff::{self, HandoffDecision};

/// System prompt for the assistant.
const SYSTEM_PROMPT: &str = "You are Concierge, the support assistant for this platform. \
Answer questions about accounts, apps, and support tickets concisely and accurately. \
If you cannot help, say so plainly; a human agent can take over.";

/// Maximum characters of a first message used as the session title.
const TITLE_MAX_CHARS: usize = 80;

/// How many trailing transcript turns are copied into a handoff summary.
const HANDOFF_TRANSCRIPT_TAIL: usize = 10;

/// Errors that can occur in the chat service.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] RepositoryError),

    /// Claude API error.
    #[error("Claude API error: {0}")]
    Claude(#[from] ClaudeError),

    /// Session not found (or owned by another user).
    #[error("session not found")]
    SessionNotFound,

    /// The session has been handed off to a human agent.
    #[error("session handed off to a human agent")]
    HandedOff,
}

/// Outcome of sending a message.
#[derive(Debug)]
pub enum SendOutcome {
    /// The assistant replied.
    Reply {
        user_message: ChatMessage,
        assistant_message: ChatMessage,
    },
    /// The message triggered a handoff; no assistant turn happened.
    Handoff {
        user_message: ChatMessage,
        conversation: Conversation,
        decision: HandoffDecision,
    },
}

/// Events emitted while streaming an assistant reply to the browser.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    /// Incremental assistant text.
    Delta { text: String },
    /// The session escalated to a human agent.
    Handoff { conversation_id: i32 },
    /// Something went wrong; the stream ends after this.
    Error { message: String },
    /// The turn completed; the assistant message was persisted.
    Done { message_id: Option<i32> },
}

/// Chat service for orchestrating assistant conversations.
pub struct ChatService<'a> {
    pool: &'a PgPool,
    claude: &'a ClaudeClient,
}

impl<'a> ChatService<'a> {
    /// Create a new chat service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, claude: &'a ClaudeClient) -> Self {
        Self { pool, claude }
    }

    /// Create a new chat session for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn create_session(&self, user_id: UserId) -> Result<ChatSession, ChatError> {
        let repo = ChatRepository::new(self.pool);
        Ok(repo.create_session(user_id).await?)
    }

    /// Get a session owned by the given user.
    ///
    /// Sessions belonging to other users are reported as missing rather than
    /// forbidden, so session IDs don't leak.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::SessionNotFound` if missing or owned by someone else.
    pub async fn get_owned_session(
        &self,
        session_id: ChatSessionId,
        user_id: UserId,
    ) -> Result<ChatSession, ChatError> {
        let repo = ChatRepository::new(self.pool);
        let session = repo
            .get_session(session_id)
            .await?
            .ok_or(ChatError::SessionNotFound)?;

        if session.user_id != user_id {
            return Err(ChatError::SessionNotFound);
        }

        Ok(session)
    }

    /// List chat sessions for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn list_sessions(&self, user_id: UserId) -> Result<Vec<ChatSession>, ChatError> {
        let repo = ChatRepository::new(self.pool);
        Ok(repo.list_sessions(user_id).await?)
    }

    /// Get all messages in a session owned by the user.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is missing or a query fails.
    pub async fn get_messages(
        &self,
        session_id: ChatSessionId,
        user_id: UserId,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        self.get_owned_session(session_id, user_id).await?;
        let repo = ChatRepository::new(self.pool);
        Ok(repo.get_messages(session_id).await?)
    }

    /// Delete a session owned by the user.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is missing or a query fails.
    pub async fn delete_session(
        &self,
        session_id: ChatSessionId,
        user_id: UserId,
    ) -> Result<(), ChatError> {
        self.get_owned_session(session_id, user_id).await?;
        let repo = ChatRepository::new(self.pool);
        repo.delete_session(session_id).await?;
        Ok(())
    }

    /// Send a message and wait for the complete assistant reply.
    ///
    /// Runs handoff detection first; on a handoff no model call is made and
    /// a support conversation is created instead.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails, including `ChatError::HandedOff`
    /// for sessions already escalated.
    #[instrument(skip(self, user_message), fields(session_id = %session_id))]
    pub async fn send_message(
        &self,
        session_id: ChatSessionId,
        user_id: UserId,
        user_message: &str,
    ) -> Result<SendOutcome, ChatError> {
        let prepared = self.prepare_turn(session_id, user_id, user_message).await?;

        match prepared {
            PreparedTurn::Handoff {
                user_message,
                conversation,
                decision,
            } => Ok(SendOutcome::Handoff {
                user_message,
                conversation,
                decision,
            }),
            PreparedTurn::Continue {
                user_message,
                history,
            } => {
                let response = self
                    .claude
                    .chat(history, Some(SYSTEM_PROMPT.to_string()))
                    .await?;

                let repo = ChatRepository::new(self.pool);
                let assistant_message = repo
                    .add_message(
                        session_id,
                        ChatRole::Assistant,
                        serde_json::json!({ "text": response.text() }),
                    )
                    .await?;

                Ok(SendOutcome::Reply {
                    user_message,
                    assistant_message,
                })
            }
        }
    }

    /// Shared first half of a turn: ownership check, persistence of the user
    /// message, title derivation, activity bump, and handoff detection.
    async fn prepare_turn(
        &self,
        session_id: ChatSessionId,
        user_id: UserId,
        user_message: &str,
    ) -> Result<PreparedTurn, ChatError> {
        let session = self.get_owned_session(session_id, user_id).await?;
        if session.handed_off {
            return Err(ChatError::HandedOff);
        }

        let repo = ChatRepository::new(self.pool);
        let transcript = repo.get_messages(session_id).await?;

        let saved = repo
            .add_message(
                session_id,
                ChatRole::User,
                serde_json::json!({ "text": user_message }),
            )
            .await?;

        // First message names the session.
        if transcript.is_empty() {
            repo.update_session_title(session_id, &derive_title(user_message))
                .await?;
        }

        UserRepository::new(self.pool)
            .touch_last_active(user_id)
            .await?;

        let previous_user_texts: Vec<&str> = transcript
            .iter()
            .filter(|m| m.role == ChatRole::User)
            .filter_map(ChatMessage::text)
            .collect();

        if let Some(decision) = handoff::detect(user_message, &previous_user_texts) {
            let conversation = self
                .escalate(&session, &transcript, user_message, &decision)
                .await?;
            return Ok(PreparedTurn::Handoff {
                user_message: saved,
                conversation,
                decision,
            });
        }

        let mut history: Vec<Message> = transcript.iter().filter_map(to_claude_message).collect();
        history.push(Message::user(user_message));

        Ok(PreparedTurn::Continue {
            user_message: saved,
            history,
        })
    }

    /// Mark the session handed off and open a support conversation seeded
    /// with a transcript summary.
    async fn escalate(
        &self,
        session: &ChatSession,
        transcript: &[ChatMessage],
        new_message: &str,
        decision: &HandoffDecision,
    ) -> Result<Conversation, ChatError> {
        let chat_repo = ChatRepository::new(self.pool);
        chat_repo.mark_handed_off(session.id).await?;

        let subject = session
            .title
            .clone()
            .unwrap_or_else(|| derive_title(new_message));

        let conversations = ConversationRepository::new(self.pool);
        let conversation = conversations
            .create(session.user_id, &subject, ConversationOrigin::Handoff)
            .await?;

        conversations
            .add_message(
                conversation.id,
                None,
                &handoff_summary(session, transcript, new_message, decision),
            )
            .await?;

        Ok(conversation)
    }
}

/// Intermediate result of preparing a turn.
enum PreparedTurn {
    Continue {
        user_message: ChatMessage,
        history: Vec<Message>,
    },
    Handoff {
        user_message: ChatMessage,
        conversation: Conversation,
        decision: HandoffDecision,
    },
}

/// Send a message and stream the assistant reply as it is generated.
///
/// Owned arguments because the stream outlives the request handler's
/// borrows; all of them are cheap clones.
pub fn stream_chat_message(
    pool: PgPool,
    claude: ClaudeClient,
    session_id: ChatSessionId,
    user_id: UserId,
    user_message: String,
) -> impl Stream<Item = ChatStreamEvent> {
    stream! {
        use futures::StreamExt;

        let service = ChatService::new(&pool, &claude);
        let prepared = match service.prepare_turn(session_id, user_id, &user_message).await {
            Ok(prepared) => prepared,
            Err(e) => {
                yield ChatStreamEvent::Error { message: e.to_string() };
                return;
            }
        };

        let history = match prepared {
            PreparedTurn::Handoff { conversation, .. } => {
                yield ChatStreamEvent::Handoff { conversation_id: conversation.id.as_i32() };
                yield ChatStreamEvent::Done { message_id: None };
                return;
            }
            PreparedTurn::Continue { history, .. } => history,
        };

        let upstream = match claude.chat_stream(history, Some(SYSTEM_PROMPT.to_string())).await {
            Ok(upstream) => upstream,
            Err(e) => {
                yield ChatStreamEvent::Error { message: e.to_string() };
                return;
            }
        };

        let mut upstream = std::pin::pin!(upstream);
        let mut accumulated = String::new();

        while let Some(event) = upstream.next().await {
            match event {
                Ok(StreamEvent::ContentBlockDelta { delta, .. }) => {
                    let ContentBlockDelta::TextDelta { text } = delta;
                    accumulated.push_str(&text);
                    yield ChatStreamEvent::Delta { text };
                }
                Ok(StreamEvent::Error { error }) => {
                    warn!(error_type = %error.error_type, "Claude stream error");
                    yield ChatStreamEvent::Error { message: error.message };
                    return;
                }
                Ok(_) => {} // starts, stops, pings
                Err(e) => {
                    yield ChatStreamEvent::Error { message: e.to_string() };
                    return;
                }
            }
        }

        // Persist the completed assistant turn.
        let repo = ChatRepository::new(&pool);
        match repo
            .add_message(
                session_id,
                ChatRole::Assistant,
                serde_json::json!({ "text": accumulated }),
            )
            .await
        {
            Ok(message) => {
                yield ChatStreamEvent::Done { message_id: Some(message.id.as_i32()) };
            }
            Err(e) => {
                yield ChatStreamEvent::Error { message: e.to_string() };
            }
        }
    }
}

/// Convert a stored chat message to a Claude API message.
fn to_claude_message(message: &ChatMessage) -> Option<Message> {
    let text = message.text()?;
    Some(match message.role {
        ChatRole::User => Message::user(text),
        ChatRole::Assistant => Message::assistant(text),
    })
}

/// Derive a session title from the first user message.
fn derive_title(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        return trimmed.to_string();
    }

    let cut: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    format!("{}…", cut.trim_end())
}

/// Build the system message seeding a handoff conversation.
fn handoff_summary(
    session: &ChatSession,
    transcript: &[ChatMessage],
    new_message: &str,
    decision: &HandoffDecision,
) -> String {
    let mut summary = format!(
        "Escalated from assistant chat session {} ({:?}: {}).\nRecent transcript:\n",
        session.id, decision.reason, decision.signal
    );

    let tail = transcript
        .iter()
        .rev()
        .take(HANDOFF_TRANSCRIPT_TAIL)
        .collect::<Vec<_>>();
    for message in tail.into_iter().rev() {
        if let Some(text) = message.text() {
            summary.push_str(&format!("- {}: {text}\n", message.role.as_str()));
        }
    }
    summary.push_str(&format!("- user: {new_message}\n"));

    summary
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use concierge_core::ChatMessageId;

    fn message(role: ChatRole, text: &str) -> ChatMessage {
        ChatMessage {
            id: ChatMessageId::new(1),
            chat_session_id: ChatSessionId::new(1),
            role,
            content: serde_json::json!({ "text": text }),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_derive_title_short() {
        assert_eq!(derive_title("  Where is my invoice?  "), "Where is my invoice?");
    }

    #[test]
    fn test_derive_title_truncates_on_char_boundary() {
        let long = "å".repeat(200);
        let title = derive_title(&long);
        assert!(title.chars().count() <= TITLE_MAX_CHARS + 1);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn test_to_claude_message_roles() {
        let user = to_claude_message(&message(ChatRole::User, "hi")).unwrap();
        assert_eq!(user.role, "user");
        let assistant = to_claude_message(&message(ChatRole::Assistant, "hello")).unwrap();
        assert_eq!(assistant.role, "assistant");
    }

    #[test]
    fn test_handoff_summary_includes_tail_and_signal() {
        let session = ChatSession {
            id: ChatSessionId::new(5),
            user_id: UserId::new(1),
            title: Some("Billing question".to_string()),
            handed_off: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let transcript = vec![
            message(ChatRole::User, "where is my invoice"),
            message(ChatRole::Assistant, "let me check"),
        ];
        let decision = HandoffDecision {
            reason: super::super::handoff::HandoffReason::ExplicitRequest,
            signal: "escalate".to_string(),
        };

        let summary = handoff_summary(&session, &transcript, "please escalate", &decision);
        assert!(summary.contains("session 5"));
        assert!(summary.contains("escalate"));
        assert!(summary.contains("- user: where is my invoice"));
        assert!(summary.contains("- assistant: let me check"));
        assert!(summary.contains("- user: please escalate"));
    }

    #[test]
    fn test_chat_stream_event_serialization() {
        let json = serde_json::to_value(ChatStreamEvent::Delta {
            text: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "delta");

        let json = serde_json::to_value(ChatStreamEvent::Handoff { conversation_id: 3 }).unwrap();
        assert_eq!(json["type"], "handoff");
        assert_eq!(json["conversation_id"], 3);
    }
}
