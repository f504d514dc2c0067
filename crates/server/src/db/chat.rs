//! Database operations for assistant chat sessions and messages.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use concierge_core::{ChatMessageId, ChatRole, ChatSessionId, UserId};

use super::RepositoryError;
use crate::models::{ChatMessage, ChatSession};

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for `PostgreSQL` chat session queries.
#[derive(Debug, sqlx::FromRow)]
struct ChatSessionRow {
    id: i32,
    user_id: i32,
    title: Option<String>,
    handed_off: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ChatSessionRow> for ChatSession {
    fn from(row: ChatSessionRow) -> Self {
        Self {
            id: ChatSessionId::new(row.id),
            user_id: UserId::new(row.user_id),
            title: row.title,
            handed_off: row.handed_off,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Internal row type for `PostgreSQL` chat message queries.
#[derive(Debug, sqlx::FromRow)]
struct ChatMessageRow {
    id: i32,
    chat_session_id: i32,
    role: String,
    content: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<ChatMessageRow> for ChatMessage {
    type Error = RepositoryError;

    fn try_from(row: ChatMessageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ChatMessageId::new(row.id),
            chat_session_id: ChatSessionId::new(row.chat_session_id),
            role: row.role.parse::<ChatRole>().map_err(RepositoryError::corrupt)?,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

const SESSION_COLUMNS: &str = "id, user_id, title, handed_off, created_at, updated_at";

// =============================================================================
// Repository
// =============================================================================

/// Repository for assistant chat database operations.
pub struct ChatRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ChatRepository<'a> {
    /// Create a new chat repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a new chat session.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create_session(&self, user_id: UserId) -> Result<ChatSession, RepositoryError> {
        let row = sqlx::query_as::<_, ChatSessionRow>(&format!(
            "INSERT INTO chat_sessions (user_id)
             VALUES ($1)
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(user_id.as_i32())
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// Get a chat session by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_session(
        &self,
        id: ChatSessionId,
    ) -> Result<Option<ChatSession>, RepositoryError> {
        let row = sqlx::query_as::<_, ChatSessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// List chat sessions for a user.
    ///
    /// Returns sessions ordered by last update (most recent first).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_sessions(&self, user_id: UserId) -> Result<Vec<ChatSession>, RepositoryError> {
        let rows = sqlx::query_as::<_, ChatSessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions
             WHERE user_id = $1
             ORDER BY updated_at DESC"
        ))
        .bind(user_id.as_i32())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Update a session's title.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the session doesn't exist.
    pub async fn update_session_title(
        &self,
        id: ChatSessionId,
        title: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE chat_sessions SET title = $1 WHERE id = $2")
            .bind(title)
            .bind(id.as_i32())
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    /// Mark a session as handed off to a human agent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the session doesn't exist.
    pub async fn mark_handed_off(&self, id: ChatSessionId) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE chat_sessions SET handed_off = TRUE, updated_at = now() WHERE id = $1",
        )
        .bind(id.as_i32())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    /// Add a message to a chat session and bump its activity timestamp.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn add_message(
        &self,
        chat_session_id: ChatSessionId,
        role: ChatRole,
        content: serde_json::Value,
    ) -> Result<ChatMessage, RepositoryError> {
        let row = sqlx::query_as::<_, ChatMessageRow>(
            "INSERT INTO chat_messages (chat_session_id, role, content)
             VALUES ($1, $2, $3)
             RETURNING id, chat_session_id, role, content, created_at",
        )
        .bind(chat_session_id.as_i32())
        .bind(role.as_str())
        .bind(content)
        .fetch_one(self.pool)
        .await?;

        sqlx::query("UPDATE chat_sessions SET updated_at = now() WHERE id = $1")
            .bind(chat_session_id.as_i32())
            .execute(self.pool)
            .await?;

        row.try_into()
    }

    /// Get all messages for a chat session.
    ///
    /// Returns messages ordered by creation time (oldest first).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_messages(
        &self,
        chat_session_id: ChatSessionId,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query_as::<_, ChatMessageRow>(
            "SELECT id, chat_session_id, role, content, created_at
             FROM chat_messages
             WHERE chat_session_id = $1
             ORDER BY created_at ASC",
        )
        .bind(chat_session_id.as_i32())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Delete a chat session and all its messages.
    ///
    /// # Returns
    ///
    /// Returns `true` if the session was deleted, `false` if it didn't exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_session(&self, id: ChatSessionId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = $1")
            .bind(id.as_i32())
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
