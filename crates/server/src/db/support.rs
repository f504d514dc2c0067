//! Database operations for support conversations and messages.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use concierge_core::{
    ConversationId, ConversationOrigin, ConversationStatus, SupportMessageId, UserId,
};

use super::RepositoryError;
use crate::models::{Conversation, SupportMessage};

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for `PostgreSQL` conversation queries.
#[derive(Debug, sqlx::FromRow)]
struct ConversationRow {
    id: i32,
    user_id: i32,
    subject: String,
    status: String,
    assigned_to: Option<i32>,
    origin: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = RepositoryError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ConversationId::new(row.id),
            user_id: UserId::new(row.user_id),
            subject: row.subject,
            status: row
                .status
                .parse::<ConversationStatus>()
                .map_err(RepositoryError::corrupt)?,
            assigned_to: row.assigned_to.map(UserId::new),
            origin: row
                .origin
                .parse::<ConversationOrigin>()
                .map_err(RepositoryError::corrupt)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Internal row type for `PostgreSQL` support message queries.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i32,
    conversation_id: i32,
    author_id: Option<i32>,
    body: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for SupportMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            id: SupportMessageId::new(row.id),
            conversation_id: ConversationId::new(row.conversation_id),
            author_id: row.author_id.map(UserId::new),
            body: row.body,
            created_at: row.created_at,
        }
    }
}

const CONVERSATION_COLUMNS: &str =
    "id, user_id, subject, status, assigned_to, origin, created_at, updated_at";

/// Filters for listing conversations.
#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    pub status: Option<ConversationStatus>,
    pub assigned_to: Option<UserId>,
    pub user_id: Option<UserId>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for support conversation database operations.
pub struct ConversationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ConversationRepository<'a> {
    /// Create a new conversation repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a new conversation.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        user_id: UserId,
        subject: &str,
        origin: ConversationOrigin,
    ) -> Result<Conversation, RepositoryError> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "INSERT INTO conversations (user_id, subject, origin)
             VALUES ($1, $2, $3)
             RETURNING {CONVERSATION_COLUMNS}"
        ))
        .bind(user_id.as_i32())
        .bind(subject)
        .bind(origin.as_str())
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }

    /// Get a conversation by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ConversationId) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// List conversations matching a filter, most recently active first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &ConversationFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let rows = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE ($1::text IS NULL OR status = $1)
               AND ($2::int4 IS NULL OR assigned_to = $2)
               AND ($3::int4 IS NULL OR user_id = $3)
             ORDER BY updated_at DESC
             LIMIT $4 OFFSET $5"
        ))
        .bind(filter.status.map(ConversationStatus::as_str))
        .bind(filter.assigned_to.map(|u| u.as_i32()))
        .bind(filter.user_id.map(|u| u.as_i32()))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Count conversations matching a filter.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self, filter: &ConversationFilter) -> Result<i64, RepositoryError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM conversations
             WHERE ($1::text IS NULL OR status = $1)
               AND ($2::int4 IS NULL OR assigned_to = $2)
               AND ($3::int4 IS NULL OR user_id = $3)",
        )
        .bind(filter.status.map(ConversationStatus::as_str))
        .bind(filter.assigned_to.map(|u| u.as_i32()))
        .bind(filter.user_id.map(|u| u.as_i32()))
        .fetch_one(self.pool)
        .await?;

        Ok(count.0)
    }

    /// Update a conversation's status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the conversation doesn't exist.
    pub async fn update_status(
        &self,
        id: ConversationId,
        status: ConversationStatus,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE conversations SET status = $1, updated_at = now() WHERE id = $2")
                .bind(status.as_str())
                .bind(id.as_i32())
                .execute(self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    /// Assign (or unassign) a conversation to an agent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the conversation doesn't exist.
    pub async fn assign(
        &self,
        id: ConversationId,
        assignee: Option<UserId>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE conversations SET assigned_to = $1, updated_at = now() WHERE id = $2",
        )
        .bind(assignee.map(|u| u.as_i32()))
        .bind(id.as_i32())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    /// Delete a conversation and its messages.
    ///
    /// # Returns
    ///
    /// Returns `true` if the conversation was deleted, `false` if it didn't exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: ConversationId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(id.as_i32())
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Add a message to a conversation and bump its activity timestamp.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn add_message(
        &self,
        conversation_id: ConversationId,
        author_id: Option<UserId>,
        body: &str,
    ) -> Result<SupportMessage, RepositoryError> {
        let row = sqlx::query_as::<_, MessageRow>(
            "INSERT INTO support_messages (conversation_id, author_id, body)
             VALUES ($1, $2, $3)
             RETURNING id, conversation_id, author_id, body, created_at",
        )
        .bind(conversation_id.as_i32())
        .bind(author_id.map(|u| u.as_i32()))
        .bind(body)
        .fetch_one(self.pool)
        .await?;

        sqlx::query("UPDATE conversations SET updated_at = now() WHERE id = $1")
            .bind(conversation_id.as_i32())
            .execute(self.pool)
            .await?;

        Ok(row.into())
    }

    /// Get all messages in a conversation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<SupportMessage>, RepositoryError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, conversation_id, author_id, body, created_at
             FROM support_messages
             WHERE conversation_id = $1
             ORDER BY created_at ASC",
        )
        .bind(conversation_id.as_i32())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
