//! Database operations for the Concierge `PostgreSQL` database.
//!
//! ## Tables
//!
//! - `users` - Accounts, roles, permission groups, activity timestamps
//! - `session` - Session storage (managed by tower-sessions)
//! - `apps` - Marketplace app entries
//! - `user_app_permissions` - Per-user app grants with optional expiry
//! - `feature_flags` / `user_feature_flags` - Flags and per-user overrides
//! - `feature_groups` / `feature_group_flags` / `user_feature_groups` - Cohorts
//! - `permission_templates` - Ordered permission bundles per group
//! - `conversations` / `support_messages` - Support threads
//! - `chat_sessions` / `chat_messages` - Assistant transcripts (JSONB content)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p concierge-cli -- migrate
//! ```

pub mod apps;
pub mod chat;
pub mod features;
pub mod support;
pub mod templates;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use apps::AppRepository;
pub use chat::ChatRepository;
pub use features::FeatureFlagRepository;
pub use support::{ConversationFilter, ConversationRepository};
pub use templates::PermissionTemplateRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map an insert/update error, converting unique violations to `Conflict`.
    pub(crate) fn from_write(e: sqlx::Error, what: &str) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(what.to_string())
            }
            _ => Self::Database(e),
        }
    }

    /// Map an enum parse failure coming from a TEXT column.
    pub(crate) fn corrupt(e: impl std::fmt::Display) -> Self {
        Self::DataCorruption(e.to_string())
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
