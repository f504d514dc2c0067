//! Database operations for marketplace apps and access grants.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use concierge_core::{AppId, UserId};

use super::RepositoryError;
use crate::models::{App, AppGrant};

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for `PostgreSQL` app queries.
#[derive(Debug, sqlx::FromRow)]
struct AppRow {
    id: i32,
    slug: String,
    name: String,
    description: Option<String>,
    url: String,
    required_flag: Option<String>,
    required_permission: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AppRow> for App {
    fn from(row: AppRow) -> Self {
        Self {
            id: AppId::new(row.id),
            slug: row.slug,
            name: row.name,
            description: row.description,
            url: row.url,
            required_flag: row.required_flag,
            required_permission: row.required_permission,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Internal row type for `PostgreSQL` grant queries.
#[derive(Debug, sqlx::FromRow)]
struct GrantRow {
    user_id: i32,
    app_id: i32,
    granted_by: i32,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<GrantRow> for AppGrant {
    fn from(row: GrantRow) -> Self {
        Self {
            user_id: UserId::new(row.user_id),
            app_id: AppId::new(row.app_id),
            granted_by: UserId::new(row.granted_by),
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

const APP_COLUMNS: &str =
    "id, slug, name, description, url, required_flag, required_permission, created_at, updated_at";

// =============================================================================
// Repository
// =============================================================================

/// Repository for marketplace app database operations.
pub struct AppRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AppRepository<'a> {
    /// Create a new app repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a new marketplace app.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is already taken.
    pub async fn create(
        &self,
        slug: &str,
        name: &str,
        description: Option<&str>,
        url: &str,
        required_flag: Option<&str>,
        required_permission: Option<&str>,
    ) -> Result<App, RepositoryError> {
        let row = sqlx::query_as::<_, AppRow>(&format!(
            "INSERT INTO apps (slug, name, description, url, required_flag, required_permission)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {APP_COLUMNS}"
        ))
        .bind(slug)
        .bind(name)
        .bind(description)
        .bind(url)
        .bind(required_flag)
        .bind(required_permission)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "app slug already exists"))?;

        Ok(row.into())
    }

    /// Update an existing app.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the app doesn't exist.
    pub async fn update(
        &self,
        id: AppId,
        name: &str,
        description: Option<&str>,
        url: &str,
        required_flag: Option<&str>,
        required_permission: Option<&str>,
    ) -> Result<App, RepositoryError> {
        let row = sqlx::query_as::<_, AppRow>(&format!(
            "UPDATE apps
             SET name = $1, description = $2, url = $3,
                 required_flag = $4, required_permission = $5, updated_at = now()
             WHERE id = $6
             RETURNING {APP_COLUMNS}"
        ))
        .bind(name)
        .bind(description)
        .bind(url)
        .bind(required_flag)
        .bind(required_permission)
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        row.map(Into::into).ok_or(RepositoryError::NotFound)
    }

    /// Get an app by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: AppId) -> Result<Option<App>, RepositoryError> {
        let row =
            sqlx::query_as::<_, AppRow>(&format!("SELECT {APP_COLUMNS} FROM apps WHERE id = $1"))
                .bind(id.as_i32())
                .fetch_optional(self.pool)
                .await?;

        Ok(row.map(Into::into))
    }

    /// List all apps, alphabetically by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<App>, RepositoryError> {
        let rows =
            sqlx::query_as::<_, AppRow>(&format!("SELECT {APP_COLUMNS} FROM apps ORDER BY name"))
                .fetch_all(self.pool)
                .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Delete an app and its grants.
    ///
    /// # Returns
    ///
    /// Returns `true` if the app was deleted, `false` if it didn't exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: AppId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM apps WHERE id = $1")
            .bind(id.as_i32())
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Grants
    // =========================================================================

    /// Grant a user access to an app, replacing any existing grant.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails (including
    /// foreign-key violations for unknown users or apps).
    pub async fn upsert_grant(
        &self,
        user_id: UserId,
        app_id: AppId,
        granted_by: UserId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<AppGrant, RepositoryError> {
        let row = sqlx::query_as::<_, GrantRow>(
            "INSERT INTO user_app_permissions (user_id, app_id, granted_by, expires_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id, app_id)
             DO UPDATE SET granted_by = $3, expires_at = $4, created_at = now()
             RETURNING user_id, app_id, granted_by, expires_at, created_at",
        )
        .bind(user_id.as_i32())
        .bind(app_id.as_i32())
        .bind(granted_by.as_i32())
        .bind(expires_at)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// Revoke a user's grant on an app.
    ///
    /// # Returns
    ///
    /// Returns `true` if a grant was removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn revoke_grant(
        &self,
        user_id: UserId,
        app_id: AppId,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM user_app_permissions WHERE user_id = $1 AND app_id = $2")
                .bind(user_id.as_i32())
                .bind(app_id.as_i32())
                .execute(self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get a user's unexpired grant on an app, if any.
    ///
    /// Expired rows are purged as a side effect, so expiry never needs a
    /// background sweep.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_grant(
        &self,
        user_id: UserId,
        app_id: AppId,
    ) -> Result<Option<AppGrant>, RepositoryError> {
        self.purge_expired().await?;

        let row = sqlx::query_as::<_, GrantRow>(
            "SELECT user_id, app_id, granted_by, expires_at, created_at
             FROM user_app_permissions
             WHERE user_id = $1 AND app_id = $2
               AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(user_id.as_i32())
        .bind(app_id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// List unexpired grants for an app.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_grants(&self, app_id: AppId) -> Result<Vec<AppGrant>, RepositoryError> {
        self.purge_expired().await?;

        let rows = sqlx::query_as::<_, GrantRow>(
            "SELECT user_id, app_id, granted_by, expires_at, created_at
             FROM user_app_permissions
             WHERE app_id = $1 AND (expires_at IS NULL OR expires_at > now())
             ORDER BY created_at DESC",
        )
        .bind(app_id.as_i32())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Delete expired grant rows.
    async fn purge_expired(&self) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM user_app_permissions WHERE expires_at IS NOT NULL AND expires_at <= now()")
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
