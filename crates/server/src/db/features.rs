//! Database operations for feature flags, overrides, and feature groups.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use concierge_core::{FeatureFlagId, FeatureGroupId, UserId};

use super::RepositoryError;
use crate::models::{FeatureFlag, FeatureGroup};

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for `PostgreSQL` flag queries.
#[derive(Debug, sqlx::FromRow)]
struct FlagRow {
    id: i32,
    key: String,
    description: Option<String>,
    default_enabled: bool,
    rollout_percentage: i16,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FlagRow> for FeatureFlag {
    fn from(row: FlagRow) -> Self {
        Self {
            id: FeatureFlagId::new(row.id),
            key: row.key,
            description: row.description,
            default_enabled: row.default_enabled,
            rollout_percentage: row.rollout_percentage,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Internal row type for `PostgreSQL` feature group queries.
#[derive(Debug, sqlx::FromRow)]
struct GroupRow {
    id: i32,
    name: String,
}

impl From<GroupRow> for FeatureGroup {
    fn from(row: GroupRow) -> Self {
        Self {
            id: FeatureGroupId::new(row.id),
            name: row.name,
        }
    }
}

const FLAG_COLUMNS: &str =
    "id, key, description, default_enabled, rollout_percentage, created_at, updated_at";

// =============================================================================
// Repository
// =============================================================================

/// Repository for feature flag database operations.
pub struct FeatureFlagRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> FeatureFlagRepository<'a> {
    /// Create a new feature flag repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Flags
    // =========================================================================

    /// Create a new feature flag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the key already exists.
    pub async fn create_flag(
        &self,
        key: &str,
        description: Option<&str>,
        default_enabled: bool,
        rollout_percentage: i16,
    ) -> Result<FeatureFlag, RepositoryError> {
        let row = sqlx::query_as::<_, FlagRow>(&format!(
            "INSERT INTO feature_flags (key, description, default_enabled, rollout_percentage)
             VALUES ($1, $2, $3, $4)
             RETURNING {FLAG_COLUMNS}"
        ))
        .bind(key)
        .bind(description)
        .bind(default_enabled)
        .bind(rollout_percentage)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "flag key already exists"))?;

        Ok(row.into())
    }

    /// Update a flag's description, default, and rollout percentage.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the key doesn't exist.
    pub async fn update_flag(
        &self,
        key: &str,
        description: Option<&str>,
        default_enabled: bool,
        rollout_percentage: i16,
    ) -> Result<FeatureFlag, RepositoryError> {
        let row = sqlx::query_as::<_, FlagRow>(&format!(
            "UPDATE feature_flags
             SET description = $1, default_enabled = $2, rollout_percentage = $3, updated_at = now()
             WHERE key = $4
             RETURNING {FLAG_COLUMNS}"
        ))
        .bind(description)
        .bind(default_enabled)
        .bind(rollout_percentage)
        .bind(key)
        .fetch_optional(self.pool)
        .await?;

        row.map(Into::into).ok_or(RepositoryError::NotFound)
    }

    /// Get a flag by key.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_flag(&self, key: &str) -> Result<Option<FeatureFlag>, RepositoryError> {
        let row = sqlx::query_as::<_, FlagRow>(&format!(
            "SELECT {FLAG_COLUMNS} FROM feature_flags WHERE key = $1"
        ))
        .bind(key)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// List all flags, by key.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_flags(&self) -> Result<Vec<FeatureFlag>, RepositoryError> {
        let rows = sqlx::query_as::<_, FlagRow>(&format!(
            "SELECT {FLAG_COLUMNS} FROM feature_flags ORDER BY key"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Delete a flag and its overrides/group assignments.
    ///
    /// # Returns
    ///
    /// Returns `true` if the flag was deleted, `false` if it didn't exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_flag(&self, key: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM feature_flags WHERE key = $1")
            .bind(key)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Per-user overrides
    // =========================================================================

    /// Set (or replace) a per-user override for a flag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_override(
        &self,
        user_id: UserId,
        flag_id: FeatureFlagId,
        enabled: bool,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_feature_flags (user_id, flag_id, enabled)
             VALUES ($1, $2, $3)
             ON CONFLICT (user_id, flag_id) DO UPDATE SET enabled = $3",
        )
        .bind(user_id.as_i32())
        .bind(flag_id.as_i32())
        .bind(enabled)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Remove a per-user override.
    ///
    /// # Returns
    ///
    /// Returns `true` if an override was removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear_override(
        &self,
        user_id: UserId,
        flag_id: FeatureFlagId,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM user_feature_flags WHERE user_id = $1 AND flag_id = $2")
                .bind(user_id.as_i32())
                .bind(flag_id.as_i32())
                .execute(self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get a user's override for a flag, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_override(
        &self,
        user_id: UserId,
        flag_id: FeatureFlagId,
    ) -> Result<Option<bool>, RepositoryError> {
        let row: Option<(bool,)> = sqlx::query_as(
            "SELECT enabled FROM user_feature_flags WHERE user_id = $1 AND flag_id = $2",
        )
        .bind(user_id.as_i32())
        .bind(flag_id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(enabled,)| enabled))
    }

    /// All of a user's overrides, keyed by flag ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn overrides_for_user(
        &self,
        user_id: UserId,
    ) -> Result<HashMap<i32, bool>, RepositoryError> {
        let rows: Vec<(i32, bool)> =
            sqlx::query_as("SELECT flag_id, enabled FROM user_feature_flags WHERE user_id = $1")
                .bind(user_id.as_i32())
                .fetch_all(self.pool)
                .await?;

        Ok(rows.into_iter().collect())
    }

    // =========================================================================
    // Feature groups
    // =========================================================================

    /// Get a feature group by name, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn ensure_group(&self, name: &str) -> Result<FeatureGroup, RepositoryError> {
        let row = sqlx::query_as::<_, GroupRow>(
            "INSERT INTO feature_groups (name) VALUES ($1)
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
             RETURNING id, name",
        )
        .bind(name)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// Enable a flag for a group.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn add_flag_to_group(
        &self,
        group_id: FeatureGroupId,
        flag_id: FeatureFlagId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO feature_group_flags (group_id, flag_id)
             VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(group_id.as_i32())
        .bind(flag_id.as_i32())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Remove a flag from a group.
    ///
    /// # Returns
    ///
    /// Returns `true` if the assignment existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn remove_flag_from_group(
        &self,
        group_id: FeatureGroupId,
        flag_id: FeatureFlagId,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM feature_group_flags WHERE group_id = $1 AND flag_id = $2")
                .bind(group_id.as_i32())
                .bind(flag_id.as_i32())
                .execute(self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Add a user to a feature group.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn add_user_to_group(
        &self,
        user_id: UserId,
        group_id: FeatureGroupId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_feature_groups (user_id, group_id)
             VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id.as_i32())
        .bind(group_id.as_i32())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Remove a user from a feature group.
    ///
    /// # Returns
    ///
    /// Returns `true` if the membership existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn remove_user_from_group(
        &self,
        user_id: UserId,
        group_id: FeatureGroupId,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM user_feature_groups WHERE user_id = $1 AND group_id = $2")
                .bind(user_id.as_i32())
                .bind(group_id.as_i32())
                .execute(self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Whether any of the user's feature groups enables the flag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn is_enabled_via_group(
        &self,
        user_id: UserId,
        flag_id: FeatureFlagId,
    ) -> Result<bool, RepositoryError> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS (
                 SELECT 1
                 FROM user_feature_groups ug
                 JOIN feature_group_flags gf ON gf.group_id = ug.group_id
                 WHERE ug.user_id = $1 AND gf.flag_id = $2
             )",
        )
        .bind(user_id.as_i32())
        .bind(flag_id.as_i32())
        .fetch_one(self.pool)
        .await?;

        Ok(row.0)
    }

    /// IDs of all flags enabled for the user through group membership.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn group_flag_ids_for_user(
        &self,
        user_id: UserId,
    ) -> Result<HashSet<i32>, RepositoryError> {
        let rows: Vec<(i32,)> = sqlx::query_as(
            "SELECT DISTINCT gf.flag_id
             FROM user_feature_groups ug
             JOIN feature_group_flags gf ON gf.group_id = ug.group_id
             WHERE ug.user_id = $1",
        )
        .bind(user_id.as_i32())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// List the flag keys enabled for a group.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn flags_for_group(
        &self,
        group_id: FeatureGroupId,
    ) -> Result<Vec<String>, RepositoryError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT f.key
             FROM feature_group_flags gf
             JOIN feature_flags f ON f.id = gf.flag_id
             WHERE gf.group_id = $1
             ORDER BY f.key",
        )
        .bind(group_id.as_i32())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|(key,)| key).collect())
    }
}
