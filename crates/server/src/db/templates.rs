//! Database operations for permission templates.

use sqlx::PgPool;

use concierge_core::{TemplateId, TemplateMode};

use super::RepositoryError;
use crate::models::PermissionTemplate;

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for `PostgreSQL` template queries.
#[derive(Debug, sqlx::FromRow)]
struct TemplateRow {
    id: i32,
    group_name: String,
    name: String,
    mode: String,
    permissions: Vec<String>,
    position: i32,
}

impl TryFrom<TemplateRow> for PermissionTemplate {
    type Error = RepositoryError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TemplateId::new(row.id),
            group_name: row.group_name,
            name: row.name,
            mode: row
                .mode
                .parse::<TemplateMode>()
                .map_err(RepositoryError::corrupt)?,
            permissions: row.permissions,
            position: row.position,
        })
    }
}

const TEMPLATE_COLUMNS: &str = "id, group_name, name, mode, permissions, position";

// =============================================================================
// Repository
// =============================================================================

/// Repository for permission template database operations.
pub struct PermissionTemplateRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PermissionTemplateRepository<'a> {
    /// Create a new permission template repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a new template within a group.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if (group, name) already exists.
    pub async fn create(
        &self,
        group_name: &str,
        name: &str,
        mode: TemplateMode,
        permissions: &[String],
        position: i32,
    ) -> Result<PermissionTemplate, RepositoryError> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            "INSERT INTO permission_templates (group_name, name, mode, permissions, position)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {TEMPLATE_COLUMNS}"
        ))
        .bind(group_name)
        .bind(name)
        .bind(mode.as_str())
        .bind(permissions)
        .bind(position)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "template name already exists in group"))?;

        row.try_into()
    }

    /// List all templates, grouped then ordered by fold position.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<PermissionTemplate>, RepositoryError> {
        let rows = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM permission_templates
             ORDER BY group_name, position, id"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Templates for one permission group in fold order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn for_group(
        &self,
        group_name: &str,
    ) -> Result<Vec<PermissionTemplate>, RepositoryError> {
        let rows = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM permission_templates
             WHERE group_name = $1
             ORDER BY position, id"
        ))
        .bind(group_name)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Delete a template.
    ///
    /// # Returns
    ///
    /// Returns `true` if the template was deleted, `false` if it didn't exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: TemplateId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM permission_templates WHERE id = $1")
            .bind(id.as_i32())
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
