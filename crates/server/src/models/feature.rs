//! Feature flag and permission template models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use concierge_core::{FeatureFlagId, FeatureGroupId, TemplateId, TemplateMode};

/// A feature flag.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureFlag {
    pub id: FeatureFlagId,
    /// Stable flag key, e.g. `support.bulk_actions`.
    pub key: String,
    pub description: Option<String>,
    /// Value when no override, group, or rollout bucket applies.
    pub default_enabled: bool,
    /// Percentage of users enabled via deterministic rollout (0-100).
    pub rollout_percentage: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named cohort of users that can be granted flags wholesale.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureGroup {
    pub id: FeatureGroupId,
    pub name: String,
}

/// A named bundle of permission strings with an inheritance mode.
///
/// Templates belonging to a permission group fold in `position` order into
/// the group's effective permission set.
#[derive(Debug, Clone, Serialize)]
pub struct PermissionTemplate {
    pub id: TemplateId,
    /// Permission group this template belongs to (matches `users.permission_group`).
    pub group_name: String,
    pub name: String,
    pub mode: TemplateMode,
    pub permissions: Vec<String>,
    /// Fold order within the group (ascending).
    pub position: i32,
}
