//! Integration tests for Concierge.
//!
//! These tests exercise the engine and service logic through the library
//! crates without a live database: flag evaluation, permission folding, app
//! access decisions, handoff detection, and the presence relay.
//!
//! End-to-end HTTP tests additionally need `DATABASE_URL` pointing at a
//! running `PostgreSQL` and are intentionally out of scope here.

#![cfg_attr(not(test), forbid(unsafe_code))]

use chrono::Utc;

use concierge_core::{FeatureFlagId, TemplateId, TemplateMode};
use concierge_server::models::{FeatureFlag, PermissionTemplate};

/// Build a feature flag fixture.
#[must_use]
pub fn flag(key: &str, default_enabled: bool, rollout_percentage: i16) -> FeatureFlag {
    FeatureFlag {
        id: FeatureFlagId::new(1),
        key: key.to_string(),
        description: None,
        default_enabled,
        rollout_percentage,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Build a permission template fixture.
#[must_use]
pub fn template(
    group: &str,
    name: &str,
    mode: TemplateMode,
    permissions: &[&str],
    position: i32,
) -> PermissionTemplate {
    PermissionTemplate {
        id: TemplateId::new(position),
        group_name: group.to_string(),
        name: name.to_string(),
        mode,
        permissions: permissions.iter().map(|s| (*s).to_string()).collect(),
        position,
    }
}
