//! Feature-flag evaluation engine.
//!
//! Combines per-user overrides, feature-group membership, percentage-based
//! rollout bucketing, and flag defaults into a single decision. Decisions and
//! resolved permission sets are cached in `moka` caches (short TTL) which are
//! invalidated whenever the console mutates flags, groups, or templates.
//!
//! Decision order for a `(user, flag)` pair:
//!
//! 1. Explicit user override - wins outright, including `false`.
//! 2. Feature-group assignment - any group the user belongs to enables it.
//! 3. Percentage rollout - deterministic bucket of `(flag key, user id)`
//!    compared against `rollout_percentage`.
//! 4. The flag's static default.
//!
//! Unknown flag keys evaluate to disabled, never an error.

pub mod access;
pub mod templates;

use std::collections::BTreeMap;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::instrument;

use concierge_core::UserId;

use crate::db::{FeatureFlagRepository, PermissionTemplateRepository, RepositoryError};
use crate::models::FeatureFlag;

pub use access::{AccessDecision, AccessReason, decide_app_access};
pub use templates::PermissionSet;

/// TTL for cached flag decisions.
const DECISION_TTL: Duration = Duration::from_secs(30);

/// TTL for cached permission sets.
const PERMISSION_TTL: Duration = Duration::from_secs(60);

/// How a flag decision was reached, together with the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum FlagDecision {
    /// An explicit per-user override decided the value.
    Override { enabled: bool },
    /// A feature group the user belongs to enables the flag.
    Group { enabled: bool },
    /// The user's rollout bucket falls inside the percentage.
    Rollout {
        enabled: bool,
        bucket: u8,
        percentage: i16,
    },
    /// The flag's static default applied.
    Default { enabled: bool },
    /// The flag key does not exist; evaluates to disabled.
    UnknownFlag { enabled: bool },
}

impl FlagDecision {
    /// The boolean result of the decision.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        match self {
            Self::Override { enabled }
            | Self::Group { enabled }
            | Self::Rollout { enabled, .. }
            | Self::Default { enabled }
            | Self::UnknownFlag { enabled } => *enabled,
        }
    }
}

/// Deterministic rollout bucket for a `(flag key, user)` pair in `[0, 100)`.
///
/// Hashes `"{key}:{user_id}"` so two flags at the same percentage do not
/// enable for the identical user cohort. Stable across processes and
/// releases.
#[must_use]
pub fn rollout_bucket(flag_key: &str, user_id: UserId) -> u8 {
    let digest = Sha256::digest(format!("{flag_key}:{}", user_id.as_i32()).as_bytes());
    let mut prefix = [0_u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    #[allow(clippy::cast_possible_truncation)] // value is already reduced mod 100
    {
        (u64::from_be_bytes(prefix) % 100) as u8
    }
}

/// Pure decision function over already-loaded inputs.
///
/// `override_value` is the user's explicit override, `enabled_via_group`
/// whether any of the user's feature groups carries the flag.
#[must_use]
pub fn decide(
    flag: &FeatureFlag,
    user_id: UserId,
    override_value: Option<bool>,
    enabled_via_group: bool,
) -> FlagDecision {
    if let Some(enabled) = override_value {
        return FlagDecision::Override { enabled };
    }

    if enabled_via_group {
        return FlagDecision::Group { enabled: true };
    }

    if flag.rollout_percentage > 0 {
        let bucket = rollout_bucket(&flag.key, user_id);
        if i16::from(bucket) < flag.rollout_percentage {
            return FlagDecision::Rollout {
                enabled: true,
                bucket,
                percentage: flag.rollout_percentage,
            };
        }
    }

    FlagDecision::Default {
        enabled: flag.default_enabled,
    }
}

/// Shared caches for flag decisions and permission sets.
///
/// Lives in application state; services borrow it per request. Cheap to
/// clone (moka caches are reference-counted internally).
#[derive(Clone)]
pub struct FlagCaches {
    decisions: Cache<(i32, String), FlagDecision>,
    permissions: Cache<String, PermissionSet>,
}

impl FlagCaches {
    /// Create the caches with their standard TTLs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decisions: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(DECISION_TTL)
                .build(),
            permissions: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(PERMISSION_TTL)
                .build(),
        }
    }

    /// Drop every cached decision and permission set.
    ///
    /// Called after any console write so changes take effect immediately
    /// rather than after TTL expiry.
    pub fn invalidate_all(&self) {
        self.decisions.invalidate_all();
        self.permissions.invalidate_all();
    }
}

impl Default for FlagCaches {
    fn default() -> Self {
        Self::new()
    }
}

/// Feature evaluation service.
///
/// Constructed per request from application state, in the same style as the
/// repositories it wraps.
pub struct FeatureService<'a> {
    pool: &'a PgPool,
    caches: &'a FlagCaches,
}

impl<'a> FeatureService<'a> {
    /// Create a new feature service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, caches: &'a FlagCaches) -> Self {
        Self { pool, caches }
    }

    /// Evaluate a flag for a user, with caching.
    ///
    /// Unknown keys resolve to `FlagDecision::UnknownFlag { enabled: false }`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn evaluate(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<FlagDecision, RepositoryError> {
        let cache_key = (user_id.as_i32(), key.to_owned());
        if let Some(hit) = self.caches.decisions.get(&cache_key).await {
            return Ok(hit);
        }

        let decision = self.evaluate_uncached(user_id, key).await?;
        self.caches.decisions.insert(cache_key, decision.clone()).await;

        Ok(decision)
    }

    /// Evaluate a flag without consulting or filling the cache.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn evaluate_uncached(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<FlagDecision, RepositoryError> {
        let repo = FeatureFlagRepository::new(self.pool);

        let Some(flag) = repo.get_flag(key).await? else {
            return Ok(FlagDecision::UnknownFlag { enabled: false });
        };

        let override_value = repo.get_override(user_id, flag.id).await?;
        let via_group = if override_value.is_some() {
            // Short-circuit: an override decides regardless of groups.
            false
        } else {
            repo.is_enabled_via_group(user_id, flag.id).await?
        };

        Ok(decide(&flag, user_id, override_value, via_group))
    }

    /// Whether a flag is enabled for a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn is_enabled(&self, user_id: UserId, key: &str) -> Result<bool, RepositoryError> {
        Ok(self.evaluate(user_id, key).await?.enabled())
    }

    /// Resolve every flag for a user in one pass.
    ///
    /// Loads overrides and group assignments once instead of per flag; used
    /// by the console and the client bootstrap endpoint.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn resolve_all(
        &self,
        user_id: UserId,
    ) -> Result<BTreeMap<String, bool>, RepositoryError> {
        let repo = FeatureFlagRepository::new(self.pool);

        let flags = repo.list_flags().await?;
        let overrides = repo.overrides_for_user(user_id).await?;
        let group_flags = repo.group_flag_ids_for_user(user_id).await?;

        let mut resolved = BTreeMap::new();
        for flag in flags {
            let override_value = overrides.get(&flag.id.as_i32()).copied();
            let via_group = group_flags.contains(&flag.id.as_i32());
            let decision = decide(&flag, user_id, override_value, via_group);
            resolved.insert(flag.key, decision.enabled());
        }

        Ok(resolved)
    }

    /// Effective permission set for a permission group, with caching.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn effective_permissions(
        &self,
        group_name: &str,
    ) -> Result<PermissionSet, RepositoryError> {
        if let Some(hit) = self.caches.permissions.get(group_name).await {
            return Ok(hit);
        }

        let repo = PermissionTemplateRepository::new(self.pool);
        let set = templates::fold_templates(&repo.for_group(group_name).await?);
        self.caches
            .permissions
            .insert(group_name.to_owned(), set.clone())
            .await;

        Ok(set)
    }

    /// Whether a permission group's effective set allows a permission.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn has_permission(
        &self,
        group_name: &str,
        permission: &str,
    ) -> Result<bool, RepositoryError> {
        Ok(self.effective_permissions(group_name).await?.allows(permission))
    }

    /// Invalidate all cached decisions and permission sets.
    pub fn invalidate(&self) {
        self.caches.invalidate_all();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use concierge_core::FeatureFlagId;

    fn flag(key: &str, default_enabled: bool, rollout: i16) -> FeatureFlag {
        FeatureFlag {
            id: FeatureFlagId::new(1),
            key: key.to_string(),
            description: None,
            default_enabled,
            rollout_percentage: rollout,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_rollout_bucket_deterministic() {
        let a = rollout_bucket("beta.dashboard", UserId::new(42));
        let b = rollout_bucket("beta.dashboard", UserId::new(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_rollout_bucket_in_range() {
        for id in 0..500 {
            assert!(rollout_bucket("some.flag", UserId::new(id)) < 100);
        }
    }

    #[test]
    fn test_rollout_bucket_varies_by_flag() {
        // Distinct flag keys should not bucket every user identically.
        let differs = (0..100).any(|id| {
            rollout_bucket("flag.one", UserId::new(id))
                != rollout_bucket("flag.two", UserId::new(id))
        });
        assert!(differs);
    }

    #[test]
    fn test_rollout_bucket_roughly_uniform() {
        // With 2000 users and a 50% rollout, expect no wild skew.
        let enabled = (0..2000)
            .filter(|&id| rollout_bucket("uniform.check", UserId::new(id)) < 50)
            .count();
        assert!((800..=1200).contains(&enabled), "got {enabled}");
    }

    #[test]
    fn test_override_beats_everything() {
        let f = flag("f", true, 100);
        let decision = decide(&f, UserId::new(1), Some(false), true);
        assert_eq!(decision, FlagDecision::Override { enabled: false });
        assert!(!decision.enabled());
    }

    #[test]
    fn test_group_beats_rollout_and_default() {
        let f = flag("f", false, 0);
        let decision = decide(&f, UserId::new(1), None, true);
        assert_eq!(decision, FlagDecision::Group { enabled: true });
    }

    #[test]
    fn test_rollout_zero_never_enables() {
        let f = flag("f", false, 0);
        for id in 0..200 {
            let decision = decide(&f, UserId::new(id), None, false);
            assert_eq!(decision, FlagDecision::Default { enabled: false });
        }
    }

    #[test]
    fn test_rollout_hundred_always_enables() {
        let f = flag("f", false, 100);
        for id in 0..200 {
            assert!(decide(&f, UserId::new(id), None, false).enabled());
        }
    }

    #[test]
    fn test_default_applies_outside_bucket() {
        let f = flag("partial", true, 10);
        // Find a user outside the 10% bucket; the default (true) still applies.
        let outside = (0..500)
            .map(UserId::new)
            .find(|&id| rollout_bucket("partial", id) >= 10)
            .unwrap();
        let decision = decide(&f, outside, None, false);
        assert_eq!(decision, FlagDecision::Default { enabled: true });
    }

    #[test]
    fn test_decision_serializes_with_source_tag() {
        let json = serde_json::to_value(FlagDecision::Rollout {
            enabled: true,
            bucket: 7,
            percentage: 25,
        })
        .unwrap();
        assert_eq!(json["source"], "rollout");
        assert_eq!(json["bucket"], 7);
    }
}
