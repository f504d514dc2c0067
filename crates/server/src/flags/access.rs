//! Unified app access decision.
//!
//! Combines the flag engine, the permission-template engine, and explicit
//! grants into one answer for "can this user open this app?".

use serde::Serialize;

use concierge_core::UserRole;

use crate::db::{AppRepository, RepositoryError};
use crate::models::{App, User};

use super::FeatureService;

/// Why access was granted or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    /// Admins can access everything.
    AdminRole,
    /// The gating feature flag is disabled for this user.
    FlagDisabled,
    /// An unexpired explicit grant exists.
    Grant,
    /// The user's effective permission set matches the requirement.
    Permission,
    /// The app has no grant or permission requirement.
    Open,
    /// No grant and the permission requirement is not met.
    Denied,
}

/// The outcome of an app access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: AccessReason,
}

impl AccessDecision {
    const fn allow(reason: AccessReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    const fn deny(reason: AccessReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Pure decision over already-evaluated inputs.
///
/// `flag_enabled` is `None` when the app has no gating flag; `has_grant`
/// reflects an unexpired explicit grant; `permission_allows` is `None` when
/// the app names no required permission.
#[must_use]
pub fn decide_app_access(
    role: UserRole,
    flag_enabled: Option<bool>,
    has_grant: bool,
    permission_allows: Option<bool>,
) -> AccessDecision {
    if role == UserRole::Admin {
        return AccessDecision::allow(AccessReason::AdminRole);
    }

    if flag_enabled == Some(false) {
        return AccessDecision::deny(AccessReason::FlagDisabled);
    }

    if has_grant {
        return AccessDecision::allow(AccessReason::Grant);
    }

    match permission_allows {
        Some(true) => AccessDecision::allow(AccessReason::Permission),
        Some(false) => AccessDecision::deny(AccessReason::Denied),
        // No permission requirement: open to all authenticated users
        // (subject to the flag gate above).
        None => AccessDecision::allow(AccessReason::Open),
    }
}

impl FeatureService<'_> {
    /// Decide whether a user can access a marketplace app.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn can_access_app(
        &self,
        user: &User,
        app: &App,
    ) -> Result<AccessDecision, RepositoryError> {
        // Admins skip every other check, including the flag gate.
        if user.is_admin() {
            return Ok(decide_app_access(user.role, None, false, None));
        }

        let flag_enabled = match &app.required_flag {
            Some(key) => Some(self.is_enabled(user.id, key).await?),
            None => None,
        };

        // Short-circuit on a disabled gate before touching grants.
        if flag_enabled == Some(false) {
            return Ok(decide_app_access(user.role, flag_enabled, false, None));
        }

        let has_grant = AppRepository::new(self.pool)
            .get_grant(user.id, app.id)
            .await?
            .is_some();

        let permission_allows = match &app.required_permission {
            Some(permission) if !has_grant => Some(
                self.has_permission(&user.permission_group, permission)
                    .await?,
            ),
            Some(_) => Some(true), // grant already decides, value unused
            None => None,
        };

        Ok(decide_app_access(
            user.role,
            flag_enabled,
            has_grant,
            permission_allows,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_bypasses_everything() {
        let decision = decide_app_access(UserRole::Admin, Some(false), false, Some(false));
        assert!(decision.allowed);
        assert_eq!(decision.reason, AccessReason::AdminRole);
    }

    #[test]
    fn test_disabled_flag_gates_out() {
        let decision = decide_app_access(UserRole::User, Some(false), true, Some(true));
        assert!(!decision.allowed);
        assert_eq!(decision.reason, AccessReason::FlagDisabled);
    }

    #[test]
    fn test_grant_allows() {
        let decision = decide_app_access(UserRole::User, Some(true), true, Some(false));
        assert!(decision.allowed);
        assert_eq!(decision.reason, AccessReason::Grant);
    }

    #[test]
    fn test_permission_allows_without_grant() {
        let decision = decide_app_access(UserRole::User, None, false, Some(true));
        assert!(decision.allowed);
        assert_eq!(decision.reason, AccessReason::Permission);
    }

    #[test]
    fn test_denied_without_grant_or_permission() {
        let decision = decide_app_access(UserRole::User, None, false, Some(false));
        assert!(!decision.allowed);
        assert_eq!(decision.reason, AccessReason::Denied);
    }

    #[test]
    fn test_open_app_allows_everyone() {
        let decision = decide_app_access(UserRole::User, Some(true), false, None);
        assert!(decision.allowed);
        assert_eq!(decision.reason, AccessReason::Open);
    }
}
