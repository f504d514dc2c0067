//! Marketplace app models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use concierge_core::{AppId, UserId};

/// A marketplace app entry.
#[derive(Debug, Clone, Serialize)]
pub struct App {
    pub id: AppId,
    /// URL-safe unique identifier (also the permission segment).
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    /// Launch URL of the app.
    pub url: String,
    /// Feature flag key gating visibility, if any.
    pub required_flag: Option<String>,
    /// Permission string required for access, if any (e.g. `apps.reports`).
    pub required_permission: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An access grant for a user on an app.
///
/// Expired grants are treated as absent everywhere; reads filter them out.
#[derive(Debug, Clone, Serialize)]
pub struct AppGrant {
    pub user_id: UserId,
    pub app_id: AppId,
    /// Admin who issued the grant.
    pub granted_by: UserId,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AppGrant {
    /// Whether the grant is expired at the given instant.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}
