//! User account model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use concierge_core::{Email, UserId, UserRole};

/// A platform user.
///
/// The password hash never leaves the repository layer; this model is safe
/// to serialize into admin responses.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub display_name: String,
    pub role: UserRole,
    /// Permission group resolved through the template engine.
    pub permission_group: String,
    pub created_at: DateTime<Utc>,
    /// Updated on login and on assistant activity.
    pub last_active_at: Option<DateTime<Utc>>,
}

impl User {
    /// Whether this user holds the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}
