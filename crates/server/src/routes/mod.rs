//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (DB ping)
//!
//! # Pages (server-rendered)
//! GET  /                       - Dashboard
//! GET  /auth/login             - Login page
//! GET  /auth/register          - Registration page
//!
//! # Auth (rate limited, form posts)
//! POST /auth/login             - Login
//! POST /auth/register          - Register
//! POST /auth/logout            - Logout
//!
//! # Users (admin) + profile (self-service)
//! GET/POST /api/users          - List / create users
//! GET/PUT/DELETE /api/users/{id}
//! PUT  /api/users/{id}/role    - Change role
//! PUT  /api/users/{id}/group   - Change permission group
//! GET/PUT /api/profile         - Own profile
//!
//! # Apps
//! GET  /api/apps               - Marketplace annotated with access decisions
//! POST /api/apps               - Create (admin)
//! PUT/DELETE /api/apps/{id}    - Update / delete (admin)
//! GET/POST /api/apps/{id}/grants
//! DELETE /api/apps/{id}/grants/{user_id}
//!
//! # Feature console (admin except /me)
//! GET/POST /api/features
//! PUT/DELETE /api/features/{key}
//! GET  /api/features/{key}/evaluate?user_id=
//! PUT/DELETE /api/features/{key}/overrides/{user_id}
//! POST/DELETE /api/features/{key}/groups/{group}
//! POST/DELETE /api/features/groups/{group}/members/{user_id}
//! GET  /api/features/me        - Resolved flag map for the caller
//! GET/POST /api/permission-templates
//! DELETE /api/permission-templates/{id}
//! GET  /api/permission-templates/resolve/{group}
//!
//! # Support
//! GET/POST /api/support/conversations
//! GET/DELETE /api/support/conversations/{id}
//! PUT  /api/support/conversations/{id}/status
//! PUT  /api/support/conversations/{id}/assign
//! GET/POST /api/support/conversations/{id}/messages
//! POST /api/support/conversations/bulk
//! GET  /api/support/conversations/{id}/ws - Presence relay
//!
//! # Assistant chat
//! GET/POST /api/chat/sessions
//! GET/DELETE /api/chat/sessions/{id}
//! POST /api/chat/sessions/{id}/messages
//! POST /api/chat/sessions/{id}/messages/stream (SSE)
//! ```

pub mod apps;
pub mod auth;
pub mod chat;
pub mod dashboard;
pub mod features;
pub mod support;
pub mod users;
pub mod ws;

use axum::Router;

use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Build the application router (minus health endpoints and global layers).
pub fn routes() -> Router<AppState> {
    let api = Router::new()
        .merge(users::router())
        .merge(apps::router())
        .merge(features::router())
        .merge(support::router())
        .merge(chat::router())
        .merge(ws::router())
        .layer(api_rate_limiter());

    Router::new()
        .merge(dashboard::router())
        .merge(auth::router().layer(auth_rate_limiter()))
        .merge(api)
}
