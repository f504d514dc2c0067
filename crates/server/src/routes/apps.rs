//! Marketplace app route handlers.
//!
//! The listing annotates every app with the caller's access decision; grant
//! management is admin-only.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use concierge_core::{AppId, UserId};

use crate::db::{AppRepository, UserRepository};
use crate::error::AppError;
use crate::flags::{AccessDecision, FeatureService};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::{App, AppGrant};
use crate::state::AppState;

/// Build the apps router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/apps", get(list_apps).post(create_app))
        .route("/api/apps/{id}", axum::routing::put(update_app).delete(delete_app))
        .route("/api/apps/{id}/grants", get(list_grants).post(create_grant))
        .route("/api/apps/{id}/grants/{user_id}", axum::routing::delete(revoke_grant))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Response for an app.
#[derive(Debug, Serialize)]
pub struct AppResponse {
    pub id: i32,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub required_flag: Option<String>,
    pub required_permission: Option<String>,
}

impl From<App> for AppResponse {
    fn from(app: App) -> Self {
        Self {
            id: app.id.as_i32(),
            slug: app.slug,
            name: app.name,
            description: app.description,
            url: app.url,
            required_flag: app.required_flag,
            required_permission: app.required_permission,
        }
    }
}

/// An app annotated with the caller's access decision.
#[derive(Debug, Serialize)]
pub struct AppWithAccessResponse {
    #[serde(flatten)]
    pub app: AppResponse,
    pub access: AccessDecision,
}

/// Request to create or update an app.
#[derive(Debug, Deserialize)]
pub struct AppRequest {
    pub slug: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub required_flag: Option<String>,
    pub required_permission: Option<String>,
}

/// Request to grant access.
#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub user_id: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Response for a grant.
#[derive(Debug, Serialize)]
pub struct GrantResponse {
    pub user_id: i32,
    pub app_id: i32,
    pub granted_by: i32,
    pub expires_at: Option<String>,
    pub created_at: String,
}

impl From<AppGrant> for GrantResponse {
    fn from(grant: AppGrant) -> Self {
        Self {
            user_id: grant.user_id.as_i32(),
            app_id: grant.app_id.as_i32(),
            granted_by: grant.granted_by.as_i32(),
            expires_at: grant.expires_at.map(|t| t.to_rfc3339()),
            created_at: grant.created_at.to_rfc3339(),
        }
    }
}

// =============================================================================
// Route Handlers
// =============================================================================

/// List apps annotated with the caller's access decision.
///
/// GET /api/apps
async fn list_apps(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<Vec<AppWithAccessResponse>>, AppError> {
    let user = UserRepository::new(state.pool())
        .get_by_id(current.id)
        .await?
        .ok_or_else(|| AppError::NotFound("account no longer exists".to_string()))?;

    let apps = AppRepository::new(state.pool()).list().await?;
    let features = FeatureService::new(state.pool(), state.flag_caches());

    let mut annotated = Vec::with_capacity(apps.len());
    for app in apps {
        let access = features.can_access_app(&user, &app).await?;
        annotated.push(AppWithAccessResponse {
            app: app.into(),
            access,
        });
    }

    Ok(Json(annotated))
}

/// Create an app.
///
/// POST /api/apps
async fn create_app(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Json(request): Json<AppRequest>,
) -> Result<(StatusCode, Json<AppResponse>), AppError> {
    let slug = request
        .slug
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("slug is required".to_string()))?;
    validate_app_fields(&request)?;

    let app = AppRepository::new(state.pool())
        .create(
            slug,
            request.name.trim(),
            request.description.as_deref(),
            request.url.trim(),
            request.required_flag.as_deref(),
            request.required_permission.as_deref(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(app.into())))
}

/// Update an app.
///
/// PUT /api/apps/{id}
async fn update_app(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<i32>,
    Json(request): Json<AppRequest>,
) -> Result<Json<AppResponse>, AppError> {
    validate_app_fields(&request)?;

    let app = AppRepository::new(state.pool())
        .update(
            AppId::new(id),
            request.name.trim(),
            request.description.as_deref(),
            request.url.trim(),
            request.required_flag.as_deref(),
            request.required_permission.as_deref(),
        )
        .await?;

    Ok(Json(app.into()))
}

/// Delete an app.
///
/// DELETE /api/apps/{id}
async fn delete_app(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    let deleted = AppRepository::new(state.pool()).delete(AppId::new(id)).await?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("app {id}")))
    }
}

/// List unexpired grants for an app.
///
/// GET /api/apps/{id}/grants
async fn list_grants(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<i32>,
) -> Result<Json<Vec<GrantResponse>>, AppError> {
    let repo = AppRepository::new(state.pool());

    repo.get_by_id(AppId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("app {id}")))?;

    let grants = repo.list_grants(AppId::new(id)).await?;
    Ok(Json(grants.into_iter().map(Into::into).collect()))
}

/// Grant a user access to an app.
///
/// POST /api/apps/{id}/grants
async fn create_grant(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i32>,
    Json(request): Json<GrantRequest>,
) -> Result<(StatusCode, Json<GrantResponse>), AppError> {
    if request.expires_at.is_some_and(|at| at <= Utc::now()) {
        return Err(AppError::BadRequest("expires_at must be in the future".to_string()));
    }

    let repo = AppRepository::new(state.pool());
    repo.get_by_id(AppId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("app {id}")))?;

    let target = UserId::new(request.user_id);
    UserRepository::new(state.pool())
        .get_by_id(target)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", request.user_id)))?;

    let grant = repo
        .upsert_grant(target, AppId::new(id), admin.id, request.expires_at)
        .await?;

    Ok((StatusCode::CREATED, Json(grant.into())))
}

/// Revoke a user's grant.
///
/// DELETE /api/apps/{id}/grants/{user_id}
async fn revoke_grant(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path((id, user_id)): Path<(i32, i32)>,
) -> Result<StatusCode, AppError> {
    let revoked = AppRepository::new(state.pool())
        .revoke_grant(UserId::new(user_id), AppId::new(id))
        .await?;

    if revoked {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("grant for user {user_id} on app {id}")))
    }
}

/// Shared field validation for create/update.
fn validate_app_fields(request: &AppRequest) -> Result<(), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if request.url.trim().is_empty() {
        return Err(AppError::BadRequest("url cannot be empty".to_string()));
    }
    Ok(())
}
