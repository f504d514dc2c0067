//! Feature console route handlers.
//!
//! Admin CRUD over flags, per-user overrides, feature groups, and permission
//! templates, plus the non-admin bootstrap endpoint resolving every flag for
//! the caller. Every console write invalidates the decision caches.

use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};

use concierge_core::{TemplateId, TemplateMode, UserId};

use crate::db::{FeatureFlagRepository, PermissionTemplateRepository, UserRepository};
use crate::error::AppError;
use crate::flags::{FeatureService, FlagDecision};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::{FeatureFlag, PermissionTemplate};
use crate::state::AppState;

/// Build the feature console router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/features", get(list_flags).post(create_flag))
        .route("/api/features/me", get(resolve_mine))
        .route("/api/features/{key}", put(update_flag).delete(delete_flag))
        .route("/api/features/{key}/evaluate", get(evaluate_flag))
        .route(
            "/api/features/{key}/overrides/{user_id}",
            put(set_override).delete(clear_override),
        )
        .route(
            "/api/features/{key}/groups/{group}",
            post(add_flag_to_group).delete(remove_flag_from_group),
        )
        .route(
            "/api/features/groups/{group}/members/{user_id}",
            post(add_group_member).delete(remove_group_member),
        )
        .route(
            "/api/permission-templates",
            get(list_templates).post(create_template),
        )
        .route("/api/permission-templates/{id}", delete(delete_template))
        .route(
            "/api/permission-templates/resolve/{group}",
            get(resolve_group_permissions),
        )
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Response for a feature flag.
#[derive(Debug, Serialize)]
pub struct FlagResponse {
    pub key: String,
    pub description: Option<String>,
    pub default_enabled: bool,
    pub rollout_percentage: i16,
    pub updated_at: String,
}

impl From<FeatureFlag> for FlagResponse {
    fn from(flag: FeatureFlag) -> Self {
        Self {
            key: flag.key,
            description: flag.description,
            default_enabled: flag.default_enabled,
            rollout_percentage: flag.rollout_percentage,
            updated_at: flag.updated_at.to_rfc3339(),
        }
    }
}

/// Request to create a flag.
#[derive(Debug, Deserialize)]
pub struct CreateFlagRequest {
    pub key: String,
    pub description: Option<String>,
    #[serde(default)]
    pub default_enabled: bool,
    #[serde(default)]
    pub rollout_percentage: i16,
}

/// Request to update a flag.
#[derive(Debug, Deserialize)]
pub struct UpdateFlagRequest {
    pub description: Option<String>,
    pub default_enabled: bool,
    pub rollout_percentage: i16,
}

/// Request to set a per-user override.
#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub enabled: bool,
}

/// Query for decision explanations.
#[derive(Debug, Deserialize)]
pub struct EvaluateQuery {
    pub user_id: i32,
}

/// Response for a permission template.
#[derive(Debug, Serialize)]
pub struct TemplateResponse {
    pub id: i32,
    pub group_name: String,
    pub name: String,
    pub mode: TemplateMode,
    pub permissions: Vec<String>,
    pub position: i32,
}

impl From<PermissionTemplate> for TemplateResponse {
    fn from(template: PermissionTemplate) -> Self {
        Self {
            id: template.id.as_i32(),
            group_name: template.group_name,
            name: template.name,
            mode: template.mode,
            permissions: template.permissions,
            position: template.position,
        }
    }
}

/// Request to create a permission template.
#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub group_name: String,
    pub name: String,
    pub mode: TemplateMode,
    pub permissions: Vec<String>,
    #[serde(default)]
    pub position: i32,
}

// =============================================================================
// Flag Handlers
// =============================================================================

/// List all flags.
///
/// GET /api/features
async fn list_flags(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Vec<FlagResponse>>, AppError> {
    let flags = FeatureFlagRepository::new(state.pool()).list_flags().await?;
    Ok(Json(flags.into_iter().map(Into::into).collect()))
}

/// Create a flag.
///
/// POST /api/features
async fn create_flag(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Json(request): Json<CreateFlagRequest>,
) -> Result<(StatusCode, Json<FlagResponse>), AppError> {
    let key = request.key.trim();
    if key.is_empty() {
        return Err(AppError::BadRequest("key cannot be empty".to_string()));
    }
    validate_rollout(request.rollout_percentage)?;

    let flag = FeatureFlagRepository::new(state.pool())
        .create_flag(
            key,
            request.description.as_deref(),
            request.default_enabled,
            request.rollout_percentage,
        )
        .await?;

    state.flag_caches().invalidate_all();

    Ok((StatusCode::CREATED, Json(flag.into())))
}

/// Update a flag.
///
/// PUT /api/features/{key}
async fn update_flag(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(key): Path<String>,
    Json(request): Json<UpdateFlagRequest>,
) -> Result<Json<FlagResponse>, AppError> {
    validate_rollout(request.rollout_percentage)?;

    let flag = FeatureFlagRepository::new(state.pool())
        .update_flag(
            &key,
            request.description.as_deref(),
            request.default_enabled,
            request.rollout_percentage,
        )
        .await?;

    state.flag_caches().invalidate_all();

    Ok(Json(flag.into()))
}

/// Delete a flag.
///
/// DELETE /api/features/{key}
async fn delete_flag(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(key): Path<String>,
) -> Result<StatusCode, AppError> {
    let deleted = FeatureFlagRepository::new(state.pool())
        .delete_flag(&key)
        .await?;

    if !deleted {
        return Err(AppError::NotFound(format!("flag {key}")));
    }

    state.flag_caches().invalidate_all();
    Ok(StatusCode::NO_CONTENT)
}

/// Explain a flag decision for a user.
///
/// GET /api/features/{key}/evaluate?user_id=
async fn evaluate_flag(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(key): Path<String>,
    Query(query): Query<EvaluateQuery>,
) -> Result<Json<FlagDecision>, AppError> {
    let decision = FeatureService::new(state.pool(), state.flag_caches())
        .evaluate_uncached(UserId::new(query.user_id), &key)
        .await?;

    Ok(Json(decision))
}

/// Resolve every flag for the caller.
///
/// GET /api/features/me
async fn resolve_mine(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<BTreeMap<String, bool>>, AppError> {
    let resolved = FeatureService::new(state.pool(), state.flag_caches())
        .resolve_all(current.id)
        .await?;

    Ok(Json(resolved))
}

// =============================================================================
// Override Handlers
// =============================================================================

/// Set a per-user override.
///
/// PUT /api/features/{key}/overrides/{user_id}
async fn set_override(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path((key, user_id)): Path<(String, i32)>,
    Json(request): Json<OverrideRequest>,
) -> Result<StatusCode, AppError> {
    let repo = FeatureFlagRepository::new(state.pool());
    let flag = repo
        .get_flag(&key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("flag {key}")))?;

    UserRepository::new(state.pool())
        .get_by_id(UserId::new(user_id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))?;

    repo.set_override(UserId::new(user_id), flag.id, request.enabled)
        .await?;

    state.flag_caches().invalidate_all();
    Ok(StatusCode::NO_CONTENT)
}

/// Clear a per-user override.
///
/// DELETE /api/features/{key}/overrides/{user_id}
async fn clear_override(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path((key, user_id)): Path<(String, i32)>,
) -> Result<StatusCode, AppError> {
    let repo = FeatureFlagRepository::new(state.pool());
    let flag = repo
        .get_flag(&key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("flag {key}")))?;

    let cleared = repo.clear_override(UserId::new(user_id), flag.id).await?;
    if !cleared {
        return Err(AppError::NotFound(format!(
            "override for user {user_id} on flag {key}"
        )));
    }

    state.flag_caches().invalidate_all();
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Group Handlers
// =============================================================================

/// Enable a flag for a feature group (creating the group if needed).
///
/// POST /api/features/{key}/groups/{group}
async fn add_flag_to_group(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path((key, group)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let repo = FeatureFlagRepository::new(state.pool());
    let flag = repo
        .get_flag(&key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("flag {key}")))?;

    let group = repo.ensure_group(group.trim()).await?;
    repo.add_flag_to_group(group.id, flag.id).await?;

    state.flag_caches().invalidate_all();
    Ok(StatusCode::NO_CONTENT)
}

/// Remove a flag from a feature group.
///
/// DELETE /api/features/{key}/groups/{group}
async fn remove_flag_from_group(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path((key, group)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let repo = FeatureFlagRepository::new(state.pool());
    let flag = repo
        .get_flag(&key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("flag {key}")))?;

    let group = repo.ensure_group(group.trim()).await?;
    let removed = repo.remove_flag_from_group(group.id, flag.id).await?;
    if !removed {
        return Err(AppError::NotFound(format!("flag {key} not in group")));
    }

    state.flag_caches().invalidate_all();
    Ok(StatusCode::NO_CONTENT)
}

/// Add a user to a feature group (creating the group if needed).
///
/// POST /api/features/groups/{group}/members/{user_id}
async fn add_group_member(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path((group, user_id)): Path<(String, i32)>,
) -> Result<StatusCode, AppError> {
    UserRepository::new(state.pool())
        .get_by_id(UserId::new(user_id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))?;

    let repo = FeatureFlagRepository::new(state.pool());
    let group = repo.ensure_group(group.trim()).await?;
    repo.add_user_to_group(UserId::new(user_id), group.id).await?;

    state.flag_caches().invalidate_all();
    Ok(StatusCode::NO_CONTENT)
}

/// Remove a user from a feature group.
///
/// DELETE /api/features/groups/{group}/members/{user_id}
async fn remove_group_member(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path((group, user_id)): Path<(String, i32)>,
) -> Result<StatusCode, AppError> {
    let repo = FeatureFlagRepository::new(state.pool());
    let group = repo.ensure_group(group.trim()).await?;
    let removed = repo
        .remove_user_from_group(UserId::new(user_id), group.id)
        .await?;
    if !removed {
        return Err(AppError::NotFound(format!("user {user_id} not in group")));
    }

    state.flag_caches().invalidate_all();
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Permission Template Handlers
// =============================================================================

/// List all permission templates.
///
/// GET /api/permission-templates
async fn list_templates(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Vec<TemplateResponse>>, AppError> {
    let templates = PermissionTemplateRepository::new(state.pool()).list().await?;
    Ok(Json(templates.into_iter().map(Into::into).collect()))
}

/// Create a permission template.
///
/// POST /api/permission-templates
async fn create_template(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Json(request): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<TemplateResponse>), AppError> {
    let group_name = request.group_name.trim();
    let name = request.name.trim();
    if group_name.is_empty() || name.is_empty() {
        return Err(AppError::BadRequest(
            "group_name and name cannot be empty".to_string(),
        ));
    }

    let template = PermissionTemplateRepository::new(state.pool())
        .create(
            group_name,
            name,
            request.mode,
            &request.permissions,
            request.position,
        )
        .await?;

    state.flag_caches().invalidate_all();

    Ok((StatusCode::CREATED, Json(template.into())))
}

/// Delete a permission template.
///
/// DELETE /api/permission-templates/{id}
async fn delete_template(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    let deleted = PermissionTemplateRepository::new(state.pool())
        .delete(TemplateId::new(id))
        .await?;

    if !deleted {
        return Err(AppError::NotFound(format!("template {id}")));
    }

    state.flag_caches().invalidate_all();
    Ok(StatusCode::NO_CONTENT)
}

/// Resolve a group's effective permission set.
///
/// GET /api/permission-templates/resolve/{group}
async fn resolve_group_permissions(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(group): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    let set = FeatureService::new(state.pool(), state.flag_caches())
        .effective_permissions(&group)
        .await?;

    Ok(Json(set.iter().map(ToString::to_string).collect()))
}

/// Validate the rollout percentage range.
fn validate_rollout(percentage: i16) -> Result<(), AppError> {
    if !(0..=100).contains(&percentage) {
        return Err(AppError::BadRequest(
            "rollout_percentage must be between 0 and 100".to_string(),
        ));
    }
    Ok(())
}
