//! User management route handlers.
//!
//! Admin CRUD over accounts plus self-service profile endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
};
use serde::{Deserialize, Serialize};

use concierge_core::{UserId, UserRole};

use crate::db::UserRepository;
use crate::error::AppError;
use crate::flags::FeatureService;
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::User;
use crate::services::AuthService;
use crate::state::AppState;

/// Build the users router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route(
            "/api/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/api/users/{id}/role", put(update_role))
        .route("/api/users/{id}/group", put(update_group))
        .route("/api/profile", get(get_profile).put(update_profile))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Response for a user.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i32,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    pub permission_group: String,
    pub created_at: String,
    pub last_active_at: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.as_i32(),
            email: user.email.into_inner(),
            display_name: user.display_name,
            role: user.role,
            permission_group: user.permission_group,
            created_at: user.created_at.to_rfc3339(),
            last_active_at: user.last_active_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Paginated user listing.
#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
    pub total: i64,
    pub page: i64,
}

/// Query parameters for the user listing.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
}

const fn default_page() -> i64 {
    1
}

const USERS_PER_PAGE: i64 = 50;

/// Request to create a user.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: UserRole,
}

/// Request to update a user's profile fields.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub display_name: String,
}

/// Request to change a user's role.
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: UserRole,
}

/// Request to change a user's permission group.
#[derive(Debug, Deserialize)]
pub struct UpdateGroupRequest {
    pub permission_group: String,
}

/// Own profile including the resolved permission set.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub permissions: Vec<String>,
}

// =============================================================================
// Admin Handlers
// =============================================================================

/// List users with optional search.
///
/// GET /api/users
async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<ListQuery>,
) -> Result<Json<UserListResponse>, AppError> {
    let repo = UserRepository::new(state.pool());
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let total = repo.count(search).await?;
    let page = query.page.max(1);
    let offset = (page - 1) * USERS_PER_PAGE;
    let users = repo.list(search, USERS_PER_PAGE, offset).await?;

    Ok(Json(UserListResponse {
        users: users.into_iter().map(Into::into).collect(),
        total,
        page,
    }))
}

/// Create a user.
///
/// POST /api/users
async fn create_user(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let service = AuthService::new(state.pool());
    let user = service
        .register(
            &request.email,
            &request.password,
            request.display_name.as_deref(),
            request.role,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Get a user by ID.
///
/// GET /api/users/{id}
async fn get_user(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<i32>,
) -> Result<Json<UserResponse>, AppError> {
    let user = UserRepository::new(state.pool())
        .get_by_id(UserId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id}")))?;

    Ok(Json(user.into()))
}

/// Update a user's display name.
///
/// PUT /api/users/{id}
async fn update_user(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<i32>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let display_name = request.display_name.trim();
    if display_name.is_empty() {
        return Err(AppError::BadRequest("display_name cannot be empty".to_string()));
    }

    let repo = UserRepository::new(state.pool());
    repo.update_display_name(UserId::new(id), display_name).await?;

    let user = repo
        .get_by_id(UserId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id}")))?;

    Ok(Json(user.into()))
}

/// Delete a user.
///
/// DELETE /api/users/{id}
async fn delete_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    if admin.id.as_i32() == id {
        return Err(AppError::BadRequest("cannot delete your own account".to_string()));
    }

    let deleted = UserRepository::new(state.pool())
        .delete(UserId::new(id))
        .await?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("user {id}")))
    }
}

/// Change a user's role.
///
/// PUT /api/users/{id}/role
async fn update_role(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i32>,
    Json(request): Json<UpdateRoleRequest>,
) -> Result<StatusCode, AppError> {
    if admin.id.as_i32() == id && request.role != UserRole::Admin {
        return Err(AppError::BadRequest("cannot demote your own account".to_string()));
    }

    UserRepository::new(state.pool())
        .update_role(UserId::new(id), request.role)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Change a user's permission group.
///
/// PUT /api/users/{id}/group
async fn update_group(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<i32>,
    Json(request): Json<UpdateGroupRequest>,
) -> Result<StatusCode, AppError> {
    let group = request.permission_group.trim();
    if group.is_empty() {
        return Err(AppError::BadRequest("permission_group cannot be empty".to_string()));
    }

    UserRepository::new(state.pool())
        .update_permission_group(UserId::new(id), group)
        .await?;

    // Group change shifts the user's effective permissions.
    state.flag_caches().invalidate_all();

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Profile Handlers
// =============================================================================

/// Get the caller's profile and effective permissions.
///
/// GET /api/profile
async fn get_profile(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = UserRepository::new(state.pool())
        .get_by_id(current.id)
        .await?
        .ok_or_else(|| AppError::NotFound("account no longer exists".to_string()))?;

    let permissions = FeatureService::new(state.pool(), state.flag_caches())
        .effective_permissions(&user.permission_group)
        .await?;

    Ok(Json(ProfileResponse {
        permissions: permissions.iter().map(ToString::to_string).collect(),
        user: user.into(),
    }))
}

/// Update the caller's display name.
///
/// PUT /api/profile
async fn update_profile(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Json(request): Json<UpdateUserRequest>,
) -> Result<StatusCode, AppError> {
    let display_name = request.display_name.trim();
    if display_name.is_empty() {
        return Err(AppError::BadRequest("display_name cannot be empty".to_string()));
    }

    UserRepository::new(state.pool())
        .update_display_name(current.id, display_name)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
