//! Support conversation route handlers.
//!
//! Conversation CRUD, agent assignment, message posting (relayed to the
//! presence hub), and admin bulk actions with per-item error collection.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};

use concierge_core::{ConversationId, ConversationOrigin, ConversationStatus, UserId};

use crate::db::{ConversationFilter, ConversationRepository, UserRepository};
use crate::error::AppError;
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::{Conversation, CurrentUser, SupportMessage};
use crate::relay::ServerFrame;
use crate::state::AppState;

/// Build the support router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/support/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route("/api/support/conversations/bulk", post(bulk_action))
        .route(
            "/api/support/conversations/{id}",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/api/support/conversations/{id}/status", put(update_status))
        .route("/api/support/conversations/{id}/assign", put(assign))
        .route(
            "/api/support/conversations/{id}/messages",
            get(list_messages).post(post_message),
        )
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Response for a conversation.
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub id: i32,
    pub user_id: i32,
    pub subject: String,
    pub status: ConversationStatus,
    pub assigned_to: Option<i32>,
    pub origin: ConversationOrigin,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Conversation> for ConversationResponse {
    fn from(conversation: Conversation) -> Self {
        Self {
            id: conversation.id.as_i32(),
            user_id: conversation.user_id.as_i32(),
            subject: conversation.subject,
            status: conversation.status,
            assigned_to: conversation.assigned_to.map(|u| u.as_i32()),
            origin: conversation.origin,
            created_at: conversation.created_at.to_rfc3339(),
            updated_at: conversation.updated_at.to_rfc3339(),
        }
    }
}

/// Response for a support message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: i32,
    pub conversation_id: i32,
    pub author_id: Option<i32>,
    pub body: String,
    pub created_at: String,
}

impl From<SupportMessage> for MessageResponse {
    fn from(message: SupportMessage) -> Self {
        Self {
            id: message.id.as_i32(),
            conversation_id: message.conversation_id.as_i32(),
            author_id: message.author_id.map(|u| u.as_i32()),
            body: message.body,
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

/// Paginated conversation listing.
#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationResponse>,
    pub total: i64,
    pub page: i64,
}

/// Conversation with its messages.
#[derive(Debug, Serialize)]
pub struct ConversationDetailResponse {
    pub conversation: ConversationResponse,
    pub messages: Vec<MessageResponse>,
}

/// Query parameters for the conversation listing.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<ConversationStatus>,
    pub assigned_to: Option<i32>,
    /// Restrict to the caller's own conversations (implied for non-admins).
    #[serde(default)]
    pub mine: bool,
    #[serde(default = "default_page")]
    pub page: i64,
}

const fn default_page() -> i64 {
    1
}

const CONVERSATIONS_PER_PAGE: i64 = 20;

/// Request to open a conversation.
#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub subject: String,
    pub message: String,
}

/// Request to change a conversation's status.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ConversationStatus,
}

/// Request to assign a conversation.
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    /// `null` unassigns.
    pub assignee_id: Option<i32>,
}

/// Request to post a message.
#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub body: String,
}

/// Bulk action over conversations.
#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub action: BulkAction,
    pub ids: Vec<i32>,
    /// Target for the `assign` action.
    pub assignee_id: Option<i32>,
}

/// Supported bulk actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Close,
    Assign,
    Delete,
}

/// Per-item bulk failure.
#[derive(Debug, Serialize)]
pub struct BulkFailure {
    pub id: i32,
    pub error: String,
}

/// Result of a bulk action.
#[derive(Debug, Serialize, Default)]
pub struct BulkResult {
    pub succeeded: Vec<i32>,
    pub failed: Vec<BulkFailure>,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// List conversations.
///
/// GET /api/support/conversations
async fn list_conversations(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Query(query): Query<ListQuery>,
) -> Result<Json<ConversationListResponse>, AppError> {
    // Non-admins only ever see their own threads.
    let user_filter = if current.is_admin() && !query.mine {
        None
    } else {
        Some(current.id)
    };

    let filter = ConversationFilter {
        status: query.status,
        assigned_to: query.assigned_to.map(UserId::new).filter(|_| current.is_admin()),
        user_id: user_filter,
    };

    let repo = ConversationRepository::new(state.pool());
    let total = repo.count(&filter).await?;
    let page = query.page.max(1);
    let offset = (page - 1) * CONVERSATIONS_PER_PAGE;
    let conversations = repo.list(&filter, CONVERSATIONS_PER_PAGE, offset).await?;

    Ok(Json(ConversationListResponse {
        conversations: conversations.into_iter().map(Into::into).collect(),
        total,
        page,
    }))
}

/// Open a conversation with an initial message.
///
/// POST /api/support/conversations
async fn create_conversation(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Json(request): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationDetailResponse>), AppError> {
    let subject = request.subject.trim();
    let body = request.message.trim();
    if subject.is_empty() || body.is_empty() {
        return Err(AppError::BadRequest(
            "subject and message cannot be empty".to_string(),
        ));
    }

    let repo = ConversationRepository::new(state.pool());
    let conversation = repo
        .create(current.id, subject, ConversationOrigin::Manual)
        .await?;
    let message = repo
        .add_message(conversation.id, Some(current.id), body)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ConversationDetailResponse {
            conversation: conversation.into(),
            messages: vec![message.into()],
        }),
    ))
}

/// Get a conversation with its messages.
///
/// GET /api/support/conversations/{id}
async fn get_conversation(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<i32>,
) -> Result<Json<ConversationDetailResponse>, AppError> {
    let repo = ConversationRepository::new(state.pool());
    let conversation = load_visible(&repo, ConversationId::new(id), &current).await?;
    let messages = repo.messages(conversation.id).await?;

    Ok(Json(ConversationDetailResponse {
        conversation: conversation.into(),
        messages: messages.into_iter().map(Into::into).collect(),
    }))
}

/// Change a conversation's status.
///
/// PUT /api/support/conversations/{id}/status
async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<i32>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<StatusCode, AppError> {
    ConversationRepository::new(state.pool())
        .update_status(ConversationId::new(id), request.status)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Assign (or unassign) a conversation.
///
/// PUT /api/support/conversations/{id}/assign
async fn assign(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<i32>,
    Json(request): Json<AssignRequest>,
) -> Result<StatusCode, AppError> {
    if let Some(assignee_id) = request.assignee_id {
        UserRepository::new(state.pool())
            .get_by_id(UserId::new(assignee_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {assignee_id}")))?;
    }

    ConversationRepository::new(state.pool())
        .assign(ConversationId::new(id), request.assignee_id.map(UserId::new))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Delete a conversation.
///
/// DELETE /api/support/conversations/{id}
async fn delete_conversation(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    let deleted = ConversationRepository::new(state.pool())
        .delete(ConversationId::new(id))
        .await?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("conversation {id}")))
    }
}

/// List a conversation's messages.
///
/// GET /api/support/conversations/{id}/messages
async fn list_messages(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<i32>,
) -> Result<Json<Vec<MessageResponse>>, AppError> {
    let repo = ConversationRepository::new(state.pool());
    let conversation = load_visible(&repo, ConversationId::new(id), &current).await?;
    let messages = repo.messages(conversation.id).await?;

    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

/// Post a message and relay it to connected sockets.
///
/// POST /api/support/conversations/{id}/messages
async fn post_message(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<i32>,
    Json(request): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let body = request.body.trim();
    if body.is_empty() {
        return Err(AppError::BadRequest("body cannot be empty".to_string()));
    }

    let repo = ConversationRepository::new(state.pool());
    let conversation = load_visible(&repo, ConversationId::new(id), &current).await?;

    if conversation.status == ConversationStatus::Closed {
        return Err(AppError::Conflict("conversation is closed".to_string()));
    }

    let message = repo
        .add_message(conversation.id, Some(current.id), body)
        .await?;

    // Best-effort fan-out to connected sockets.
    state
        .relay()
        .broadcast(
            conversation.id,
            &ServerFrame::Message {
                message_id: message.id.as_i32(),
                author_id: message.author_id.map(|u| u.as_i32()),
                body: message.body.clone(),
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(message.into())))
}

/// Run a bulk action over a list of conversations.
///
/// POST /api/support/conversations/bulk
///
/// Items fail independently; the response partitions them.
async fn bulk_action(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Json(request): Json<BulkRequest>,
) -> Result<Json<BulkResult>, AppError> {
    if request.ids.is_empty() {
        return Err(AppError::BadRequest("ids cannot be empty".to_string()));
    }

    if request.action == BulkAction::Assign {
        let assignee_id = request
            .assignee_id
            .ok_or_else(|| AppError::BadRequest("assignee_id required for assign".to_string()))?;
        UserRepository::new(state.pool())
            .get_by_id(UserId::new(assignee_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {assignee_id}")))?;
    }

    let repo = ConversationRepository::new(state.pool());
    let mut result = BulkResult::default();

    for id in request.ids {
        let conversation_id = ConversationId::new(id);
        let outcome = match request.action {
            BulkAction::Close => repo
                .update_status(conversation_id, ConversationStatus::Closed)
                .await,
            BulkAction::Assign => repo
                .assign(conversation_id, request.assignee_id.map(UserId::new))
                .await,
            BulkAction::Delete => repo.delete(conversation_id).await.and_then(|deleted| {
                if deleted {
                    Ok(())
                } else {
                    Err(crate::db::RepositoryError::NotFound)
                }
            }),
        };

        match outcome {
            Ok(()) => result.succeeded.push(id),
            Err(e) => result.failed.push(BulkFailure {
                id,
                error: e.to_string(),
            }),
        }
    }

    Ok(Json(result))
}

/// Load a conversation the current user is allowed to see.
///
/// Owners, assignees, and admins qualify; everyone else gets 404 so IDs
/// don't leak.
async fn load_visible(
    repo: &ConversationRepository<'_>,
    id: ConversationId,
    current: &CurrentUser,
) -> Result<Conversation, AppError> {
    let conversation = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("conversation {id}")))?;

    let visible = current.is_admin()
        || conversation.user_id == current.id
        || conversation.assigned_to == Some(current.id);

    if !visible {
        return Err(AppError::NotFound(format!("conversation {id}")));
    }

    Ok(conversation)
}
