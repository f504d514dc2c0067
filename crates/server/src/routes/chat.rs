//! Assistant chat route handlers.
//!
//! Session CRUD plus blocking and SSE-streaming message sends.

use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use concierge_core::{ChatSessionId, ChatRole};

use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::{ChatMessage, ChatSession};
use crate::services::{ChatService, SendOutcome, stream_chat_message};
use crate::state::AppState;

/// Build the chat router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/chat/sessions", get(list_sessions).post(create_session))
        .route(
            "/api/chat/sessions/{id}",
            get(get_session).delete(delete_session),
        )
        .route("/api/chat/sessions/{id}/messages", post(send_message))
        .route(
            "/api/chat/sessions/{id}/messages/stream",
            post(send_message_stream),
        )
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Response for a chat session.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: i32,
    pub title: Option<String>,
    pub handed_off: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ChatSession> for SessionResponse {
    fn from(session: ChatSession) -> Self {
        Self {
            id: session.id.as_i32(),
            title: session.title,
            handed_off: session.handed_off,
            created_at: session.created_at.to_rfc3339(),
            updated_at: session.updated_at.to_rfc3339(),
        }
    }
}

/// Response for a chat session with messages.
#[derive(Debug, Serialize)]
pub struct SessionWithMessagesResponse {
    pub session: SessionResponse,
    pub messages: Vec<MessageResponse>,
}

/// Response for a chat message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: i32,
    pub role: ChatRole,
    pub content: serde_json::Value,
    pub created_at: String,
}

impl From<ChatMessage> for MessageResponse {
    fn from(message: ChatMessage) -> Self {
        Self {
            id: message.id.as_i32(),
            role: message.role,
            content: message.content,
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

/// Request to send a message.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

/// Response for sending a message (non-streaming).
#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub messages: Vec<MessageResponse>,
    /// Set when the message triggered a handoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff_conversation_id: Option<i32>,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// List chat sessions for the current user.
///
/// GET /api/chat/sessions
async fn list_sessions(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let service = ChatService::new(state.pool(), state.claude());
    let sessions = service.list_sessions(current.id).await?;

    Ok(Json(sessions.into_iter().map(Into::into).collect()))
}

/// Create a new chat session.
///
/// POST /api/chat/sessions
async fn create_session(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let service = ChatService::new(state.pool(), state.claude());
    let session = service.create_session(current.id).await?;

    Ok((StatusCode::CREATED, Json(session.into())))
}

/// Get a chat session with all its messages.
///
/// GET /api/chat/sessions/{id}
async fn get_session(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<i32>,
) -> Result<Json<SessionWithMessagesResponse>, AppError> {
    let session_id = ChatSessionId::new(id);
    let service = ChatService::new(state.pool(), state.claude());

    let session = service.get_owned_session(session_id, current.id).await?;
    let messages = service.get_messages(session_id, current.id).await?;

    Ok(Json(SessionWithMessagesResponse {
        session: session.into(),
        messages: messages.into_iter().map(Into::into).collect(),
    }))
}

/// Delete a chat session.
///
/// DELETE /api/chat/sessions/{id}
async fn delete_session(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    let service = ChatService::new(state.pool(), state.claude());
    service
        .delete_session(ChatSessionId::new(id), current.id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Send a message and wait for the complete reply.
///
/// POST /api/chat/sessions/{id}/messages
///
/// Returns the persisted user and assistant messages, or the handoff
/// conversation when the message escalated.
async fn send_message(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<i32>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, AppError> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("message cannot be empty".to_string()));
    }

    let service = ChatService::new(state.pool(), state.claude());
    let outcome = service
        .send_message(ChatSessionId::new(id), current.id, message)
        .await?;

    let response = match outcome {
        SendOutcome::Reply {
            user_message,
            assistant_message,
        } => SendMessageResponse {
            messages: vec![user_message.into(), assistant_message.into()],
            handoff_conversation_id: None,
        },
        SendOutcome::Handoff {
            user_message,
            conversation,
            ..
        } => SendMessageResponse {
            messages: vec![user_message.into()],
            handoff_conversation_id: Some(conversation.id.as_i32()),
        },
    };

    Ok(Json(response))
}

/// Send a message and stream the reply via SSE.
///
/// POST /api/chat/sessions/{id}/messages/stream
///
/// Emits `delta` events as tokens arrive, then `done` (or `handoff`/`error`).
async fn send_message_stream(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<i32>,
    Json(request): Json<SendMessageRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Clone owned values for the streaming function (all cheap Arc clones).
    let pool = state.pool().clone();
    let claude = state.claude().clone();

    let event_stream = stream_chat_message(
        pool,
        claude,
        ChatSessionId::new(id),
        current.id,
        request.message,
    );

    // Map ChatStreamEvent to SSE Event
    let sse_stream = event_stream.map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_else(|_| {
            r#"{"type":"error","message":"Failed to serialize event"}"#.to_string()
        });
        Ok(Event::default().data(json))
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}
