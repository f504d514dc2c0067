//! WebSocket endpoint for the support presence relay.
//!
//! Sockets authenticate via the regular session cookie, join a conversation
//! room, and exchange the relay's typed frames as JSON text messages.

use axum::{
    Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tracing::debug;

use concierge_core::ConversationId;

use crate::db::ConversationRepository;
use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::CurrentUser;
use crate::relay::{ClientFrame, RelayHub, ServerFrame};
use crate::state::AppState;

/// Build the relay router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/support/conversations/{id}/ws", get(upgrade))
}

/// Authenticate, authorize, and upgrade the connection.
///
/// GET /api/support/conversations/{id}/ws
async fn upgrade(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<i32>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let conversation_id = ConversationId::new(id);

    // Owners, assignees, and admins may join; everyone else gets 404.
    let conversation = ConversationRepository::new(state.pool())
        .get(conversation_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("conversation {id}")))?;

    let allowed = current.is_admin()
        || conversation.user_id == current.id
        || conversation.assigned_to == Some(current.id);
    if !allowed {
        return Err(AppError::NotFound(format!("conversation {id}")));
    }

    let hub = state.relay().clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, conversation_id, current)))
}

/// Pump frames between the socket and the relay room.
async fn handle_socket(
    socket: WebSocket,
    hub: RelayHub,
    conversation_id: ConversationId,
    user: CurrentUser,
) {
    let mut connection = hub
        .join(conversation_id, user.id, &user.display_name)
        .await;
    debug!(
        conversation_id = %conversation_id,
        user_id = %user.id,
        "relay socket connected"
    );

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            // Room frames fanning out to this socket.
            frame = connection.receiver.recv() => {
                let Some(frame) = frame else { break };
                if send_frame(&mut sink, &frame).await.is_err() {
                    break;
                }
            }
            // Frames arriving from this socket.
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(frame) = serde_json::from_str::<ClientFrame>(text.as_str()) else {
                            // Malformed frames are dropped, not fatal.
                            continue;
                        };
                        if let Some(reply) = hub
                            .handle_client_frame(conversation_id, connection.connection_id, frame)
                            .await
                        {
                            if send_frame(&mut sink, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary/ping/pong handled by axum
                    Some(Err(_)) => break,
                }
            }
        }
    }

    hub.leave(conversation_id, connection.connection_id).await;
    debug!(
        conversation_id = %conversation_id,
        user_id = %user.id,
        "relay socket disconnected"
    );
}

/// Serialize and send one server frame.
async fn send_frame(
    sink: &mut (impl SinkExt<Message> + Unpin),
    frame: &ServerFrame,
) -> Result<(), ()> {
    let json = serde_json::to_string(frame).map_err(|_| ())?;
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}
