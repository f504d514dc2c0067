//! Presence relay for support conversations.
//!
//! An authenticated pub/sub fan-out: sockets join a conversation room,
//! frames broadcast to every socket in the room. Best effort, at most once
//! per connected socket - no ordering or delivery guarantees.
//!
//! Dead sockets are dropped on send failure, and a 30-second interval task
//! prunes connections whose channel has closed. Empty rooms are removed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use concierge_core::{ConversationId, UserId};

/// How often closed connections are swept out of the room map.
const PRUNE_INTERVAL: Duration = Duration::from_secs(30);

/// Frames sent by clients over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// The user is typing.
    Typing,
    /// The user has read up to a message.
    Read { message_id: i32 },
    /// Keep-alive.
    Ping,
}

/// Frames broadcast to room members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A user joined the room.
    Joined { user_id: i32, display_name: String },
    /// A user left the room.
    Left { user_id: i32 },
    /// A user is typing.
    Typing { user_id: i32, display_name: String },
    /// A user read up to a message.
    Read { user_id: i32, message_id: i32 },
    /// A support message was posted (relayed from the HTTP handler).
    Message {
        message_id: i32,
        author_id: Option<i32>,
        body: String,
    },
    /// Keep-alive reply.
    Pong,
}

/// A connected room member.
struct RoomMember {
    user_id: UserId,
    display_name: String,
    sender: mpsc::UnboundedSender<ServerFrame>,
}

/// Handle to a single registered connection.
///
/// Dropping the receiver (socket task ending) is enough for the member to be
/// pruned; calling [`RelayHub::leave`] removes it eagerly and announces the
/// departure.
pub struct RelayConnection {
    pub connection_id: u64,
    pub receiver: mpsc::UnboundedReceiver<ServerFrame>,
}

/// In-memory presence relay shared across handlers.
///
/// Cheap to clone; the room map lives behind an `Arc`.
#[derive(Clone)]
pub struct RelayHub {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    rooms: RwLock<HashMap<ConversationId, HashMap<u64, RoomMember>>>,
    next_connection_id: AtomicU64,
}

impl RelayHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RelayInner {
                rooms: RwLock::new(HashMap::new()),
                next_connection_id: AtomicU64::new(1),
            }),
        }
    }

    /// Join a conversation room and announce the arrival to other members.
    pub async fn join(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        display_name: &str,
    ) -> RelayConnection {
        let connection_id = self.inner.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();

        {
            let mut rooms = self.inner.rooms.write().await;
            let room = rooms.entry(conversation_id).or_default();
            room.insert(
                connection_id,
                RoomMember {
                    user_id,
                    display_name: display_name.to_string(),
                    sender,
                },
            );
        }

        self.broadcast_except(
            conversation_id,
            connection_id,
            &ServerFrame::Joined {
                user_id: user_id.as_i32(),
                display_name: display_name.to_string(),
            },
        )
        .await;

        RelayConnection {
            connection_id,
            receiver,
        }
    }

    /// Leave a room and announce the departure.
    pub async fn leave(&self, conversation_id: ConversationId, connection_id: u64) {
        let left_user = {
            let mut rooms = self.inner.rooms.write().await;
            let Some(room) = rooms.get_mut(&conversation_id) else {
                return;
            };
            let member = room.remove(&connection_id);
            if room.is_empty() {
                rooms.remove(&conversation_id);
            }
            member.map(|m| m.user_id)
        };

        if let Some(user_id) = left_user {
            self.broadcast(
                conversation_id,
                &ServerFrame::Left {
                    user_id: user_id.as_i32(),
                },
            )
            .await;
        }
    }

    /// Broadcast a frame to every socket in a room.
    ///
    /// Sockets whose channel has closed are dropped on the spot.
    pub async fn broadcast(&self, conversation_id: ConversationId, frame: &ServerFrame) {
        self.broadcast_except(conversation_id, 0, frame).await;
    }

    /// Broadcast to a room, skipping one connection (the sender's own).
    pub async fn broadcast_except(
        &self,
        conversation_id: ConversationId,
        skip_connection_id: u64,
        frame: &ServerFrame,
    ) {
        let mut rooms = self.inner.rooms.write().await;
        let Some(room) = rooms.get_mut(&conversation_id) else {
            return;
        };

        room.retain(|&connection_id, member| {
            if connection_id == skip_connection_id {
                return true;
            }
            member.sender.send(frame.clone()).is_ok()
        });

        if room.is_empty() {
            rooms.remove(&conversation_id);
        }
    }

    /// Handle a client frame, fanning the matching server frame out to the
    /// rest of the room. Returns a direct reply for the sender, if any.
    pub async fn handle_client_frame(
        &self,
        conversation_id: ConversationId,
        connection_id: u64,
        frame: ClientFrame,
    ) -> Option<ServerFrame> {
        let member_info = {
            let rooms = self.inner.rooms.read().await;
            rooms
                .get(&conversation_id)
                .and_then(|room| room.get(&connection_id))
                .map(|m| (m.user_id, m.display_name.clone()))
        };
        let (user_id, display_name) = member_info?;

        match frame {
            ClientFrame::Typing => {
                self.broadcast_except(
                    conversation_id,
                    connection_id,
                    &ServerFrame::Typing {
                        user_id: user_id.as_i32(),
                        display_name,
                    },
                )
                .await;
                None
            }
            ClientFrame::Read { message_id } => {
                self.broadcast_except(
                    conversation_id,
                    connection_id,
                    &ServerFrame::Read {
                        user_id: user_id.as_i32(),
                        message_id,
                    },
                )
                .await;
                None
            }
            ClientFrame::Ping => Some(ServerFrame::Pong),
        }
    }

    /// Number of live connections in a room.
    pub async fn room_size(&self, conversation_id: ConversationId) -> usize {
        let rooms = self.inner.rooms.read().await;
        rooms.get(&conversation_id).map_or(0, HashMap::len)
    }

    /// Sweep closed connections out of every room.
    pub async fn prune(&self) {
        let mut rooms = self.inner.rooms.write().await;
        let before: usize = rooms.values().map(HashMap::len).sum();

        rooms.retain(|_, room| {
            room.retain(|_, member| !member.sender.is_closed());
            !room.is_empty()
        });

        let after: usize = rooms.values().map(HashMap::len).sum();
        if before != after {
            debug!(pruned = before - after, "pruned closed relay connections");
        }
    }

    /// Run the periodic prune loop. Spawned once at startup.
    pub async fn prune_loop(self) {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            self.prune().await;
        }
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_announces_to_existing_members() {
        let hub = RelayHub::new();
        let room = ConversationId::new(1);

        let mut first = hub.join(room, UserId::new(1), "Ana").await;
        let _second = hub.join(room, UserId::new(2), "Ben").await;

        let frame = first.receiver.recv().await.unwrap();
        assert_eq!(
            frame,
            ServerFrame::Joined {
                user_id: 2,
                display_name: "Ben".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_members() {
        let hub = RelayHub::new();
        let room = ConversationId::new(7);

        let mut a = hub.join(room, UserId::new(1), "Ana").await;
        let mut b = hub.join(room, UserId::new(2), "Ben").await;
        // Drain the join announcement Ana got for Ben.
        let _ = a.receiver.recv().await;

        let frame = ServerFrame::Message {
            message_id: 10,
            author_id: Some(1),
            body: "hello".to_string(),
        };
        hub.broadcast(room, &frame).await;

        assert_eq!(a.receiver.recv().await.unwrap(), frame);
        assert_eq!(b.receiver.recv().await.unwrap(), frame);
    }

    #[tokio::test]
    async fn test_typing_skips_sender() {
        let hub = RelayHub::new();
        let room = ConversationId::new(3);

        let mut a = hub.join(room, UserId::new(1), "Ana").await;
        let mut b = hub.join(room, UserId::new(2), "Ben").await;
        let _ = a.receiver.recv().await; // Ben's join

        let reply = hub
            .handle_client_frame(room, b.connection_id, ClientFrame::Typing)
            .await;
        assert!(reply.is_none());

        let frame = a.receiver.recv().await.unwrap();
        assert_eq!(
            frame,
            ServerFrame::Typing {
                user_id: 2,
                display_name: "Ben".to_string()
            }
        );
        // Ben must not hear his own typing.
        assert!(b.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ping_gets_direct_pong() {
        let hub = RelayHub::new();
        let room = ConversationId::new(4);
        let conn = hub.join(room, UserId::new(1), "Ana").await;

        let reply = hub
            .handle_client_frame(room, conn.connection_id, ClientFrame::Ping)
            .await;
        assert_eq!(reply, Some(ServerFrame::Pong));
    }

    #[tokio::test]
    async fn test_leave_announces_and_empties_room() {
        let hub = RelayHub::new();
        let room = ConversationId::new(5);

        let mut a = hub.join(room, UserId::new(1), "Ana").await;
        let b = hub.join(room, UserId::new(2), "Ben").await;
        let _ = a.receiver.recv().await;

        hub.leave(room, b.connection_id).await;
        assert_eq!(
            a.receiver.recv().await.unwrap(),
            ServerFrame::Left { user_id: 2 }
        );
        assert_eq!(hub.room_size(room).await, 1);

        hub.leave(room, a.connection_id).await;
        assert_eq!(hub.room_size(room).await, 0);
    }

    #[tokio::test]
    async fn test_prune_drops_closed_connections() {
        let hub = RelayHub::new();
        let room = ConversationId::new(6);

        let a = hub.join(room, UserId::new(1), "Ana").await;
        drop(a.receiver); // socket task gone without a clean leave

        assert_eq!(hub.room_size(room).await, 1);
        hub.prune().await;
        assert_eq!(hub.room_size(room).await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_drops_dead_sockets() {
        let hub = RelayHub::new();
        let room = ConversationId::new(8);

        let a = hub.join(room, UserId::new(1), "Ana").await;
        let mut b = hub.join(room, UserId::new(2), "Ben").await;
        drop(a.receiver);

        hub.broadcast(room, &ServerFrame::Pong).await;

        // Ana's join frame for Ben, then the pong.
        assert_eq!(b.receiver.recv().await.unwrap(), ServerFrame::Pong);
        assert_eq!(hub.room_size(room).await, 1);
    }

    #[test]
    fn test_frame_wire_format() {
        let json = serde_json::to_value(ServerFrame::Read {
            user_id: 1,
            message_id: 9,
        })
        .unwrap();
        assert_eq!(json["type"], "read");

        let frame: ClientFrame = serde_json::from_str("{\"type\":\"ping\"}").unwrap();
        assert_eq!(frame, ClientFrame::Ping);
    }
}
