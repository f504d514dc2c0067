//! Integration tests for the support presence relay.
//!
//! Drives the hub directly (no sockets): join/leave fan-out, typing and
//! read-receipt propagation, and pruning of dead connections.

use concierge_core::{ConversationId, UserId};
use concierge_server::relay::{ClientFrame, RelayHub, ServerFrame};

#[tokio::test]
async fn test_presence_lifecycle() {
    let hub = RelayHub::new();
    let room = ConversationId::new(1);

    let mut agent = hub.join(room, UserId::new(10), "Agent").await;
    let customer = hub.join(room, UserId::new(20), "Customer").await;

    // Agent hears the customer arrive.
    assert_eq!(
        agent.receiver.recv().await,
        Some(ServerFrame::Joined {
            user_id: 20,
            display_name: "Customer".to_string()
        })
    );

    hub.leave(room, customer.connection_id).await;
    assert_eq!(
        agent.receiver.recv().await,
        Some(ServerFrame::Left { user_id: 20 })
    );
    assert_eq!(hub.room_size(room).await, 1);
}

#[tokio::test]
async fn test_typing_and_read_receipts_fan_out() {
    let hub = RelayHub::new();
    let room = ConversationId::new(2);

    let mut agent = hub.join(room, UserId::new(10), "Agent").await;
    let customer = hub.join(room, UserId::new(20), "Customer").await;
    let _ = agent.receiver.recv().await; // join frame

    hub.handle_client_frame(room, customer.connection_id, ClientFrame::Typing)
        .await;
    assert_eq!(
        agent.receiver.recv().await,
        Some(ServerFrame::Typing {
            user_id: 20,
            display_name: "Customer".to_string()
        })
    );

    hub.handle_client_frame(room, customer.connection_id, ClientFrame::Read { message_id: 7 })
        .await;
    assert_eq!(
        agent.receiver.recv().await,
        Some(ServerFrame::Read {
            user_id: 20,
            message_id: 7
        })
    );
}

#[tokio::test]
async fn test_message_broadcast_reaches_every_room_member() {
    let hub = RelayHub::new();
    let room = ConversationId::new(3);

    let mut a = hub.join(room, UserId::new(1), "A").await;
    let mut b = hub.join(room, UserId::new(2), "B").await;
    let mut c = hub.join(room, UserId::new(3), "C").await;
    // Drain join announcements.
    let _ = a.receiver.recv().await;
    let _ = a.receiver.recv().await;
    let _ = b.receiver.recv().await;

    let frame = ServerFrame::Message {
        message_id: 42,
        author_id: Some(1),
        body: "on my way".to_string(),
    };
    hub.broadcast(room, &frame).await;

    assert_eq!(a.receiver.recv().await, Some(frame.clone()));
    assert_eq!(b.receiver.recv().await, Some(frame.clone()));
    assert_eq!(c.receiver.recv().await, Some(frame));
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    let hub = RelayHub::new();

    let mut here = hub.join(ConversationId::new(4), UserId::new(1), "Here").await;
    let _there = hub.join(ConversationId::new(5), UserId::new(2), "There").await;

    // The join in the other room must not leak across.
    assert!(here.receiver.try_recv().is_err());
}

#[tokio::test]
async fn test_prune_removes_abandoned_connections() {
    let hub = RelayHub::new();
    let room = ConversationId::new(6);

    let abandoned = hub.join(room, UserId::new(1), "Ghost").await;
    drop(abandoned.receiver);
    let _live = hub.join(room, UserId::new(2), "Live").await;

    assert_eq!(hub.room_size(room).await, 2);
    hub.prune().await;
    assert_eq!(hub.room_size(room).await, 1);
}

#[test]
fn test_client_frame_wire_format() {
    let typing: ClientFrame = serde_json::from_str(r#"{"type":"typing"}"#).expect("parses");
    assert_eq!(typing, ClientFrame::Typing);

    let read: ClientFrame =
        serde_json::from_str(r#"{"type":"read","message_id":12}"#).expect("parses");
    assert_eq!(read, ClientFrame::Read { message_id: 12 });

    let json = serde_json::to_value(ServerFrame::Pong).expect("serializes");
    assert_eq!(json["type"], "pong");
}
