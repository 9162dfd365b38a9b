//! End-to-end checks of the realtime fanout path and the rate governor,
//! using only in-process state (no database or Redis required).

use citymate_chat_service::config::{RateLimitConfig, RatePolicy};
use citymate_chat_service::models::{Message, MessageType};
use citymate_chat_service::services::rate_limit::{EndpointClass, RateGovernor};
use citymate_chat_service::websocket::{
    broadcast_event, message_types::WsOutboundEvent, ConnectionRegistry, RoomId,
};
use chrono::Utc;
use std::time::Duration;
use uuid::Uuid;

fn stored_message(conversation_id: Uuid, sender_id: Uuid) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id,
        content: "Hello".into(),
        message_type: MessageType::Text,
        read: false,
        created_at: Utc::now(),
    }
}

/// Redis client pointed at a closed port: publishes fail, which the
/// broadcast path must absorb without affecting local delivery.
fn unreachable_redis() -> redis::Client {
    redis::Client::open("redis://127.0.0.1:1/").unwrap()
}

#[tokio::test]
async fn both_connections_observe_one_broadcast_with_the_stored_id() {
    let registry = ConnectionRegistry::new();
    let redis = unreachable_redis();
    let conversation_id = Uuid::new_v4();
    let sender_id = Uuid::new_v4();
    let room = RoomId::Conversation(conversation_id);

    let (a, mut rx_a) = registry.register().await;
    let (b, mut rx_b) = registry.register().await;
    registry.join(a, room).await;
    registry.join(b, room).await;

    let stored = stored_message(conversation_id, sender_id);
    let event = WsOutboundEvent::NewMessage {
        message: stored.clone(),
    };
    broadcast_event(&registry, &redis, room, &event).await;

    for rx in [&mut rx_a, &mut rx_b] {
        let raw = rx.recv().await.expect("broadcast delivered");
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "new_message");
        assert_eq!(
            value["message"]["id"],
            serde_json::json!(stored.id.to_string())
        );
        assert_eq!(
            value["message"]["conversation_id"],
            serde_json::json!(conversation_id.to_string())
        );
        // Exactly one event per connection.
        assert!(rx.try_recv().is_err());
    }
}

#[tokio::test]
async fn user_room_notification_is_independent_of_conversation_rooms() {
    let registry = ConnectionRegistry::new();
    let redis = unreachable_redis();
    let recipient = Uuid::new_v4();
    let conversation_id = Uuid::new_v4();

    // Recipient listens on their personal room only (e.g. the chat list
    // page), not on the conversation room.
    let (conn, mut rx) = registry.register().await;
    registry.join(conn, RoomId::User(recipient)).await;

    let stored = stored_message(conversation_id, Uuid::new_v4());
    let event = WsOutboundEvent::NewMessage {
        message: stored,
    };
    broadcast_event(
        &registry,
        &redis,
        RoomId::Conversation(conversation_id),
        &event,
    )
    .await;
    assert!(rx.try_recv().is_err());

    broadcast_event(&registry, &redis, RoomId::User(recipient), &event).await;
    let raw = rx.recv().await.expect("user-room notification delivered");
    assert!(raw.contains("new_message"));
}

#[tokio::test]
async fn disconnected_recipient_is_skipped_without_error() {
    let registry = ConnectionRegistry::new();
    let redis = unreachable_redis();
    let room = RoomId::Conversation(Uuid::new_v4());

    let (a, rx_a) = registry.register().await;
    let (b, mut rx_b) = registry.register().await;
    registry.join(a, room).await;
    registry.join(b, room).await;

    // Connection a dies mid-flight; b must still receive the event.
    drop(rx_a);
    registry.disconnect(a).await;

    let event = WsOutboundEvent::UserTyping {
        conversation_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        user_name: "Ana".into(),
    };
    broadcast_event(&registry, &redis, room, &event).await;

    let raw = rx_b.recv().await.expect("surviving connection still served");
    assert!(raw.contains("user_typing"));
}

#[test]
fn governor_denies_the_sixth_call_and_recovers_after_the_window() {
    let tight = RatePolicy {
        window: Duration::from_millis(100),
        max_requests: 5,
        count_failures_only: false,
    };
    let config = RateLimitConfig {
        general: tight.clone(),
        auth: tight.clone(),
        messaging: tight,
        cleanup_threshold: 10_000,
    };
    let governor = RateGovernor::new(config);

    for _ in 0..5 {
        assert!(governor.check("traveler-1", EndpointClass::Messaging).allowed);
    }
    let denied = governor.check("traveler-1", EndpointClass::Messaging);
    assert!(!denied.allowed);
    assert!(denied.retry_after_secs() >= 1);

    std::thread::sleep(Duration::from_millis(150));
    assert!(governor.check("traveler-1", EndpointClass::Messaging).allowed);
}
