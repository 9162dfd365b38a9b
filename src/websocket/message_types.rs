use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Inbound WebSocket events from client to server
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsInboundEvent {
    /// Join the caller's personal notification room.
    #[serde(rename = "join")]
    Join { user_id: Uuid },

    #[serde(rename = "join_chat")]
    JoinChat { conversation_id: Uuid },

    #[serde(rename = "leave_chat")]
    LeaveChat { conversation_id: Uuid },

    /// Legacy client path. Message creation must go through the REST
    /// endpoint so it passes the store and the rate governor; this event
    /// is answered with an error and never persisted.
    #[serde(rename = "send_message")]
    SendMessage { conversation_id: Uuid },

    #[serde(rename = "typing")]
    Typing {
        conversation_id: Uuid,
        user_name: String,
    },

    #[serde(rename = "stop_typing")]
    StopTyping {
        conversation_id: Uuid,
        user_name: String,
    },
}

/// Outbound WebSocket events from server to client
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsOutboundEvent {
    /// Canonical stored form of a new message (server id and timestamp).
    #[serde(rename = "new_message")]
    NewMessage { message: Message },

    #[serde(rename = "user_typing")]
    UserTyping {
        conversation_id: Uuid,
        user_id: Uuid,
        user_name: String,
    },

    #[serde(rename = "user_stopped_typing")]
    UserStoppedTyping {
        conversation_id: Uuid,
        user_id: Uuid,
        user_name: String,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_events_parse_by_tag() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"join_chat","conversation_id":"{id}"}}"#);
        let evt: WsInboundEvent = serde_json::from_str(&raw).unwrap();
        assert!(matches!(
            evt,
            WsInboundEvent::JoinChat { conversation_id } if conversation_id == id
        ));

        let raw = format!(
            r#"{{"type":"typing","conversation_id":"{id}","user_name":"Ana"}}"#
        );
        let evt: WsInboundEvent = serde_json::from_str(&raw).unwrap();
        assert!(matches!(evt, WsInboundEvent::Typing { .. }));

        assert!(serde_json::from_str::<WsInboundEvent>(r#"{"type":"presence"}"#).is_err());
    }

    #[test]
    fn outbound_typing_event_carries_tag() {
        let evt = WsOutboundEvent::UserTyping {
            conversation_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_name: "Ana".into(),
        };
        let value = serde_json::to_value(&evt).unwrap();
        assert_eq!(value["type"], "user_typing");
        assert_eq!(value["user_name"], "Ana");
    }
}
