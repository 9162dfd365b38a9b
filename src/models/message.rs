use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_CONTENT_CHARS: usize = 1000;

/// Message payload kind. "image" and "location" are stored as opaque
/// enumerated values; their payloads are not interpreted server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Location,
}

impl MessageType {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "location" => Some(Self::Location),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Location => "location",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_round_trips() {
        for t in [MessageType::Text, MessageType::Image, MessageType::Location] {
            assert_eq!(MessageType::from_db(t.as_str()), Some(t));
        }
        assert_eq!(MessageType::from_db("video"), None);
    }

    #[test]
    fn message_serializes_with_lowercase_type() {
        let msg = Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            content: "hello".into(),
            message_type: MessageType::Text,
            read: false,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["message_type"], "text");
        assert_eq!(value["read"], false);
    }
}
