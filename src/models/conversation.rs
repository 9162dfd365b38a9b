use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Archived,
}

impl ConversationStatus {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Traveler,
    Local,
}

impl ParticipantRole {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "traveler" => Some(Self::Traveler),
            "local" => Some(Self::Local),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Traveler => "traveler",
            Self::Local => "local",
        }
    }
}

/// A chat channel pairing one traveler with one local expert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub traveler_id: Uuid,
    pub local_id: Uuid,
    pub city: String,
    pub status: ConversationStatus,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The other side of a conversation as shown in the chat listing.
#[derive(Debug, Clone, Serialize)]
pub struct Peer {
    pub user_id: Uuid,
    pub role: ParticipantRole,
    pub display_name: Option<String>,
}

/// One entry of the caller's chat listing.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationPreview {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub peer: Peer,
    pub last_message: Option<Message>,
    pub unread_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_db_strings() {
        assert_eq!(
            ConversationStatus::from_db("active"),
            Some(ConversationStatus::Active)
        );
        assert_eq!(
            ConversationStatus::from_db(ConversationStatus::Archived.as_str()),
            Some(ConversationStatus::Archived)
        );
        assert_eq!(ConversationStatus::from_db("deleted"), None);
    }

    #[test]
    fn role_rejects_unknown_values() {
        assert_eq!(
            ParticipantRole::from_db("local"),
            Some(ParticipantRole::Local)
        );
        assert_eq!(ParticipantRole::from_db("admin"), None);
    }
}
