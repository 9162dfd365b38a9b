//! Authorization guards that enforce permission checks at the type level
//! so handlers cannot accidentally bypass them.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ConversationStatus, ParticipantRole};

/// Authenticated user extracted from JWT claims.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for User
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by the auth middleware.
        let user_id = parts
            .extensions
            .get::<Uuid>()
            .copied()
            .ok_or(AppError::Unauthorized)?;

        Ok(User { id: user_id })
    }
}

/// A verified conversation participant.
///
/// `verify` performs one query answering both "does the conversation
/// exist" and "is the caller in it": an absent conversation is `NotFound`,
/// an existing one without the caller is `Forbidden`.
#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: Uuid,
    pub conversation_id: Uuid,
    pub role: ParticipantRole,
    pub status: ConversationStatus,
}

impl Participant {
    pub async fn verify(
        db: &PgPool,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Self, AppError> {
        let row = sqlx::query(
            r#"
            SELECT c.status AS status, cp.role AS role
            FROM conversations c
            LEFT JOIN conversation_participants cp
              ON cp.conversation_id = c.id AND cp.user_id = $2
            WHERE c.id = $1
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(db)
        .await
        .map_err(|e| AppError::Database(format!("verify participant: {e}")))?
        .ok_or(AppError::NotFound)?;

        let role: Option<String> = row.get("role");
        let role = role.ok_or(AppError::Forbidden)?;
        let status: String = row.get("status");

        Ok(Participant {
            user_id,
            conversation_id,
            role: ParticipantRole::from_db(&role)
                .ok_or_else(|| AppError::Database("invalid role in database".into()))?,
            status: ConversationStatus::from_db(&status)
                .ok_or_else(|| AppError::Database("invalid status in database".into()))?,
        })
    }

    /// Active-conversation gate for message operations; an archived
    /// conversation behaves as absent.
    pub fn require_active(&self) -> Result<(), AppError> {
        if self.status != ConversationStatus::Active {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archived_participant_fails_active_gate() {
        let p = Participant {
            user_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            role: ParticipantRole::Traveler,
            status: ConversationStatus::Archived,
        };
        assert!(matches!(p.require_active(), Err(AppError::NotFound)));

        let active = Participant {
            status: ConversationStatus::Active,
            ..p
        };
        assert!(active.require_active().is_ok());
    }
}
