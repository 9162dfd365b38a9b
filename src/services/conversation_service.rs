use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::conversation::Peer;
use crate::models::{Conversation, ConversationPreview, ConversationStatus, ParticipantRole};
use crate::models::{Message, MessageType};
use crate::services::profile_client::ProfileDirectory;

pub struct ConversationService;

/// Canonical ordering of an unordered participant pair. Lookups and the
/// uniqueness constraint are keyed by this, so argument order never
/// matters.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn conversation_from_row(row: &PgRow) -> Result<Conversation, AppError> {
    let status: String = row.get("status");
    Ok(Conversation {
        id: row.get("id"),
        traveler_id: row.get("traveler_id"),
        local_id: row.get("local_id"),
        city: row.get("city"),
        status: ConversationStatus::from_db(&status)
            .ok_or_else(|| AppError::Database(format!("invalid conversation status: {status}")))?,
        last_message_at: row.get("last_message_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

const CONVERSATION_COLUMNS: &str =
    "id, traveler_id, local_id, city, status, last_message_at, created_at, updated_at";

impl ConversationService {
    /// Return the single active conversation for a traveler/local pair,
    /// creating it if none exists. Idempotent: re-requesting an existing
    /// pair returns the same conversation.
    pub async fn find_or_create(
        db: &PgPool,
        profiles: &dyn ProfileDirectory,
        traveler_id: Uuid,
        local_id: Uuid,
        city: &str,
    ) -> Result<Conversation, AppError> {
        if traveler_id == local_id {
            return Err(AppError::BadRequest(
                "cannot start a conversation with yourself".into(),
            ));
        }
        let city = city.trim();
        if city.is_empty() {
            return Err(AppError::BadRequest("city is required".into()));
        }

        // The profile directory owns local-expert profiles; an id that it
        // does not confirm is rejected before anything is written.
        if !profiles.local_exists(local_id).await? {
            return Err(AppError::BadRequest(format!(
                "local profile {local_id} does not exist"
            )));
        }

        if let Some(existing) = Self::find_active_for_pair(db, traveler_id, local_id).await? {
            return Ok(existing);
        }

        let (low, high) = canonical_pair(traveler_id, local_id);
        let id = Uuid::new_v4();

        let mut tx = db
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("begin: {e}")))?;

        // The partial unique index on (participant_low, participant_high)
        // arbitrates concurrent creates; the loser sees no returned row.
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO conversations
                (id, traveler_id, local_id, participant_low, participant_high, city)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (participant_low, participant_high) WHERE status = 'active'
            DO NOTHING
            RETURNING {CONVERSATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(traveler_id)
        .bind(local_id)
        .bind(low)
        .bind(high)
        .bind(city)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("insert conversation: {e}")))?;

        let Some(row) = inserted else {
            // Lost the race: abandon our transaction and return the winner.
            tx.rollback()
                .await
                .map_err(|e| AppError::Database(format!("rollback: {e}")))?;
            return Self::find_active_for_pair(db, traveler_id, local_id)
                .await?
                .ok_or(AppError::Internal);
        };

        sqlx::query(
            r#"
            INSERT INTO conversation_participants (conversation_id, user_id, role)
            VALUES ($1, $2, 'traveler'), ($1, $3, 'local')
            "#,
        )
        .bind(id)
        .bind(traveler_id)
        .bind(local_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("insert participants: {e}")))?;

        let conversation = conversation_from_row(&row)?;

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("commit: {e}")))?;

        tracing::info!(
            conversation_id = %conversation.id,
            traveler_id = %traveler_id,
            local_id = %local_id,
            "conversation created"
        );

        Ok(conversation)
    }

    /// Find the active conversation containing both users, regardless of
    /// stored order.
    pub async fn find_active_for_pair(
        db: &PgPool,
        a: Uuid,
        b: Uuid,
    ) -> Result<Option<Conversation>, AppError> {
        let (low, high) = canonical_pair(a, b);
        let row = sqlx::query(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM conversations
            WHERE participant_low = $1 AND participant_high = $2 AND status = 'active'
            "#
        ))
        .bind(low)
        .bind(high)
        .fetch_optional(db)
        .await
        .map_err(|e| AppError::Database(format!("find conversation: {e}")))?;

        row.as_ref().map(conversation_from_row).transpose()
    }

    /// Soft-delete a conversation on behalf of one of its participants.
    /// Repeated calls are no-ops; the row is never hard-deleted here.
    pub async fn archive(
        db: &PgPool,
        conversation_id: Uuid,
        caller_id: Uuid,
    ) -> Result<(), AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE conversations c
            SET status = 'archived', updated_at = NOW()
            WHERE c.id = $1
              AND EXISTS (
                SELECT 1 FROM conversation_participants cp
                WHERE cp.conversation_id = c.id AND cp.user_id = $2
              )
            "#,
        )
        .bind(conversation_id)
        .bind(caller_id)
        .execute(db)
        .await
        .map_err(|e| AppError::Database(format!("archive conversation: {e}")))?
        .rows_affected();

        if updated == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    /// Membership check used by conversation-scoped operations.
    pub async fn is_participant(
        db: &PgPool,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, AppError> {
        let row = sqlx::query(
            r#"
            SELECT 1 AS present
            FROM conversation_participants
            WHERE conversation_id = $1 AND user_id = $2
            LIMIT 1
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(db)
        .await
        .map_err(|e| AppError::Database(format!("is_participant: {e}")))?;
        Ok(row.is_some())
    }

    /// Both participant ids of a conversation.
    pub async fn participant_ids(
        db: &PgPool,
        conversation_id: Uuid,
    ) -> Result<Vec<Uuid>, AppError> {
        let rows = sqlx::query(
            "SELECT user_id FROM conversation_participants WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_all(db)
        .await
        .map_err(|e| AppError::Database(format!("participant_ids: {e}")))?;
        Ok(rows.into_iter().map(|r| r.get("user_id")).collect())
    }

    /// All active conversations for a user, each with the other
    /// participant, the latest message and the caller's unread count,
    /// most recently active first (conversations without messages sort by
    /// creation time).
    pub async fn list_for_user(
        db: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<ConversationPreview>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT
                c.id, c.traveler_id, c.local_id, c.city, c.status,
                c.last_message_at, c.created_at, c.updated_at,
                op.user_id AS peer_id,
                op.role AS peer_role,
                m.id AS last_id,
                m.sender_id AS last_sender_id,
                m.content AS last_content,
                m.message_type AS last_type,
                m.read AS last_read,
                m.created_at AS last_created_at,
                (
                    SELECT COUNT(*) FROM messages um
                    WHERE um.conversation_id = c.id
                      AND um.sender_id <> $1
                      AND um.read = FALSE
                ) AS unread_count
            FROM conversations c
            JOIN conversation_participants cp
              ON cp.conversation_id = c.id AND cp.user_id = $1
            JOIN conversation_participants op
              ON op.conversation_id = c.id AND op.user_id <> $1
            LEFT JOIN LATERAL (
                SELECT id, sender_id, content, message_type, read, created_at
                FROM messages
                WHERE conversation_id = c.id
                ORDER BY created_at DESC, id DESC
                LIMIT 1
            ) m ON TRUE
            WHERE c.status = 'active'
            ORDER BY COALESCE(c.last_message_at, c.created_at) DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await
        .map_err(|e| AppError::Database(format!("list conversations: {e}")))?;

        rows.iter()
            .map(|row| {
                let conversation = conversation_from_row(row)?;
                let peer_role: String = row.get("peer_role");

                let last_message = match row.get::<Option<Uuid>, _>("last_id") {
                    Some(id) => {
                        let message_type: String = row.get("last_type");
                        Some(Message {
                            id,
                            conversation_id: conversation.id,
                            sender_id: row.get("last_sender_id"),
                            content: row.get("last_content"),
                            message_type: MessageType::from_db(&message_type).ok_or_else(
                                || {
                                    AppError::Database(format!(
                                        "invalid message type: {message_type}"
                                    ))
                                },
                            )?,
                            read: row.get("last_read"),
                            created_at: row.get("last_created_at"),
                        })
                    }
                    None => None,
                };

                Ok(ConversationPreview {
                    conversation,
                    peer: Peer {
                        user_id: row.get("peer_id"),
                        role: ParticipantRole::from_db(&peer_role).ok_or_else(|| {
                            AppError::Database(format!("invalid role: {peer_role}"))
                        })?,
                        display_name: None,
                    },
                    last_message,
                    unread_count: row.get("unread_count"),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_pair_ignores_argument_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(canonical_pair(a, b), canonical_pair(b, a));
        let (low, high) = canonical_pair(a, b);
        assert!(low <= high);
    }
}
