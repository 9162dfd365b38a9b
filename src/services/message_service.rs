use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::Participant;
use crate::models::message::MAX_CONTENT_CHARS;
use crate::models::{Message, MessageType, Pagination};

pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_PAGE_SIZE: i64 = 50;

pub struct MessageService;

fn message_from_row(row: &PgRow) -> Result<Message, AppError> {
    let message_type: String = row.get("message_type");
    Ok(Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        message_type: MessageType::from_db(&message_type)
            .ok_or_else(|| AppError::Database(format!("invalid message type: {message_type}")))?,
        read: row.get("read"),
        created_at: row.get("created_at"),
    })
}

/// Clamp client paging input: limit to [1, 100], page to >= 1.
pub fn clamp_paging(page: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, limit)
}

impl MessageService {
    /// Persist a message and bump the conversation's last-message
    /// timestamp in one transaction. Returns the stored row; its id and
    /// created_at are the canonical ones recipients must see.
    pub async fn append(
        db: &PgPool,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
        message_type: &str,
    ) -> Result<Message, AppError> {
        let message_type = MessageType::from_db(message_type).ok_or_else(|| {
            AppError::BadRequest(format!("unknown message type: {message_type}"))
        })?;

        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::BadRequest(
                "message content cannot be empty".into(),
            ));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(AppError::BadRequest(format!(
                "message content exceeds {MAX_CONTENT_CHARS} characters"
            )));
        }

        Participant::verify(db, sender_id, conversation_id)
            .await?
            .require_active()?;

        let id = Uuid::new_v4();
        let mut tx = db
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("begin: {e}")))?;

        let row = sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, content, message_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, conversation_id, sender_id, content, message_type, read, created_at
            "#,
        )
        .bind(id)
        .bind(conversation_id)
        .bind(sender_id)
        .bind(content)
        .bind(message_type.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("insert message: {e}")))?;

        let message = message_from_row(&row)?;

        sqlx::query(
            "UPDATE conversations SET last_message_at = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(conversation_id)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("update last_message_at: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("commit: {e}")))?;

        Ok(message)
    }

    /// Page through a conversation's messages, oldest first. Server-side
    /// creation time orders the result; paging input is clamped.
    pub async fn list(
        db: &PgPool,
        conversation_id: Uuid,
        caller_id: Uuid,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<(Vec<Message>, Pagination), AppError> {
        Participant::verify(db, caller_id, conversation_id)
            .await?
            .require_active()?;

        let (page, limit) = clamp_paging(page, limit);
        let offset = (page - 1) * limit;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = $1")
                .bind(conversation_id)
                .fetch_one(db)
                .await
                .map_err(|e| AppError::Database(format!("count messages: {e}")))?;

        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, sender_id, content, message_type, read, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(conversation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
        .map_err(|e| AppError::Database(format!("list messages: {e}")))?;

        let messages = rows
            .iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((messages, Pagination::new(page, limit, total)))
    }

    /// Flip the read flag for the given ids within one conversation.
    /// Ids outside the conversation and already-read messages are
    /// silently skipped; returns how many rows actually changed. The
    /// caller's participant row is stamped as a last-write-wins read
    /// marker.
    pub async fn mark_read(
        db: &PgPool,
        conversation_id: Uuid,
        caller_id: Uuid,
        message_ids: Vec<Uuid>,
    ) -> Result<u64, AppError> {
        Participant::verify(db, caller_id, conversation_id)
            .await?
            .require_active()?;

        if message_ids.is_empty() {
            return Ok(0);
        }

        let updated = sqlx::query(
            r#"
            UPDATE messages
            SET read = TRUE
            WHERE conversation_id = $1 AND id = ANY($2) AND read = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(&message_ids)
        .execute(db)
        .await
        .map_err(|e| AppError::Database(format!("mark read: {e}")))?
        .rows_affected();

        sqlx::query(
            r#"
            UPDATE conversation_participants
            SET last_read_at = NOW()
            WHERE conversation_id = $1 AND user_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(caller_id)
        .execute(db)
        .await
        .map_err(|e| AppError::Database(format!("stamp last_read_at: {e}")))?;

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_is_clamped_to_bounds() {
        assert_eq!(clamp_paging(None, None), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(clamp_paging(Some(0), Some(0)), (1, 1));
        assert_eq!(clamp_paging(Some(-3), Some(1000)), (1, MAX_PAGE_SIZE));
        assert_eq!(clamp_paging(Some(7), Some(25)), (7, 25));
    }
}
