use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::{ApiResponse, Conversation, ConversationPreview};
use crate::services::conversation_service::ConversationService;
use crate::services::rate_limit::EndpointClass;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    pub local_id: Option<Uuid>,
    pub city: Option<String>,
}

/// `POST /api/v1/chats` — find or create the caller's conversation with a
/// local expert. Idempotent; no realtime event is emitted for creation.
pub async fn create_chat(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Conversation>>), AppError> {
    let decision = state
        .governor
        .check(&user.id.to_string(), EndpointClass::Messaging);
    if !decision.allowed {
        return Err(AppError::RateLimited {
            retry_after_secs: decision.retry_after_secs(),
        });
    }

    let local_id = body
        .local_id
        .ok_or_else(|| AppError::BadRequest("local_id is required".into()))?;
    let city = body
        .city
        .ok_or_else(|| AppError::BadRequest("city is required".into()))?;

    let conversation = ConversationService::find_or_create(
        &state.db,
        state.profiles.as_ref(),
        user.id,
        local_id,
        &city,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(conversation))))
}

/// `GET /api/v1/chats` — the caller's conversations, most recently active
/// first, each with the other participant and the latest message.
pub async fn get_chats(
    State(state): State<AppState>,
    user: User,
) -> Result<Json<ApiResponse<Vec<ConversationPreview>>>, AppError> {
    let mut previews = ConversationService::list_for_user(&state.db, user.id).await?;

    // Display names come from the profile directory, best-effort: a
    // degraded directory must not take the chat listing down with it.
    for preview in &mut previews {
        match state.profiles.display_name(preview.peer.user_id).await {
            Ok(name) => preview.peer.display_name = name,
            Err(e) => {
                tracing::warn!(
                    peer_id = %preview.peer.user_id,
                    error = %e,
                    "display name lookup failed"
                );
            }
        }
    }

    Ok(Json(ApiResponse::ok(previews)))
}

/// `DELETE /api/v1/chats/:id` — archive (soft-delete) a conversation.
pub async fn archive_chat(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    ConversationService::archive(&state.db, conversation_id, user.id).await?;
    Ok(Json(ApiResponse::ok(json!({ "archived": true }))))
}
