use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::{ApiResponse, Message};
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::MessageService;
use crate::services::rate_limit::EndpointClass;
use crate::state::AppState;
use crate::websocket::{broadcast_event, message_types::WsOutboundEvent, RoomId};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: Option<String>,
    pub message_type: Option<String>,
}

/// `POST /api/v1/chats/:id/messages` — persist a message, then fan the
/// stored form out to the conversation room and both participants' user
/// rooms. Recipients always see the server-assigned id and timestamp,
/// never a client's optimistic copy.
pub async fn send_message(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Message>>), AppError> {
    let decision = state
        .governor
        .check(&user.id.to_string(), EndpointClass::Messaging);
    if !decision.allowed {
        return Err(AppError::RateLimited {
            retry_after_secs: decision.retry_after_secs(),
        });
    }

    let content = body
        .content
        .ok_or_else(|| AppError::BadRequest("content is required".into()))?;
    let message_type = body.message_type.as_deref().unwrap_or("text");

    let message = MessageService::append(
        &state.db,
        conversation_id,
        user.id,
        &content,
        message_type,
    )
    .await?;

    // The message is durable from here on; fanout is best-effort and must
    // not fail the request.
    let event = WsOutboundEvent::NewMessage {
        message: message.clone(),
    };
    broadcast_event(
        &state.registry,
        &state.redis,
        RoomId::Conversation(conversation_id),
        &event,
    )
    .await;

    match ConversationService::participant_ids(&state.db, conversation_id).await {
        Ok(participant_ids) => {
            for participant_id in participant_ids {
                broadcast_event(
                    &state.registry,
                    &state.redis,
                    RoomId::User(participant_id),
                    &event,
                )
                .await;
            }
        }
        Err(e) => {
            tracing::warn!(
                conversation_id = %conversation_id,
                error = %e,
                "user-room fanout skipped"
            );
        }
    }

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(message))))
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// `GET /api/v1/chats/:id/messages?page=&limit=` — paginated history,
/// oldest first within the page.
pub async fn get_messages(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<ListMessagesParams>,
) -> Result<Json<ApiResponse<Vec<Message>>>, AppError> {
    let (messages, pagination) = MessageService::list(
        &state.db,
        conversation_id,
        user.id,
        params.page,
        params.limit,
    )
    .await?;

    Ok(Json(ApiResponse::ok_paginated(messages, pagination)))
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub message_ids: Option<Vec<Uuid>>,
}

/// `PUT /api/v1/chats/:id/read` — flip read flags for the given ids;
/// foreign ids are silently ignored, repeats are no-ops.
pub async fn mark_read(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<MarkReadRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let message_ids = body
        .message_ids
        .ok_or_else(|| AppError::BadRequest("message_ids must be an array".into()))?;

    let updated =
        MessageService::mark_read(&state.db, conversation_id, user.id, message_ids).await?;

    Ok(Json(ApiResponse::ok(json!({ "updated": updated }))))
}
