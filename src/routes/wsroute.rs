use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::middleware::auth::verify_jwt;
use crate::services::conversation_service::ConversationService;
use crate::state::AppState;
use crate::websocket::{
    broadcast_event,
    message_types::{WsInboundEvent, WsOutboundEvent},
    ConnectionId, RoomId,
};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Token validation: browsers cannot set headers on WebSocket upgrades,
/// so a `token` query parameter is accepted alongside the Bearer header.
fn authenticate(params: &WsParams, headers: &HeaderMap) -> Result<Uuid, StatusCode> {
    let token = params.token.clone().or_else(|| {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(|s| s.to_string())
    });

    let Some(token) = token else {
        warn!("WebSocket connection rejected: no token provided");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let claims = verify_jwt(&token).map_err(|e| {
        warn!("WebSocket connection rejected: invalid token: {:?}", e);
        StatusCode::UNAUTHORIZED
    })?;

    Uuid::parse_str(&claims.sub).map_err(|_| {
        warn!("WebSocket connection rejected: malformed subject claim");
        StatusCode::UNAUTHORIZED
    })
}

/// `GET /api/v1/ws` — live connection endpoint.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let user_id = match authenticate(&params, &headers) {
        Ok(user_id) => user_id,
        Err(status) => return status.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(state, user_id, socket))
}

async fn handle_socket(state: AppState, user_id: Uuid, socket: WebSocket) {
    // Register before anything else so broadcasts arriving during setup
    // are not lost; the connection starts with an empty room set and
    // joins rooms via events.
    let (connection_id, mut rx) = state.registry.register().await;
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            // Outgoing broadcast messages
            maybe = rx.recv() => {
                match maybe {
                    Some(payload) => {
                        if sender.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Incoming client events
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WsInboundEvent>(&text) {
                            Ok(evt) => {
                                if let Some(reply) =
                                    handle_ws_event(&state, connection_id, user_id, evt).await
                                {
                                    let Ok(raw) = serde_json::to_string(&reply) else {
                                        error!("failed to serialize direct reply");
                                        continue;
                                    };
                                    if sender.send(Message::Text(raw)).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(user_id = %user_id, "unparseable WS event: {e}");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    // Runs exactly once for every connection, however it terminated.
    state.registry.disconnect(connection_id).await;
}

/// Apply one inbound event. Returns an event to send back on the same
/// connection, if any; room broadcasts go through `broadcast_event`.
async fn handle_ws_event(
    state: &AppState,
    connection_id: ConnectionId,
    user_id: Uuid,
    evt: WsInboundEvent,
) -> Option<WsOutboundEvent> {
    match evt {
        WsInboundEvent::Join { user_id: claimed } => {
            // The notification room is scoped to the authenticated user;
            // a mismatched claim is rejected rather than honored.
            if claimed != user_id {
                return Some(WsOutboundEvent::Error {
                    message: "cannot join another user's notification room".into(),
                });
            }
            state.registry.join(connection_id, RoomId::User(user_id)).await;
            None
        }

        WsInboundEvent::JoinChat { conversation_id } => {
            match ConversationService::is_participant(&state.db, conversation_id, user_id).await {
                Ok(true) => {
                    state
                        .registry
                        .join(connection_id, RoomId::Conversation(conversation_id))
                        .await;
                    None
                }
                Ok(false) => Some(WsOutboundEvent::Error {
                    message: "not a participant of this conversation".into(),
                }),
                Err(e) => {
                    error!(
                        conversation_id = %conversation_id,
                        error = %e,
                        "membership check failed"
                    );
                    Some(WsOutboundEvent::Error {
                        message: "could not verify conversation membership".into(),
                    })
                }
            }
        }

        WsInboundEvent::LeaveChat { conversation_id } => {
            state
                .registry
                .leave(connection_id, RoomId::Conversation(conversation_id))
                .await;
            None
        }

        WsInboundEvent::SendMessage { conversation_id } => {
            // Legacy path: the REST endpoint is the system of record.
            warn!(
                user_id = %user_id,
                conversation_id = %conversation_id,
                "live-channel send rejected"
            );
            Some(WsOutboundEvent::Error {
                message: "send messages via POST /api/v1/chats/:id/messages".into(),
            })
        }

        WsInboundEvent::Typing {
            conversation_id,
            user_name,
        } => {
            relay_typing(state, connection_id, user_id, conversation_id, user_name, true).await;
            None
        }

        WsInboundEvent::StopTyping {
            conversation_id,
            user_name,
        } => {
            relay_typing(state, connection_id, user_id, conversation_id, user_name, false).await;
            None
        }
    }
}

/// Relay an ephemeral typing event to the conversation room. Only
/// connections that joined the room may emit into it; nothing is
/// persisted or queued, so an empty room simply swallows the event.
async fn relay_typing(
    state: &AppState,
    connection_id: ConnectionId,
    user_id: Uuid,
    conversation_id: Uuid,
    user_name: String,
    is_typing: bool,
) {
    let room = RoomId::Conversation(conversation_id);
    if !state.registry.is_joined(connection_id, room).await {
        return;
    }

    let event = if is_typing {
        WsOutboundEvent::UserTyping {
            conversation_id,
            user_id,
            user_name,
        }
    } else {
        WsOutboundEvent::UserStoppedTyping {
            conversation_id,
            user_id,
            user_name,
        }
    };

    broadcast_event(&state.registry, &state.redis, room, &event).await;
}
