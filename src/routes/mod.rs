use crate::state::AppState;
use axum::middleware;
use axum::{
    routing::{delete, get, post, put},
    Router,
};

pub mod chats;
use chats::{archive_chat, create_chat, get_chats};
pub mod messages;
use messages::{get_messages, mark_read, send_message};
pub mod wsroute;
use wsroute::ws_handler;

pub fn build_router(state: AppState) -> Router {
    // Service introspection (public, for healthchecks)
    let introspection = Router::new().route("/health", get(|| async { "OK" }));

    // API v1 endpoints behind auth + general-class rate limiting
    let api_v1 = Router::new()
        .route("/chats", post(create_chat).get(get_chats))
        .route("/chats/:id", delete(archive_chat))
        .route("/chats/:id/messages", post(send_message).get(get_messages))
        .route("/chats/:id/read", put(mark_read));

    let secured_api_v1 = api_v1
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::rate_limit::general_rate_limit,
        ))
        .layer(middleware::from_fn(crate::middleware::auth::auth_middleware));

    // The WebSocket route validates its own token (browsers cannot set
    // headers on upgrade requests), so it sits outside the auth layer.
    let ws = Router::new().route("/ws", get(ws_handler));

    let router = introspection.merge(Router::new().nest("/api/v1", secured_api_v1.merge(ws)));

    crate::middleware::with_defaults(router, state.config.request_timeout).with_state(state)
}
