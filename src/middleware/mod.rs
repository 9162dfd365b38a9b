pub mod auth;
pub mod error_handling;
pub mod guards;
pub mod logging;
pub mod rate_limit;

use crate::state::AppState;
use axum::Router;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;

/// Apply default middleware layers: request tracing, permissive CORS and a
/// bounded request duration so stuck calls surface a retryable error
/// instead of hanging.
pub fn with_defaults(router: Router<AppState>, request_timeout: Duration) -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    logging::add_tracing(router)
        .layer(cors)
        .layer(TimeoutLayer::new(request_timeout))
}
