use crate::error::AppError;
use crate::services::rate_limit::EndpointClass;
use crate::state::AppState;
use axum::extract::State;
use uuid::Uuid;

/// General-class rate limit applied to the whole authenticated API
/// surface. Keyed by the caller's user id; runs after the auth middleware
/// so the id is already in extensions.
pub async fn general_rate_limit(
    State(state): State<AppState>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<axum::response::Response, AppError> {
    let caller_key = req
        .extensions()
        .get::<Uuid>()
        .map(Uuid::to_string)
        .unwrap_or_else(|| "anonymous".to_string());

    let decision = state.governor.check(&caller_key, EndpointClass::General);
    if !decision.allowed {
        return Err(AppError::RateLimited {
            retry_after_secs: decision.retry_after_secs(),
        });
    }

    Ok(next.run(req).await)
}
