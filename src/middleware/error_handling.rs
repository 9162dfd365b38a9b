use crate::error::AppError;
use crate::models::ApiResponse;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

/// Map a domain error to an HTTP status and a client-safe message.
/// Internal detail never crosses the boundary.
pub fn map_error(err: &AppError) -> (StatusCode, String) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = match err {
        AppError::Config(_) | AppError::StartServer(_) | AppError::Database(_) => {
            "internal server error".to_string()
        }
        AppError::Upstream(_) => "upstream service unavailable".to_string(),
        other => other.to_string(),
    };
    (status, message)
}

pub fn into_response(err: AppError) -> Response {
    match &err {
        AppError::Config(detail)
        | AppError::StartServer(detail)
        | AppError::Database(detail)
        | AppError::Upstream(detail) => {
            tracing::error!(error = %detail, "request failed");
        }
        AppError::Internal => tracing::error!("request failed with internal error"),
        other => tracing::debug!(error = %other, "request rejected"),
    }

    let (status, message) = map_error(&err);
    let mut response = (status, Json(ApiResponse::failure(message))).into_response();

    if let AppError::RateLimited { retry_after_secs } = err {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_detail_is_not_leaked() {
        let (status, message) = map_error(&AppError::Database("password=hunter2".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!message.contains("hunter2"));
    }

    #[test]
    fn rate_limited_response_carries_retry_after() {
        let response = into_response(AppError::RateLimited {
            retry_after_secs: 42,
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            &HeaderValue::from(42u64)
        );
    }
}
