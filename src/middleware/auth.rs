use crate::error::AppError;
use jsonwebtoken::{decode, DecodingKey, Validation};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // subject - the user id
    pub exp: i64,    // expiration time (unix timestamp)
}

static DECODING_KEY: OnceCell<DecodingKey> = OnceCell::new();

/// Install the HS256 validation key. Called once at startup; later calls
/// are no-ops so tests may initialize repeatedly.
pub fn init_validation(secret: &str) {
    let _ = DECODING_KEY.set(DecodingKey::from_secret(secret.as_bytes()));
}

/// Validate JWT signature and expiry, returning the claims.
pub fn verify_jwt(token: &str) -> Result<Claims, AppError> {
    let key = DECODING_KEY
        .get()
        .ok_or_else(|| AppError::Config("JWT validation key not initialized".into()))?;

    decode::<Claims>(token, key, &Validation::default())
        .map(|data| data.claims)
        .map_err(|_| AppError::Unauthorized)
}

/// Middleware to extract the Bearer token and add the caller's user id to
/// request extensions.
pub async fn auth_middleware(
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<axum::response::Response, AppError> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    let claims = verify_jwt(token)?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::BadRequest("Invalid user_id in token".into()))?;

    req.extensions_mut().insert(user_id);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(sub: &str, secret: &str, exp: i64) -> String {
        encode(
            &Header::default(),
            &Claims {
                sub: sub.to_string(),
                exp,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn verify_accepts_valid_token_and_rejects_bad_signature() {
        init_validation("test-secret");
        let exp = chrono::Utc::now().timestamp() + 3600;

        let good = token_for("8f2dfae5-9a2c-4f4e-9357-4a3e30bb52fd", "test-secret", exp);
        let claims = verify_jwt(&good).unwrap();
        assert_eq!(claims.sub, "8f2dfae5-9a2c-4f4e-9357-4a3e30bb52fd");

        let forged = token_for("8f2dfae5-9a2c-4f4e-9357-4a3e30bb52fd", "other-secret", exp);
        assert!(matches!(
            verify_jwt(&forged),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn verify_rejects_expired_token() {
        init_validation("test-secret");
        let expired = token_for(
            "8f2dfae5-9a2c-4f4e-9357-4a3e30bb52fd",
            "test-secret",
            chrono::Utc::now().timestamp() - 3600,
        );
        assert!(matches!(
            verify_jwt(&expired),
            Err(AppError::Unauthorized)
        ));
    }
}
