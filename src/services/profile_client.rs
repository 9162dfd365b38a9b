//! Profile directory client.
//!
//! User identity and profile CRUD live in a separate service; the chat
//! service only ever asks two questions of it: "is this id a local-expert
//! profile" and "what is this user's public display name".

use crate::error::AppError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Check whether the id resolves to a valid local-expert profile.
    async fn local_exists(&self, user_id: Uuid) -> Result<bool, AppError>;

    /// Public display name for a user; `None` when the directory does not
    /// know the id.
    async fn display_name(&self, user_id: Uuid) -> Result<Option<String>, AppError>;
}

#[derive(Debug, Deserialize)]
struct ProfileSummary {
    display_name: Option<String>,
}

/// HTTP client against the profile service's internal lookup endpoints.
pub struct HttpProfileDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProfileDirectory {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AppError::StartServer(format!("profile client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ProfileDirectory for HttpProfileDirectory {
    async fn local_exists(&self, user_id: Uuid) -> Result<bool, AppError> {
        let url = format!("{}/internal/locals/{}", self.base_url, user_id);
        let response = self.client.get(&url).send().await.map_err(|e| {
            tracing::error!(user_id = %user_id, error = %e, "profile-service local_exists failed");
            AppError::Upstream(format!("profile-service: {e}"))
        })?;

        match response.status() {
            status if status.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            status => {
                tracing::error!(user_id = %user_id, %status, "profile-service local_exists failed");
                Err(AppError::Upstream(format!(
                    "profile-service returned {status}"
                )))
            }
        }
    }

    async fn display_name(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        let url = format!("{}/internal/users/{}", self.base_url, user_id);
        let response = self.client.get(&url).send().await.map_err(|e| {
            tracing::error!(user_id = %user_id, error = %e, "profile-service display_name failed");
            AppError::Upstream(format!("profile-service: {e}"))
        })?;

        match response.status() {
            status if status.is_success() => {
                let profile: ProfileSummary = response.json().await.map_err(|e| {
                    AppError::Upstream(format!("profile-service payload: {e}"))
                })?;
                Ok(profile.display_name)
            }
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status => {
                tracing::error!(user_id = %user_id, %status, "profile-service display_name failed");
                Err(AppError::Upstream(format!(
                    "profile-service returned {status}"
                )))
            }
        }
    }
}
