use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{AuthBackend, AuthError};
use crate::config::BackendConfig;
use crate::sync::RemoteStore;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend responded with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Backend URL not configured")]
    NotConfigured,
}

impl From<RemoteError> for AuthError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Status { status, .. } if status == 400 || status == 401 => AuthError::InvalidCredentials,
            other => AuthError::Backend(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Client for the hosted auth + row-store backend
#[derive(Clone)]
pub struct RemoteClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl RemoteClient {
    pub fn new(config: &BackendConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<String, RemoteError> {
        if self.base_url.is_empty() {
            return Err(RemoteError::NotConfigured);
        }
        Ok(format!("{}{}", self.base_url, path))
    }

    fn authorize(&self, request: RequestBuilder, access_token: Option<&str>) -> RequestBuilder {
        let bearer = access_token.unwrap_or(&self.anon_key);
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Liveness probe used by the health endpoint
    pub async fn ping(&self) -> Result<(), RemoteError> {
        let url = self.endpoint("/auth/v1/health")?;
        let response = self.authorize(self.client.get(&url), None).send().await?;
        Self::check(response).await.map(|_| ())
    }
}

#[async_trait]
impl AuthBackend for RemoteClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let url = self.endpoint("/auth/v1/token?grant_type=password")?;

        let response = self
            .authorize(self.client.post(&url), None)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(RemoteError::from)?;

        let token: TokenResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(RemoteError::from)?;

        Ok(token.access_token)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let url = self.endpoint("/auth/v1/logout")?;

        let response = self
            .authorize(self.client.post(&url), Some(access_token))
            .send()
            .await
            .map_err(RemoteError::from)?;

        // An already-revoked token is as good as a successful sign-out
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for RemoteClient {
    async fn upsert_rows(&self, table: &str, rows: &[Value], access_token: Option<&str>) -> Result<(), RemoteError> {
        let url = self.endpoint(&format!("/rest/v1/{}", table))?;

        let response = self
            .authorize(self.client.post(&url), access_token)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
