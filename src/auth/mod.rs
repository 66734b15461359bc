use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::persistence::{KeyValueStore, StorageError};
use crate::session::{Principal, Role, SessionHub};

const TOKEN_KEY: &str = "session.access_token";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(principal: &Principal, ttl: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: principal.id,
            email: principal.email.clone(),
            user_role: principal.role.map(|r| r.as_str().to_string()),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn principal(&self) -> Principal {
        Principal {
            id: self.sub,
            email: self.email.clone(),
            role: Role::from_claim(self.user_role.as_deref()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid session token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Token secret not configured")]
    InvalidSecret,

    #[error("Authentication backend error: {0}")]
    Backend(String),

    #[error("Session storage error: {0}")]
    Storage(#[from] StorageError),
}

pub fn generate_jwt(claims: &Claims, secret: &str) -> Result<String, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    Ok(encode(&Header::default(), claims, &encoding_key)?)
}

/// Validate a token and extract the principal it identifies
pub fn decode_principal(token: &str, secret: &str) -> Result<Principal, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Hosted auth services stamp their own audience; identity comes from `sub`
    validation.validate_aud = false;

    let token_data = decode::<Claims>(token, &decoding_key, &validation)?;
    Ok(token_data.claims.principal())
}

/// Remote authentication service
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange credentials for an access token
    async fn sign_in(&self, email: &str, password: &str) -> Result<String, AuthError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;
}

/// Drives the session hub from the stored token and the auth backend
pub struct SessionManager {
    hub: Arc<SessionHub>,
    backend: Arc<dyn AuthBackend>,
    store: Arc<dyn KeyValueStore>,
    secret: String,
}

impl SessionManager {
    pub fn new(
        hub: Arc<SessionHub>,
        backend: Arc<dyn AuthBackend>,
        store: Arc<dyn KeyValueStore>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            hub,
            backend,
            store,
            secret: secret.into(),
        }
    }

    pub fn hub(&self) -> &Arc<SessionHub> {
        &self.hub
    }

    /// Resolve the session from the stored token (page-load check)
    pub async fn restore(&self) -> Option<Principal> {
        self.hub.begin_check();

        let token = match self.access_token() {
            Some(token) => token,
            None => {
                tracing::info!("No stored session, starting signed out");
                self.hub.settle(None);
                return None;
            }
        };

        match decode_principal(&token, &self.secret) {
            Ok(principal) => {
                tracing::info!("Restored session for {}", principal.id);
                self.hub.settle(Some(principal.clone()));
                Some(principal)
            }
            Err(e) => {
                tracing::warn!("Discarding stored session: {}", e);
                if let Err(e) = self.store.remove(TOKEN_KEY) {
                    tracing::warn!("Failed to remove stale session token: {}", e);
                }
                self.hub.settle(None);
                None
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        let token = self.backend.sign_in(email, password).await?;
        let principal = decode_principal(&token, &self.secret)?;

        self.store.set(TOKEN_KEY, Value::String(token))?;

        tracing::info!(
            "Signed in {} with role {}",
            principal.id,
            principal.role.map(|r| r.as_str()).unwrap_or("none")
        );
        self.hub.sign_in(principal.clone());
        Ok(principal)
    }

    pub async fn logout(&self) {
        if let Some(token) = self.access_token() {
            if let Err(e) = self.backend.sign_out(&token).await {
                tracing::warn!("Remote sign-out failed, clearing local session anyway: {}", e);
            }
        }

        if let Err(e) = self.store.remove(TOKEN_KEY) {
            tracing::warn!("Failed to remove session token: {}", e);
        }

        tracing::info!("Signed out");
        self.hub.sign_out();
    }

    pub fn access_token(&self) -> Option<String> {
        match self.store.get(TOKEN_KEY) {
            Ok(Some(Value::String(token))) => Some(token),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Failed to read session token: {}", e);
                None
            }
        }
    }
}
