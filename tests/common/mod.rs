#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use team_portal::app::{app, AppState, Services};
use team_portal::auth::{generate_jwt, AuthBackend, AuthError, Claims};
use team_portal::config::AppConfig;
use team_portal::guard::{Denial, DenialReporter};
use team_portal::persistence::{KeyValueStore, MemoryStore};
use team_portal::remote::RemoteError;
use team_portal::session::{Principal, Role};
use team_portal::sync::RemoteStore;

pub const SECRET: &str = "integration-secret";
pub const PASSWORD: &str = "correct horse";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn principal(role: Option<Role>) -> Principal {
    Principal::new(Uuid::new_v4(), role)
}

pub fn token_for(principal: &Principal) -> String {
    generate_jwt(&Claims::new(principal, chrono::Duration::hours(1)), SECRET).expect("token")
}

/// Accepts `PASSWORD` for every registered email
#[derive(Default)]
pub struct FakeAuth {
    accounts: Mutex<HashMap<String, String>>,
    pub sign_outs: AtomicUsize,
}

impl FakeAuth {
    pub fn register(&self, email: &str, principal: &Principal) {
        self.accounts.lock().insert(email.to_string(), token_for(principal));
    }
}

#[async_trait]
impl AuthBackend for FakeAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<String, AuthError> {
        if password != PASSWORD {
            return Err(AuthError::InvalidCredentials);
        }
        self.accounts.lock().get(email).cloned().ok_or(AuthError::InvalidCredentials)
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), AuthError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every upsert; fails all of them while `failing` is set
#[derive(Default)]
pub struct FakeRemote {
    pub failing: std::sync::atomic::AtomicBool,
    pub upserts: Mutex<Vec<(String, Vec<Value>)>>,
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn upsert_rows(&self, table: &str, rows: &[Value], _access_token: Option<&str>) -> Result<(), RemoteError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Status {
                status: 503,
                body: "maintenance".into(),
            });
        }
        self.upserts.lock().push((table.to_string(), rows.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    pub denials: Mutex<Vec<Denial>>,
}

impl DenialReporter for RecordingReporter {
    fn report(&self, denial: &Denial) {
        self.denials.lock().push(denial.clone());
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.backend.jwt_secret = SECRET.to_string();
    config.server.enable_cors = false;
    config
}

pub struct TestPortal {
    pub state: AppState,
    pub router: Router,
    pub auth: Arc<FakeAuth>,
    pub remote: Arc<FakeRemote>,
    pub reporter: Arc<RecordingReporter>,
    pub store: Arc<MemoryStore>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers.get(header::LOCATION).and_then(|v| v.to_str().ok())
    }
}

impl TestPortal {
    pub fn start() -> Self {
        Self::start_with(test_config())
    }

    pub fn start_with(config: AppConfig) -> Self {
        init_tracing();

        let store = Arc::new(MemoryStore::new());
        let auth = Arc::new(FakeAuth::default());
        let remote = Arc::new(FakeRemote::default());
        let reporter = Arc::new(RecordingReporter::default());

        let services = Services {
            store: store.clone() as Arc<dyn KeyValueStore>,
            auth: auth.clone(),
            remote: remote.clone(),
            backend: None,
            reporter: reporter.clone(),
        };
        let state = AppState::start(config, services);
        let router = app(state.clone());

        Self {
            state,
            router,
            auth,
            remote,
            reporter,
            store,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> TestResponse {
        let builder = Request::builder().method(method).uri(path);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = self.router.clone().oneshot(request).await.expect("infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, headers, body }
    }

    /// Sign in through the HTTP endpoint
    pub async fn login(&self, email: &str, principal: &Principal) -> TestResponse {
        self.auth.register(email, principal);
        self.post(
            "/auth/login",
            serde_json::json!({ "email": email, "password": PASSWORD }),
        )
        .await
    }
}

/// Give background observers a chance to process published transitions
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
