use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::app::AppState;
use crate::guard::{safe_return_path, DispatchOutcome, Redirect, RedirectDispatcher};
use crate::middleware::{response, ApiResponse};
use crate::session::{SessionState, SessionStore};

/// GET / - entry point, sends the visitor to the dashboard or the login page
pub async fn root(State(state): State<AppState>) -> Response {
    let dispatcher = RedirectDispatcher::new(&state.config.routes);

    match dispatcher.dispatch(&state.sessions.current()) {
        DispatchOutcome::Loading => response::loading(),
        DispatchOutcome::Redirect(target) => response::redirect(&target),
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub redirect: Option<String>,
}

/// GET /login - login page descriptor
///
/// Signed-in sessions are bounced to the dashboard. Otherwise the response
/// carries the return target the login form should post back.
///
/// Expected Output:
/// ```json
/// {
///   "success": true,
///   "data": { "page": "login", "redirect": "/rankings" }
/// }
/// ```
pub async fn login_page(State(state): State<AppState>, Query(query): Query<LoginQuery>) -> Response {
    match state.sessions.current() {
        SessionState::Unsettled => response::loading(),
        SessionState::Authenticated(_) => response::redirect(&Redirect::replace(state.config.routes.dashboard.clone())),
        SessionState::Unauthenticated => {
            let redirect = query.redirect.as_deref().and_then(safe_return_path);
            ApiResponse::success(json!({
                "page": "login",
                "redirect": redirect,
            }))
            .into_response()
        }
    }
}

/// GET /health - liveness plus session, sync and backend status
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let sync = state.sync.snapshot();

    let backend = match &state.backend {
        Some(client) => match client.ping().await {
            Ok(()) => "ok".to_string(),
            Err(e) => {
                tracing::debug!("Backend health probe failed: {}", e);
                "unreachable".to_string()
            }
        },
        None => "disabled".to_string(),
    };

    ApiResponse::success(json!({
        "status": "ok",
        "timestamp": now,
        "session": state.sessions.current().label(),
        "sync": sync.status,
        "backend": backend,
    }))
}
