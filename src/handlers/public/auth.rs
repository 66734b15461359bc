use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::ApiError;
use crate::guard::safe_return_path;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Path the guard preserved when it sent the visitor to the login page
    pub redirect: Option<String>,
}

/// POST /auth/login - authenticate and start a session
///
/// Expected Input:
/// ```json
/// { "email": "coach@club.test", "password": "string", "redirect": "/rankings" }
/// ```
///
/// Expected Output:
/// ```json
/// {
///   "success": true,
///   "data": {
///     "principal": { "id": "uuid", "email": "coach@club.test", "role": "tecnico" },
///     "redirect_to": "/rankings"
///   }
/// }
/// ```
///
/// The target is the preserved path when it is safe, else the last route this
/// principal visited, else the dashboard.
pub async fn login_post(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> ApiResult<Value> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let principal = state.manager.login(request.email.trim(), &request.password).await?;

    let redirect_to = request
        .redirect
        .as_deref()
        .and_then(safe_return_path)
        .map(str::to_string)
        .or_else(|| state.routes.restore_for(&principal))
        .unwrap_or_else(|| state.config.routes.dashboard.clone());

    Ok(ApiResponse::success(json!({
        "principal": principal,
        "redirect_to": redirect_to,
    })))
}

/// POST /auth/logout - end the session; the route observer drops the persisted route
pub async fn logout_post(State(state): State<AppState>) -> ApiResult<Value> {
    state.manager.logout().await;

    Ok(ApiResponse::success(json!({
        "redirect_to": state.config.routes.login,
    })))
}
