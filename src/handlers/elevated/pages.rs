use axum::{extract::State, Extension};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::handlers::protected::pages::page_view;
use crate::middleware::ApiResponse;
use crate::session::Principal;

/// GET /meetings - meeting minutes, staff only
pub async fn meetings(Extension(principal): Extension<Principal>) -> ApiResponse<Value> {
    ApiResponse::success(page_view("meetings", &principal))
}

/// GET /settings - staff settings, including the effective sync configuration
pub async fn settings(State(state): State<AppState>, Extension(principal): Extension<Principal>) -> ApiResponse<Value> {
    let mut view = page_view("settings", &principal);
    view["sync"] = json!(state.config.sync);
    view["routes"] = json!(state.config.routes);
    ApiResponse::success(view)
}
