use axum::{extract::State, Extension};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::session::Principal;

/// Shell payload shared by every page; page content itself is fetched by the client
pub(crate) fn page_view(page: &str, principal: &Principal) -> Value {
    json!({
        "page": page,
        "principal": principal,
    })
}

/// GET /dashboard
pub async fn dashboard(State(state): State<AppState>, Extension(principal): Extension<Principal>) -> ApiResult<Value> {
    let mut view = page_view("dashboard", &principal);
    view["sync"] = json!(state.sync.snapshot());
    view["pending_records"] = json!(state.cache.pending()?.len());
    Ok(ApiResponse::success(view))
}

/// GET /athletes
pub async fn athletes(Extension(principal): Extension<Principal>) -> ApiResponse<Value> {
    ApiResponse::success(page_view("athletes", &principal))
}

/// GET /attendance
pub async fn attendance(Extension(principal): Extension<Principal>) -> ApiResponse<Value> {
    ApiResponse::success(page_view("attendance", &principal))
}

/// GET /rankings
pub async fn rankings(Extension(principal): Extension<Principal>) -> ApiResponse<Value> {
    ApiResponse::success(page_view("rankings", &principal))
}
