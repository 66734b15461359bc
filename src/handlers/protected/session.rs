use axum::{extract::State, Extension};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::middleware::ApiResponse;
use crate::session::Principal;

/// GET /api/session - current principal and the route a reload would restore
///
/// Expected Output:
/// ```json
/// {
///   "success": true,
///   "data": {
///     "principal": { "id": "uuid", "email": null, "role": "monitor" },
///     "restore_route": "/attendance"
///   }
/// }
/// ```
pub async fn session_get(State(state): State<AppState>, Extension(principal): Extension<Principal>) -> ApiResponse<Value> {
    let restore_route = state.routes.restore_for(&principal);

    ApiResponse::success(json!({
        "principal": principal,
        "restore_route": restore_route,
    }))
}
