use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::sync::{Notification, PendingRecord, SyncSnapshot};

/// GET /api/sync - loop status and cursor
pub async fn sync_get(State(state): State<AppState>) -> ApiResponse<SyncSnapshot> {
    ApiResponse::success(state.sync.snapshot())
}

/// POST /api/sync - request an immediate pass
pub async fn sync_post(State(state): State<AppState>) -> ApiResponse<Value> {
    let queued = state.sync.trigger();
    ApiResponse::accepted(json!({ "queued": queued }))
}

/// POST /api/offline/:table - queue a row for the next sync pass
pub async fn offline_post(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(payload): Json<Value>,
) -> ApiResult<PendingRecord> {
    if !is_table_name(&table) {
        return Err(ApiError::bad_request(format!("Invalid table name '{}'", table)));
    }
    if !payload.is_object() {
        return Err(ApiError::bad_request("Record payload must be a JSON object"));
    }

    let record = state.cache.enqueue(&table, payload)?;
    Ok(ApiResponse::created(record))
}

/// GET /api/notifications - recent transient notifications, newest first
pub async fn notifications_get(State(state): State<AppState>) -> ApiResponse<Vec<Notification>> {
    ApiResponse::success(state.notifications.recent())
}

fn is_table_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_validation() {
        assert!(is_table_name("attendance"));
        assert!(is_table_name("meeting_minutes"));
        assert!(!is_table_name(""));
        assert!(!is_table_name("1table"));
        assert!(!is_table_name("users;drop"));
        assert!(!is_table_name("../auth"));
    }
}
