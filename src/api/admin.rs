use axum::{Json, extract::State};
use std::sync::Arc;

use super::types::ActivityDto;
use super::{ApiError, ApiResponse, AppState};
use crate::constants::limits;

/// GET /admin/activity
/// Recent audit entries across all accounts
pub async fn recent_activity(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<ActivityDto>>>, ApiError> {
    let entries = state
        .store()
        .recent_activity(limits::ADMIN_ACTIVITY_LIMIT)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load activity: {e}")))?
        .into_iter()
        .map(|entry| ActivityDto {
            action: entry.action,
            description: entry.description,
            created_at: entry.created_at,
        })
        .collect();

    Ok(Json(ApiResponse::success("OK", entries)))
}
