use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::errors::AppError;
use crate::feed::controller::FeedSnapshot;
use crate::models::record::{RecordId, SocialStats};
use crate::state::AppState;

/// GET /api/v1/feed
pub async fn handle_get_feed(State(state): State<AppState>) -> Json<FeedSnapshot> {
    Json(state.feed.snapshot())
}

/// POST /api/v1/feed/pull-refresh
/// Triggers are fire-and-forget; the outcome shows up in the published feed.
pub async fn handle_pull_refresh(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.feed.pull_to_refresh().await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/feed/tab-reactivate
pub async fn handle_tab_reactivate(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.feed.repeated_tab_activation().await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/feed/foreground
pub async fn handle_foreground(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.feed.app_foreground().await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/feed/scroll-end
pub async fn handle_scroll_end(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.feed.scroll_near_end().await?;
    Ok(StatusCode::ACCEPTED)
}

/// PUT /api/v1/feed/records/:id/stats
pub async fn handle_update_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(stats): Json<SocialStats>,
) -> Result<StatusCode, AppError> {
    if id.trim().is_empty() {
        return Err(AppError::Validation("record id must not be empty".to_string()));
    }
    let id = RecordId::new(id);
    let known = state.feed.snapshot().items.iter().any(|r| r.id == id);
    if !known {
        return Err(AppError::NotFound(format!("Record {id} is not in the feed")));
    }
    state.feed.update_stats(id, stats).await?;
    Ok(StatusCode::ACCEPTED)
}
