pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::feed::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Published feed state
        .route("/api/v1/feed", get(handlers::handle_get_feed))
        // Trigger surface
        .route(
            "/api/v1/feed/pull-refresh",
            post(handlers::handle_pull_refresh),
        )
        .route(
            "/api/v1/feed/tab-reactivate",
            post(handlers::handle_tab_reactivate),
        )
        .route("/api/v1/feed/foreground", post(handlers::handle_foreground))
        .route("/api/v1/feed/scroll-end", post(handlers::handle_scroll_end))
        .route(
            "/api/v1/feed/records/:id/stats",
            put(handlers::handle_update_stats),
        )
        .with_state(state)
}
