use crate::feed::FeedHandle;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the single feed controller owned by this process.
    pub feed: FeedHandle,
}
