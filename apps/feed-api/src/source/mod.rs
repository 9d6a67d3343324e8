//! Record and social-stats sources: the feed's only view of the backend.
//!
//! The controller holds `Arc<dyn RecordSource>` / `Arc<dyn SocialStatsSource>`;
//! swap the backend without touching feed code.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::record::{Cursor, Page, RecordId, SocialStats};

pub mod postgrest;

#[cfg(test)]
pub mod testing;

/// Transport-level failure while talking to the backend.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
}

impl SourceError {
    /// Rate limiting, server-side failures and connection problems may
    /// succeed on a later attempt. Client errors and bad payloads will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Http(e) => !e.is_decode() && !e.is_builder(),
            SourceError::Api { status, .. } => *status == 429 || *status >= 500,
            SourceError::Decode(_) | SourceError::InvalidCursor(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> SourceError {
        SourceError::Api {
            status,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_rate_limit_and_server_errors_are_retryable() {
        assert!(api(429).is_retryable());
        assert!(api(500).is_retryable());
        assert!(api(503).is_retryable());
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        assert!(!api(400).is_retryable());
        assert!(!api(404).is_retryable());
        assert!(!SourceError::InvalidCursor("x".to_string()).is_retryable());
        let decode = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(!SourceError::Decode(decode).is_retryable());
    }
}

/// Paginated practice-record source. Must be idempotent under retry: the
/// same cursor yields the same page or a superset of it.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_page(
        &self,
        cursor: Option<Cursor>,
        page_size: usize,
    ) -> Result<Page, SourceError>;
}

/// Per-record engagement counters, polled independently of paging.
#[async_trait]
pub trait SocialStatsSource: Send + Sync {
    async fn fetch_stats(
        &self,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, SocialStats>, SourceError>;
}
