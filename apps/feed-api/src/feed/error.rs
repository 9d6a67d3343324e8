use thiserror::Error;

use crate::feed::coordinator::RefreshSource;
use crate::source::SourceError;

/// Feed-level failures. All are recovered inside the controller and surfaced
/// as `last_error`; none tear the controller down except `Closed`.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Transport error: {0}")]
    Transport(#[from] SourceError),

    #[error("{trigger:?} refresh did not settle within {after_ms}ms")]
    Timeout { trigger: RefreshSource, after_ms: u64 },

    #[error("Feed controller is no longer running")]
    Closed,
}
