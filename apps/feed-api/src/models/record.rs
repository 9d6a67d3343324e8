use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque practice-record identifier assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Engagement counters for one record. `is_liked` is viewer-specific and
/// never feeds into ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialStats {
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub comment_count: u32,
    #[serde(default)]
    pub share_count: u32,
    #[serde(default)]
    pub is_liked: bool,
}

/// One practice record as seen by the home feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: RecordId,
    pub user_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub practice_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub social_stats: Option<SocialStats>,
}

impl RecordSummary {
    /// Timestamp used for freshness: the practice date when known, else creation time.
    pub fn ranking_timestamp(&self) -> DateTime<Utc> {
        self.practice_date.unwrap_or(self.created_at)
    }

    /// Embedded stats, or all-zero when the backend sent none.
    pub fn stats(&self) -> SocialStats {
        self.social_stats.unwrap_or_default()
    }
}

/// Continuation token handed back by the record source. Opaque to the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

/// One page from the record source, newest first. `cursor == None` ends the stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<RecordSummary>,
    pub cursor: Option<Cursor>,
}
