//! Record stream: accumulates fetched pages into one de-duplicated,
//! insertion-ordered snapshot. Transport lives in `crate::source`.

use std::collections::HashSet;

use crate::models::record::{Cursor, Page, RecordId, RecordSummary};

#[derive(Debug, Default)]
pub struct RecordStream {
    snapshot: Vec<RecordSummary>,
    seen: HashSet<RecordId>,
    next_cursor: Option<Cursor>,
    pages_loaded: usize,
}

impl RecordStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a page, dropping any id already present. First occurrence wins,
    /// so re-fetching an overlapping page is idempotent.
    pub fn append_page(&mut self, page: Page) -> &[RecordSummary] {
        let incoming = page.items.len();
        for item in page.items {
            if self.seen.insert(item.id.clone()) {
                self.snapshot.push(item);
            }
        }
        self.next_cursor = page.cursor;
        self.pages_loaded += 1;

        tracing::debug!(
            "Appended page {} ({} incoming, {} total, has_next={})",
            self.pages_loaded,
            incoming,
            self.snapshot.len(),
            self.has_next()
        );

        &self.snapshot
    }

    /// Clears every page. Used before a full refetch.
    pub fn reset(&mut self) -> &[RecordSummary] {
        self.snapshot.clear();
        self.seen.clear();
        self.next_cursor = None;
        self.pages_loaded = 0;
        &self.snapshot
    }

    /// True iff the last fetched page carried a continuation cursor.
    pub fn has_next(&self) -> bool {
        self.next_cursor.is_some()
    }

    pub fn next_cursor(&self) -> Option<&Cursor> {
        self.next_cursor.as_ref()
    }

    pub fn snapshot(&self) -> &[RecordSummary] {
        &self.snapshot
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.seen.contains(id)
    }

    #[cfg(test)]
    /// Number of pages appended since the last reset.
    pub fn pages_loaded(&self) -> usize {
        self.pages_loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: &str, title: &str) -> RecordSummary {
        RecordSummary {
            id: RecordId::new(id),
            user_id: "u1".to_string(),
            title: Some(title.to_string()),
            duration_minutes: None,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            practice_date: None,
            social_stats: None,
        }
    }

    fn page(ids: &[&str], cursor: Option<&str>) -> Page {
        Page {
            items: ids.iter().map(|id| record(id, "first")).collect(),
            cursor: cursor.map(|c| Cursor(c.to_string())),
        }
    }

    fn ids(records: &[RecordSummary]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_overlapping_pages_keep_first_seen_order() {
        let mut stream = RecordStream::new();
        stream.append_page(page(&["a", "b", "c"], Some("10")));
        let snapshot = stream.append_page(page(&["c", "d", "a", "e"], Some("20")));
        assert_eq!(ids(snapshot), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_duplicate_within_single_page_dropped() {
        let mut stream = RecordStream::new();
        let snapshot = stream.append_page(page(&["a", "a", "b"], None));
        assert_eq!(ids(snapshot), vec!["a", "b"]);
    }

    #[test]
    fn test_first_occurrence_wins_on_content() {
        let mut stream = RecordStream::new();
        stream.append_page(page(&["a"], Some("1")));
        stream.append_page(Page {
            items: vec![record("a", "second")],
            cursor: None,
        });
        assert_eq!(stream.snapshot()[0].title.as_deref(), Some("first"));
    }

    #[test]
    fn test_reappending_same_page_is_idempotent() {
        let mut stream = RecordStream::new();
        stream.append_page(page(&["a", "b"], Some("1")));
        stream.append_page(page(&["a", "b"], Some("1")));
        assert_eq!(ids(stream.snapshot()), vec!["a", "b"]);
    }

    #[test]
    fn test_has_next_follows_last_cursor() {
        let mut stream = RecordStream::new();
        assert!(!stream.has_next());
        stream.append_page(page(&["a"], Some("1")));
        assert!(stream.has_next());
        assert_eq!(stream.next_cursor(), Some(&Cursor("1".to_string())));
        stream.append_page(page(&["b"], None));
        assert!(!stream.has_next());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut stream = RecordStream::new();
        stream.append_page(page(&["a", "b"], Some("1")));
        assert!(stream.reset().is_empty());
        assert!(!stream.has_next());
        assert!(!stream.contains(&RecordId::new("a")));
        assert_eq!(stream.pages_loaded(), 0);

        // ids seen before the reset are accepted again
        let snapshot = stream.append_page(page(&["b", "a"], None));
        assert_eq!(ids(snapshot), vec!["b", "a"]);
    }

    #[test]
    fn test_empty_page_ends_stream() {
        let mut stream = RecordStream::new();
        let snapshot = stream.append_page(page(&[], None));
        assert!(snapshot.is_empty());
        assert!(!stream.has_next());
        assert_eq!(stream.pages_loaded(), 1);
    }
}
