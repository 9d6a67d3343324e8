//! Scripted in-memory sources for controller tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use crate::models::record::{Cursor, Page, RecordId, RecordSummary, SocialStats};
use crate::source::{RecordSource, SocialStatsSource, SourceError};

/// What the next `fetch_page` call does.
pub enum Reply {
    Page(Page),
    Fail(u16),
    /// Resolves with `page` after `delay`.
    Delayed(Duration, Page),
    /// Fails with `status` after `delay`.
    DelayedFail(Duration, u16),
    /// Never resolves.
    Hang,
}

/// Refetches (no cursor) and next-page requests (with cursor) consume
/// separate reply queues in call order. A dry queue answers with an empty
/// final page.
#[derive(Default)]
pub struct ScriptedSource {
    refetches: Mutex<VecDeque<Reply>>,
    pages: Mutex<VecDeque<Reply>>,
    refetch_calls: AtomicUsize,
    page_calls: AtomicUsize,
    cursors: Mutex<Vec<Cursor>>,
}

impl ScriptedSource {
    pub fn new(refetches: Vec<Reply>, pages: Vec<Reply>) -> Self {
        Self {
            refetches: Mutex::new(refetches.into()),
            pages: Mutex::new(pages.into()),
            ..Self::default()
        }
    }

    pub fn refetch_calls(&self) -> usize {
        self.refetch_calls.load(Ordering::SeqCst)
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    /// Cursors passed to next-page requests, in call order.
    pub fn cursors(&self) -> Vec<Cursor> {
        self.cursors.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordSource for ScriptedSource {
    async fn fetch_page(
        &self,
        cursor: Option<Cursor>,
        _page_size: usize,
    ) -> Result<Page, SourceError> {
        let reply = match cursor {
            None => {
                self.refetch_calls.fetch_add(1, Ordering::SeqCst);
                self.refetches.lock().unwrap().pop_front()
            }
            Some(cursor) => {
                self.page_calls.fetch_add(1, Ordering::SeqCst);
                self.cursors.lock().unwrap().push(cursor);
                self.pages.lock().unwrap().pop_front()
            }
        };
        match reply {
            None => Ok(Page::default()),
            Some(Reply::Page(page)) => Ok(page),
            Some(Reply::Fail(status)) => Err(scripted_failure(status)),
            Some(Reply::Delayed(delay, page)) => {
                tokio::time::sleep(delay).await;
                Ok(page)
            }
            Some(Reply::DelayedFail(delay, status)) => {
                tokio::time::sleep(delay).await;
                Err(scripted_failure(status))
            }
            Some(Reply::Hang) => std::future::pending().await,
        }
    }
}

fn scripted_failure(status: u16) -> SourceError {
    SourceError::Api {
        status,
        message: "scripted failure".to_string(),
    }
}

#[derive(Default)]
pub struct FixedStats {
    pub stats: HashMap<RecordId, SocialStats>,
    pub fail: bool,
}

#[async_trait]
impl SocialStatsSource for FixedStats {
    async fn fetch_stats(
        &self,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, SocialStats>, SourceError> {
        if self.fail {
            return Err(SourceError::Api {
                status: 500,
                message: "stats unavailable".to_string(),
            });
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.stats.get(id).map(|s| (id.clone(), *s)))
            .collect())
    }
}

pub fn record(id: &str, hours_old: i64) -> RecordSummary {
    RecordSummary {
        id: RecordId::new(id),
        user_id: "yogi".to_string(),
        title: Some(format!("practice {id}")),
        duration_minutes: Some(45),
        created_at: Utc::now() - ChronoDuration::hours(hours_old),
        practice_date: None,
        social_stats: None,
    }
}

pub fn page(ids: &[&str], cursor: Option<&str>) -> Page {
    Page {
        items: ids
            .iter()
            .enumerate()
            .map(|(i, id)| record(id, i as i64))
            .collect(),
        cursor: cursor.map(|c| Cursor(c.to_string())),
    }
}
