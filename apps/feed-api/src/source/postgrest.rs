//! PostgREST-backed sources for the managed backend's REST surface.
//!
//! Cursors encode a row offset. Pages are ordered newest first by
//! `created_at`, matching what the feed expects from the server.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, warn};

use crate::models::record::{Cursor, Page, RecordId, RecordSummary, SocialStats};
use crate::source::{RecordSource, SocialStatsSource, SourceError};

const RECORDS_TABLE: &str = "practice_records";
const STATS_VIEW: &str = "practice_record_stats";
const RECORD_COLUMNS: &str = "id,user_id,title,duration_minutes,created_at,practice_date";
const MAX_RETRIES: u32 = 3;
/// One attempt gives up before the refresh safety timeout. A retried request
/// can still outlast it, and its result is then applied as a late refetch.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(4);

#[derive(Debug, Deserialize)]
struct StatsRow {
    record_id: RecordId,
    #[serde(default)]
    like_count: u32,
    #[serde(default)]
    comment_count: u32,
    #[serde(default)]
    share_count: u32,
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: String,
}

/// Client for the `/rest/v1` endpoint. Cheap to clone.
#[derive(Clone)]
pub struct PostgrestClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl PostgrestClient {
    pub fn new(base_url: &str, api_key: String) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// GETs `url` with `query` and decodes the JSON body.
    /// Retries on transport errors, 429 and 5xx with exponential backoff.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let mut attempt = 0;
        loop {
            match self.get_json_once(url, query).await {
                Err(e) if e.is_retryable() && attempt + 1 < MAX_RETRIES => {
                    attempt += 1;
                    let delay = backoff(attempt);
                    warn!(
                        "Backend request attempt {} failed ({}), retrying after {}ms...",
                        attempt,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    async fn get_json_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// 200ms, 400ms, ...
fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(200 * (1 << (attempt - 1)))
}

async fn api_error(response: Response) -> SourceError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<PostgrestError>(&body)
        .map(|e| e.message)
        .unwrap_or(body);
    SourceError::Api { status, message }
}

#[async_trait]
impl RecordSource for PostgrestClient {
    async fn fetch_page(
        &self,
        cursor: Option<Cursor>,
        page_size: usize,
    ) -> Result<Page, SourceError> {
        let offset = parse_offset(cursor.as_ref())?;
        let query = [
            ("select", RECORD_COLUMNS.to_string()),
            ("order", "created_at.desc,id.desc".to_string()),
            ("offset", offset.to_string()),
            ("limit", page_size.to_string()),
        ];

        let items: Vec<RecordSummary> = self
            .get_json(&self.table_url(RECORDS_TABLE), &query)
            .await?;

        debug!("Fetched {} records at offset {offset}", items.len());
        let cursor = next_cursor(offset, items.len(), page_size);
        Ok(Page { items, cursor })
    }
}

#[async_trait]
impl SocialStatsSource for PostgrestClient {
    async fn fetch_stats(
        &self,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, SocialStats>, SourceError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let query = [
            (
                "select",
                "record_id,like_count,comment_count,share_count".to_string(),
            ),
            ("record_id", in_filter(ids)),
        ];

        let rows: Vec<StatsRow> = self.get_json(&self.table_url(STATS_VIEW), &query).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.record_id,
                    SocialStats {
                        like_count: row.like_count,
                        comment_count: row.comment_count,
                        share_count: row.share_count,
                        is_liked: false,
                    },
                )
            })
            .collect())
    }
}

fn parse_offset(cursor: Option<&Cursor>) -> Result<usize, SourceError> {
    match cursor {
        None => Ok(0),
        Some(Cursor(raw)) => raw
            .parse::<usize>()
            .map_err(|_| SourceError::InvalidCursor(raw.clone())),
    }
}

/// A short page means the table is exhausted.
fn next_cursor(offset: usize, returned: usize, page_size: usize) -> Option<Cursor> {
    if returned == 0 || returned < page_size {
        None
    } else {
        Some(Cursor((offset + returned).to_string()))
    }
}

/// Builds `in.("a","b")`. Ids are quoted so commas or parens inside them stay literal.
fn in_filter(ids: &[RecordId]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.as_str().replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}
