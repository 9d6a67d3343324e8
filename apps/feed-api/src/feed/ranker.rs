//! Explore ranker: turns a stream snapshot into the displayed ordering.
//!
//! `Latest` passes server order through untouched. `Explore` scores every
//! record on freshness and engagement, sorts descending and rotates the
//! result so repeated activations surface a different first item.
//!
//! Pure and synchronous: the caller supplies `now`, so identical input always
//! yields identical output.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::record::{RecordSummary, SocialStats};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMode {
    #[default]
    Latest,
    Explore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingWeights {
    pub freshness: f64,
    pub social: f64,
    pub like: f64,
    pub comment: f64,
    pub share: f64,
    /// Age at which freshness reaches zero.
    pub freshness_window_hours: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            freshness: 0.6,
            social: 0.4,
            like: 1.0,
            comment: 2.0,
            share: 3.0,
            freshness_window_hours: 72.0,
        }
    }
}

/// A record paired with its explore score.
#[derive(Debug, Clone)]
pub struct ScoredRecord<'a> {
    pub record: &'a RecordSummary,
    pub score: f64,
}

/// Hours elapsed since `timestamp`, clamped at zero for future-dated records.
pub fn age_hours(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - timestamp).num_milliseconds() as f64;
    (millis / MILLIS_PER_HOUR).max(0.0)
}

/// Linear decay from 1.0 at age zero to 0.0 at `window_hours`. Never negative.
pub fn compute_freshness_score(age_hours: f64, window_hours: f64) -> f64 {
    if window_hours <= 0.0 {
        return 0.0;
    }
    (1.0 - age_hours / window_hours).max(0.0)
}

/// ln(1 + likes + 2*comments + 3*shares) with the default weights.
pub fn compute_social_score(stats: &SocialStats, weights: &RankingWeights) -> f64 {
    let raw = weights.like * f64::from(stats.like_count)
        + weights.comment * f64::from(stats.comment_count)
        + weights.share * f64::from(stats.share_count);
    raw.max(0.0).ln_1p()
}

pub fn compute_explore_score(
    record: &RecordSummary,
    now: DateTime<Utc>,
    weights: &RankingWeights,
) -> f64 {
    let age = age_hours(record.ranking_timestamp(), now);
    let freshness = compute_freshness_score(age, weights.freshness_window_hours);
    let social = compute_social_score(&record.stats(), weights);
    weights.freshness * freshness + weights.social * social
}

#[derive(Debug, Clone, Default)]
pub struct ExploreRanker {
    weights: RankingWeights,
}

impl ExploreRanker {
    pub fn new(weights: RankingWeights) -> Self {
        Self { weights }
    }

    #[cfg(test)]
    pub fn weights(&self) -> &RankingWeights {
        &self.weights
    }

    /// Scores and sorts descending. Equal scores fall back to id ascending.
    pub fn score_all<'a>(
        &self,
        snapshot: &'a [RecordSummary],
        now: DateTime<Utc>,
    ) -> Vec<ScoredRecord<'a>> {
        let mut scored: Vec<ScoredRecord<'a>> = snapshot
            .iter()
            .map(|record| ScoredRecord {
                record,
                score: compute_explore_score(record, now, &self.weights),
            })
            .collect();

        scored.sort_by(|a, b| match b.score.total_cmp(&a.score) {
            Ordering::Equal => a.record.id.cmp(&b.record.id),
            other => other,
        });
        scored
    }

    /// Produces the displayed ordering for `mode`. `offset` may be negative or
    /// exceed the length; it is reduced modulo the snapshot length.
    pub fn rank(
        &self,
        snapshot: &[RecordSummary],
        mode: RankingMode,
        offset: i64,
        now: DateTime<Utc>,
    ) -> Vec<RecordSummary> {
        match mode {
            RankingMode::Latest => snapshot.to_vec(),
            RankingMode::Explore => {
                if snapshot.is_empty() {
                    return Vec::new();
                }
                let mut ordered: Vec<RecordSummary> = self
                    .score_all(snapshot, now)
                    .into_iter()
                    .map(|s| s.record.clone())
                    .collect();
                let shift = rotation_shift(offset, ordered.len());
                ordered.rotate_left(shift);
                ordered
            }
        }
    }
}

fn rotation_shift(offset: i64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    offset.rem_euclid(len as i64) as usize
}
