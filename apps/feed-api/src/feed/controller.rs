//! Feed controller. Owns the record stream, the refresh coordinator and the
//! social-stats overlay, and republishes the ranked feed after every
//! transition.
//!
//! The controller runs as one task. User triggers, transport completions and
//! timer expirations all arrive over channels and are handled one at a time,
//! so feed state is never touched concurrently. Pagination is tracked here
//! and bypasses the coordinator entirely.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::feed::coordinator::{
    PhaseKind, RefetchTicket, RefreshCoordinator, RefreshSettings, RefreshState, Settled,
    TimerFired, TimerOutcome,
};
use crate::feed::error::FeedError;
use crate::feed::ranker::{ExploreRanker, RankingMode, RankingWeights};
use crate::feed::stream::RecordStream;
use crate::models::record::{Page, RecordId, RecordSummary, SocialStats};
use crate::source::{RecordSource, SocialStatsSource, SourceError};

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub page_size: usize,
    pub refresh: RefreshSettings,
    pub ranking: RankingWeights,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            page_size: 10,
            refresh: RefreshSettings::default(),
            ranking: RankingWeights::default(),
        }
    }
}

/// Trigger surface exposed to the presentation layer.
#[derive(Debug, Clone)]
pub enum FeedCommand {
    PullToRefresh,
    RepeatedTabActivation,
    AppForeground,
    ScrollNearEnd,
    UpdateStats { id: RecordId, stats: SocialStats },
}

/// Published feed state, recomputed after every internal transition.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub items: Vec<RecordSummary>,
    pub is_initial_loading: bool,
    pub is_refreshing: bool,
    pub is_fetching_more: bool,
    pub has_more: bool,
    pub mode: RankingMode,
    pub rotation_offset: i64,
    pub refresh: RefreshState,
    pub phase: PhaseKind,
    pub last_error: Option<String>,
}

impl FeedSnapshot {
    fn initial() -> Self {
        Self {
            items: Vec::new(),
            is_initial_loading: true,
            is_refreshing: false,
            is_fetching_more: false,
            has_more: false,
            mode: RankingMode::Latest,
            rotation_offset: 0,
            refresh: RefreshState::default(),
            phase: PhaseKind::Idle,
            last_error: None,
        }
    }
}

/// Cloneable handle to a running controller.
#[derive(Clone)]
pub struct FeedHandle {
    commands: mpsc::Sender<FeedCommand>,
    state: watch::Receiver<FeedSnapshot>,
}

impl FeedHandle {
    pub async fn pull_to_refresh(&self) -> Result<(), FeedError> {
        self.send(FeedCommand::PullToRefresh).await
    }

    pub async fn repeated_tab_activation(&self) -> Result<(), FeedError> {
        self.send(FeedCommand::RepeatedTabActivation).await
    }

    pub async fn app_foreground(&self) -> Result<(), FeedError> {
        self.send(FeedCommand::AppForeground).await
    }

    pub async fn scroll_near_end(&self) -> Result<(), FeedError> {
        self.send(FeedCommand::ScrollNearEnd).await
    }

    pub async fn update_stats(&self, id: RecordId, stats: SocialStats) -> Result<(), FeedError> {
        self.send(FeedCommand::UpdateStats { id, stats }).await
    }

    async fn send(&self, command: FeedCommand) -> Result<(), FeedError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| FeedError::Closed)
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.state.borrow().clone()
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.state.clone()
    }
}

enum Completion {
    Refetch {
        generation: u64,
        result: Result<Page, SourceError>,
    },
    NextPage {
        epoch: u64,
        result: Result<Page, SourceError>,
    },
    Stats {
        epoch: u64,
        result: Result<HashMap<RecordId, SocialStats>, SourceError>,
    },
}

enum Incoming {
    Command(FeedCommand),
    Completion(Completion),
    Timer(TimerFired),
    Closed,
}

pub struct FeedController {
    records: Arc<dyn RecordSource>,
    stats_source: Option<Arc<dyn SocialStatsSource>>,
    page_size: usize,
    stream: RecordStream,
    ranker: ExploreRanker,
    coordinator: RefreshCoordinator,
    stats_overlay: HashMap<RecordId, SocialStats>,
    /// Bumped whenever a refetch replaces the stream; page and stats results
    /// from an older epoch are discarded.
    epoch: u64,
    applied_generation: u64,
    fetching_more: bool,
    initial_loading: bool,
    last_error: Option<String>,
    commands: mpsc::Receiver<FeedCommand>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    timers: mpsc::UnboundedReceiver<TimerFired>,
    published: watch::Sender<FeedSnapshot>,
}

impl FeedController {
    /// Starts the controller task and kicks off the initial load.
    /// The task exits once every `FeedHandle` has been dropped.
    pub fn spawn(
        records: Arc<dyn RecordSource>,
        stats_source: Option<Arc<dyn SocialStatsSource>>,
        settings: FeedSettings,
    ) -> (FeedHandle, JoinHandle<()>) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (timer_tx, timers) = mpsc::unbounded_channel();
        let (published, state) = watch::channel(FeedSnapshot::initial());

        let controller = FeedController {
            records,
            stats_source,
            page_size: settings.page_size,
            stream: RecordStream::new(),
            ranker: ExploreRanker::new(settings.ranking),
            coordinator: RefreshCoordinator::new(settings.refresh, timer_tx),
            stats_overlay: HashMap::new(),
            epoch: 0,
            applied_generation: 0,
            fetching_more: false,
            initial_loading: true,
            last_error: None,
            commands,
            completions_tx,
            completions,
            timers,
            published,
        };

        let task = tokio::spawn(controller.run());
        let handle = FeedHandle {
            commands: commands_tx,
            state,
        };
        (handle, task)
    }

    async fn run(mut self) {
        info!("Feed controller started (page size {})", self.page_size);

        if let Some(ticket) = self.coordinator.request_initial_load() {
            self.issue_refetch(ticket);
        }
        self.publish();

        loop {
            match self.next_incoming().await {
                Incoming::Command(command) => self.handle_command(command),
                Incoming::Completion(completion) => self.handle_completion(completion),
                Incoming::Timer(fired) => self.handle_timer(fired),
                Incoming::Closed => break,
            }
            self.publish();
        }

        info!("Feed controller stopped: all handles dropped");
    }

    async fn next_incoming(&mut self) -> Incoming {
        tokio::select! {
            command = self.commands.recv() => match command {
                Some(command) => Incoming::Command(command),
                None => Incoming::Closed,
            },
            Some(completion) = self.completions.recv() => Incoming::Completion(completion),
            Some(fired) = self.timers.recv() => Incoming::Timer(fired),
        }
    }

    fn handle_command(&mut self, command: FeedCommand) {
        match command {
            FeedCommand::PullToRefresh => {
                if let Some(ticket) = self.coordinator.request_pull_refresh() {
                    self.issue_refetch(ticket);
                }
            }
            FeedCommand::RepeatedTabActivation => {
                if let Some(ticket) = self.coordinator.request_manual_refresh() {
                    self.issue_refetch(ticket);
                }
            }
            FeedCommand::AppForeground => {
                if let Some(ticket) = self.coordinator.on_foreground_resume() {
                    self.issue_refetch(ticket);
                }
            }
            FeedCommand::ScrollNearEnd => self.fetch_next_page(),
            FeedCommand::UpdateStats { id, stats } => {
                if self.stream.contains(&id) {
                    self.stats_overlay.insert(id, stats);
                } else {
                    debug!("Ignoring stats update for unknown record {id}");
                }
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Refetch { generation, result } => self.on_refetch_result(generation, result),
            Completion::NextPage { epoch, result } => self.on_next_page_result(epoch, result),
            Completion::Stats { epoch, result } => self.on_stats_result(epoch, result),
        }
    }

    fn handle_timer(&mut self, fired: TimerFired) {
        if let TimerOutcome::TimedOut { source, after } = self.coordinator.on_timer(fired) {
            self.initial_loading = false;
            let err = FeedError::Timeout {
                trigger: source,
                after_ms: after.as_millis() as u64,
            };
            self.last_error = Some(err.to_string());
        }
    }

    fn issue_refetch(&self, ticket: RefetchTicket) {
        let records = Arc::clone(&self.records);
        let tx = self.completions_tx.clone();
        let page_size = self.page_size;
        tokio::spawn(async move {
            let result = records.fetch_page(None, page_size).await;
            let _ = tx.send(Completion::Refetch {
                generation: ticket.generation,
                result,
            });
        });
    }

    fn fetch_next_page(&mut self) {
        if self.fetching_more {
            debug!("Next page already requested; ignoring scroll");
            return;
        }
        if self.coordinator.is_in_flight() {
            debug!("Refresh in flight; ignoring scroll");
            return;
        }
        let Some(cursor) = self.stream.next_cursor().cloned() else {
            return;
        };

        self.fetching_more = true;
        let records = Arc::clone(&self.records);
        let tx = self.completions_tx.clone();
        let page_size = self.page_size;
        let epoch = self.epoch;
        tokio::spawn(async move {
            let result = records.fetch_page(Some(cursor), page_size).await;
            let _ = tx.send(Completion::NextPage { epoch, result });
        });
    }

    fn on_refetch_result(&mut self, generation: u64, result: Result<Page, SourceError>) {
        let settled = self.coordinator.on_refetch_settled(generation, result.is_ok());
        self.initial_loading = false;

        match result {
            Ok(page) => {
                if generation <= self.applied_generation {
                    debug!("Discarding refetch generation {generation}; newer data already applied");
                    return;
                }
                if settled == Settled::Late {
                    info!("Applying late refetch result (generation {generation})");
                }
                self.applied_generation = generation;
                self.epoch += 1;
                self.stream.reset();
                self.stream.append_page(page);

                let stream = &self.stream;
                self.stats_overlay.retain(|id, _| stream.contains(id));
                self.last_error = None;

                let ids = self.stream.snapshot().iter().map(|r| r.id.clone()).collect();
                self.request_stats(ids);
            }
            Err(e) if settled == Settled::Late && generation <= self.applied_generation => {
                warn!("Late refetch generation {generation} failed after newer data: {e}");
            }
            Err(e) => {
                warn!("Refetch generation {generation} failed: {e}");
                self.last_error = Some(FeedError::from(e).to_string());
            }
        }
    }

    fn on_next_page_result(&mut self, epoch: u64, result: Result<Page, SourceError>) {
        self.fetching_more = false;
        if epoch != self.epoch {
            debug!("Discarding page from epoch {epoch}; stream was refetched");
            return;
        }

        match result {
            Ok(page) => {
                let new_ids: Vec<RecordId> = page
                    .items
                    .iter()
                    .filter(|r| !self.stream.contains(&r.id))
                    .map(|r| r.id.clone())
                    .collect();
                self.stream.append_page(page);
                self.last_error = None;
                self.request_stats(new_ids);
            }
            Err(e) => {
                warn!("Next page request failed: {e}");
                self.last_error = Some(FeedError::from(e).to_string());
            }
        }
    }

    fn request_stats(&self, ids: Vec<RecordId>) {
        let Some(stats_source) = self.stats_source.as_ref().map(Arc::clone) else {
            return;
        };
        if ids.is_empty() {
            return;
        }
        let tx = self.completions_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let result = stats_source.fetch_stats(&ids).await;
            let _ = tx.send(Completion::Stats { epoch, result });
        });
    }

    fn on_stats_result(
        &mut self,
        epoch: u64,
        result: Result<HashMap<RecordId, SocialStats>, SourceError>,
    ) {
        if epoch != self.epoch {
            return;
        }
        match result {
            Ok(stats) => {
                for (id, s) in stats {
                    if self.stream.contains(&id) {
                        self.stats_overlay.insert(id, s);
                    }
                }
            }
            // ranking falls back to embedded or zero stats
            Err(e) => warn!("Social stats fetch failed: {e}"),
        }
    }

    fn publish(&self) {
        let view = self.coordinator.view();
        let now = Utc::now();
        let items = if self.stats_overlay.is_empty() {
            self.ranker
                .rank(self.stream.snapshot(), view.mode, view.rotation_offset, now)
        } else {
            let resolved = self.with_overlay_stats();
            self.ranker
                .rank(&resolved, view.mode, view.rotation_offset, now)
        };

        let refresh = self.coordinator.state();
        self.published.send_replace(FeedSnapshot {
            items,
            is_initial_loading: self.initial_loading,
            is_refreshing: refresh.pull_active || refresh.manual_active,
            is_fetching_more: self.fetching_more,
            has_more: self.stream.has_next(),
            mode: view.mode,
            rotation_offset: view.rotation_offset,
            refresh,
            phase: self.coordinator.phase_kind(),
            last_error: self.last_error.clone(),
        });
    }

    fn with_overlay_stats(&self) -> Vec<RecordSummary> {
        self.stream
            .snapshot()
            .iter()
            .map(|record| match self.stats_overlay.get(&record.id) {
                Some(stats) => RecordSummary {
                    social_stats: Some(*stats),
                    ..record.clone()
                },
                None => record.clone(),
            })
            .collect()
    }
}
