//! Refresh coordinator. Arbitrates pull-to-refresh, repeated tab activation,
//! app-foreground resume and the initial load against one refetch slot.
//!
//! Phases: `Idle -> Refreshing -> CoolingDown -> Idle`. Every trigger that
//! arrives outside `Idle` is dropped, never queued. Each admission gets a
//! fresh generation; timers carry the generation they were armed for so a
//! late callback can never act on a newer cycle. Timer tasks are aborted as
//! soon as the phase they guard is left.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::feed::ranker::RankingMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshSource {
    Pull,
    Manual,
    Foreground,
    Initial,
}

impl RefreshSource {
    /// Silent refreshes never raise UI flags.
    pub fn is_silent(self) -> bool {
        matches!(self, RefreshSource::Foreground | RefreshSource::Initial)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing {
        source: RefreshSource,
        generation: u64,
        started_at: Instant,
    },
    CoolingDown {
        generation: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Idle,
    Refreshing,
    CoolingDown,
}

/// UI-facing refresh flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshState {
    pub pull_active: bool,
    pub manual_active: bool,
    pub in_flight: bool,
}

/// Ranking mode plus the raw rotation offset; the ranker reduces the offset
/// modulo the current length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub mode: RankingMode,
    pub rotation_offset: i64,
}

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// Delay between settlement and clearing the UI flags.
    pub cooldown: Duration,
    /// Upper bound on how long `Refreshing` may last without settlement.
    pub safety_timeout: Duration,
    pub manual_rotation_step: i64,
    pub reset_rotation_on_foreground: bool,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(500),
            safety_timeout: Duration::from_millis(5000),
            manual_rotation_step: 5,
            reset_rotation_on_foreground: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerFired {
    Cooldown { generation: u64 },
    SafetyTimeout { generation: u64 },
}

/// Permission to issue exactly one refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefetchTicket {
    pub generation: u64,
    pub source: RefreshSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// Settlement of the refresh currently in flight.
    Current,
    /// Result of a generation the coordinator already gave up on.
    Late,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    CooledDown,
    TimedOut {
        source: RefreshSource,
        after: Duration,
    },
    Stale,
}

/// A spawned timer; dropping it cancels the timer.
struct ScheduledTask(JoinHandle<()>);

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct RefreshCoordinator {
    phase: RefreshPhase,
    flags: RefreshState,
    view: ViewState,
    generation: u64,
    settings: RefreshSettings,
    safety_timer: Option<ScheduledTask>,
    cooldown_timer: Option<ScheduledTask>,
    timer_tx: mpsc::UnboundedSender<TimerFired>,
}

impl RefreshCoordinator {
    /// Timer expirations are delivered on `timer_tx` and must be fed back
    /// through `on_timer` by the owner.
    pub fn new(settings: RefreshSettings, timer_tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            phase: RefreshPhase::Idle,
            flags: RefreshState::default(),
            view: ViewState::default(),
            generation: 0,
            settings,
            safety_timer: None,
            cooldown_timer: None,
            timer_tx,
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> RefreshPhase {
        self.phase
    }

    pub fn phase_kind(&self) -> PhaseKind {
        match self.phase {
            RefreshPhase::Idle => PhaseKind::Idle,
            RefreshPhase::Refreshing { .. } => PhaseKind::Refreshing,
            RefreshPhase::CoolingDown { .. } => PhaseKind::CoolingDown,
        }
    }

    pub fn state(&self) -> RefreshState {
        RefreshState {
            in_flight: matches!(self.phase, RefreshPhase::Refreshing { .. }),
            ..self.flags
        }
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.phase, RefreshPhase::Refreshing { .. })
    }

    pub fn request_pull_refresh(&mut self) -> Option<RefetchTicket> {
        let ticket = self.admit(RefreshSource::Pull)?;
        self.flags.pull_active = true;
        self.view = ViewState {
            mode: RankingMode::Latest,
            rotation_offset: 0,
        };
        Some(ticket)
    }

    /// Repeated activation of the already-selected feed tab.
    pub fn request_manual_refresh(&mut self) -> Option<RefetchTicket> {
        let ticket = self.admit(RefreshSource::Manual)?;
        self.flags.manual_active = true;
        self.view = ViewState {
            mode: RankingMode::Explore,
            rotation_offset: self.view.rotation_offset + self.settings.manual_rotation_step,
        };
        Some(ticket)
    }

    /// Background consistency refresh. Leaves the UI flags alone and keeps
    /// the current view unless `reset_rotation_on_foreground` is set.
    pub fn on_foreground_resume(&mut self) -> Option<RefetchTicket> {
        let ticket = self.admit(RefreshSource::Foreground)?;
        if self.settings.reset_rotation_on_foreground {
            self.view = ViewState::default();
        }
        Some(ticket)
    }

    pub fn request_initial_load(&mut self) -> Option<RefetchTicket> {
        self.admit(RefreshSource::Initial)
    }

    fn admit(&mut self, source: RefreshSource) -> Option<RefetchTicket> {
        if self.phase != RefreshPhase::Idle {
            debug!("Dropping {source:?} refresh request while {:?}", self.phase_kind());
            return None;
        }

        self.generation += 1;
        let generation = self.generation;
        self.phase = RefreshPhase::Refreshing {
            source,
            generation,
            started_at: Instant::now(),
        };
        self.safety_timer = Some(self.schedule(
            self.settings.safety_timeout,
            TimerFired::SafetyTimeout { generation },
        ));

        if source.is_silent() {
            debug!("Admitted silent {source:?} refresh (generation {generation})");
        } else {
            info!("Admitted {source:?} refresh (generation {generation})");
        }
        Some(RefetchTicket { generation, source })
    }

    /// Reports that the refetch for `generation` resolved, successfully or not.
    pub fn on_refetch_settled(&mut self, generation: u64, success: bool) -> Settled {
        match self.phase {
            RefreshPhase::Refreshing {
                generation: current,
                source,
                ..
            } if current == generation => {
                self.safety_timer = None;
                self.phase = RefreshPhase::CoolingDown { generation };
                self.cooldown_timer = Some(
                    self.schedule(self.settings.cooldown, TimerFired::Cooldown { generation }),
                );
                debug!("{source:?} refresh settled (generation {generation}, success={success})");
                Settled::Current
            }
            _ => {
                debug!("Late refetch result for generation {generation} (success={success})");
                Settled::Late
            }
        }
    }

    pub fn on_timer(&mut self, fired: TimerFired) -> TimerOutcome {
        match (fired, self.phase) {
            (
                TimerFired::Cooldown { generation },
                RefreshPhase::CoolingDown {
                    generation: current,
                },
            ) if generation == current => {
                self.enter_idle();
                TimerOutcome::CooledDown
            }
            (
                TimerFired::SafetyTimeout { generation },
                RefreshPhase::Refreshing {
                    generation: current,
                    source,
                    started_at,
                },
            ) if generation == current => {
                let after = started_at.elapsed();
                warn!(
                    "{source:?} refresh (generation {generation}) hung for {}ms; forcing idle",
                    after.as_millis()
                );
                self.enter_idle();
                TimerOutcome::TimedOut { source, after }
            }
            _ => TimerOutcome::Stale,
        }
    }

    fn enter_idle(&mut self) {
        self.phase = RefreshPhase::Idle;
        self.flags = RefreshState::default();
        self.safety_timer = None;
        self.cooldown_timer = None;
    }

    fn schedule(&self, delay: Duration, fired: TimerFired) -> ScheduledTask {
        let tx = self.timer_tx.clone();
        ScheduledTask(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // receiver gone means the owning controller shut down
            let _ = tx.send(fired);
        }))
    }
}
