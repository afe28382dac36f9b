//! Per-blog job state and counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::signal::PauseToken;
use crate::config::BlogSettings;

/// Lifecycle state of a blog job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Registered, never run or settled back to idle.
    Idle,
    /// Waiting for a blog slot.
    Queued,
    /// Crawler running.
    Crawling,
    /// Crawl finished, downloads still draining.
    Downloading,
    /// Paused by the user; resumes to the state it left.
    Paused,
    /// Run finished.
    Completed,
    /// Run aborted by an error.
    Failed,
    /// Run stopped by cancel or shutdown.
    Cancelled,
}

impl JobState {
    /// Whether a run is in flight.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Queued | Self::Crawling | Self::Downloading | Self::Paused
        )
    }

    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Crawling => "crawling",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters bumped by the crawler and download engine.
///
/// Monotonic within a run; reset only when a new run starts.
#[derive(Debug, Default)]
pub struct JobCounters {
    discovered: AtomicU64,
    downloaded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`JobCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Items emitted by the crawler.
    pub discovered: u64,
    /// Items written to disk.
    pub downloaded: u64,
    /// Items filtered, already present, or abandoned on cancel.
    pub skipped: u64,
    /// Items that failed.
    pub failed: u64,
}

impl JobCounters {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an emitted item.
    pub fn increment_discovered(&self) {
        self.discovered.fetch_add(1, Ordering::SeqCst);
    }

    /// Records a completed transfer.
    pub fn increment_downloaded(&self) {
        self.downloaded.fetch_add(1, Ordering::SeqCst);
    }

    /// Records a skipped item.
    pub fn increment_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }

    /// Records a failed item.
    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    /// Zeroes every counter.
    pub(crate) fn reset(&self) {
        for counter in [&self.discovered, &self.downloaded, &self.skipped, &self.failed] {
            counter.store(0, Ordering::SeqCst);
        }
    }

    /// Reads all counters.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            discovered: self.discovered.load(Ordering::SeqCst),
            downloaded: self.downloaded.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StateCell {
    current: JobState,
    resume_to: Option<JobState>,
}

/// One blog's identity, settings and run state.
#[derive(Debug)]
pub struct BlogJob {
    settings: Arc<BlogSettings>,
    state: Mutex<StateCell>,
    cancel: Mutex<CancellationToken>,
    pause: PauseToken,
    counters: JobCounters,
}

impl BlogJob {
    pub(crate) fn new(settings: BlogSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            state: Mutex::new(StateCell {
                current: JobState::Idle,
                resume_to: None,
            }),
            cancel: Mutex::new(CancellationToken::new()),
            pause: PauseToken::new(),
            counters: JobCounters::new(),
        }
    }

    /// Blog name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Blog settings snapshot.
    #[must_use]
    pub fn settings(&self) -> &Arc<BlogSettings> {
        &self.settings
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> JobState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).current
    }

    /// Counters for the current or last run.
    #[must_use]
    pub fn counters(&self) -> &JobCounters {
        &self.counters
    }

    pub(crate) fn pause_token(&self) -> &PauseToken {
        &self.pause
    }

    /// Starts a run: fresh child cancellation token, zeroed counters, pause cleared.
    ///
    /// Returns `None` when a run is already active. The check and the move to
    /// [`JobState::Queued`] happen under one lock, so concurrent callers start at most
    /// one run.
    pub(crate) fn try_begin_run(&self, parent: &CancellationToken) -> Option<CancellationToken> {
        let mut cell = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if cell.current.is_active() {
            return None;
        }
        let token = parent.child_token();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        self.counters.reset();
        self.pause.resume();
        debug!(blog = %self.settings.name, from = %cell.current, to = %JobState::Queued, "job state");
        cell.current = JobState::Queued;
        cell.resume_to = None;
        Some(token)
    }

    /// Moves to `next`. While paused, the target is remembered for [`Self::resume`].
    pub(crate) fn advance(&self, next: JobState) {
        let mut cell = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if cell.current == JobState::Paused && next.is_active() {
            cell.resume_to = Some(next);
            return;
        }
        debug!(blog = %self.settings.name, from = %cell.current, to = %next, "job state");
        cell.current = next;
        if !next.is_active() {
            cell.resume_to = None;
        }
    }

    /// Pauses an active run. Returns `false` when nothing is running.
    pub(crate) fn pause(&self) -> bool {
        let mut cell = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !cell.current.is_active() || cell.current == JobState::Paused {
            return cell.current == JobState::Paused;
        }
        cell.resume_to = Some(cell.current);
        cell.current = JobState::Paused;
        self.pause.pause();
        true
    }

    /// Resumes a paused run. Returns `false` when the job was not paused.
    pub(crate) fn resume(&self) -> bool {
        let mut cell = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if cell.current != JobState::Paused {
            return false;
        }
        cell.current = cell.resume_to.take().unwrap_or(JobState::Crawling);
        self.pause.resume();
        true
    }

    /// Fires the current run's cancellation token.
    pub(crate) fn cancel(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}
