//! Per-blog download engine.
//!
//! [`DownloadEngine::run`] drains one blog's [`QueueDrain`] with bounded concurrency,
//! handing each item to a [`FileDownloader`]. Items are isolated from each other: a
//! failure is counted and logged, never propagated.
//!
//! # Concurrency Model
//!
//! - At most `concurrency` items of this blog are in flight
//! - Every transfer also takes a process-wide connection slot inside the downloader
//! - Each destination path is claimed once per run, so two items resolving to the
//!   same file never write concurrently
//! - The pause signal is honoured before each item starts, never mid-transfer

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::downloader::{FetchOutcome, FileDownloader};
use crate::manager::{JobCounters, PauseToken};
use crate::queue::{QueueDrain, TransferItem};

/// Default number of concurrent transfers per blog.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Statistics from one engine run.
#[derive(Debug, Default)]
pub struct DownloadStats {
    downloaded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl DownloadStats {
    /// Items written to disk.
    #[must_use]
    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::SeqCst)
    }

    /// Items already present, duplicated, or abandoned on cancel.
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Items that failed.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Every item the engine saw.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.downloaded() + self.skipped() + self.failed()
    }
}

/// Drains a work queue into a blog directory.
#[derive(Debug)]
pub struct DownloadEngine {
    downloader: FileDownloader,
    blog_dir: PathBuf,
    concurrency: usize,
    claimed: Mutex<HashSet<PathBuf>>,
}

impl DownloadEngine {
    /// Creates an engine writing into `blog_dir`. `concurrency` is clamped to 1.
    #[must_use]
    pub fn new(downloader: FileDownloader, blog_dir: impl Into<PathBuf>, concurrency: usize) -> Self {
        Self {
            downloader,
            blog_dir: blog_dir.into(),
            concurrency: concurrency.max(1),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Directory items are written to.
    #[must_use]
    pub fn blog_dir(&self) -> &Path {
        &self.blog_dir
    }

    /// Processes items until the queue is closed and empty.
    ///
    /// After `cancel` fires, remaining items are still drained but counted as skipped
    /// without any network traffic.
    #[instrument(skip_all, fields(dir = %self.blog_dir.display(), concurrency = self.concurrency))]
    pub async fn run(
        &self,
        drain: QueueDrain,
        counters: &JobCounters,
        pause: &PauseToken,
        cancel: &CancellationToken,
    ) -> DownloadStats {
        let stats = DownloadStats::default();
        drain
            .for_each_concurrent(self.concurrency, |item| {
                self.process(item, counters, pause, cancel, &stats)
            })
            .await;
        info!(
            downloaded = stats.downloaded(),
            skipped = stats.skipped(),
            failed = stats.failed(),
            "download engine drained"
        );
        stats
    }

    async fn process(
        &self,
        item: TransferItem,
        counters: &JobCounters,
        pause: &PauseToken,
        cancel: &CancellationToken,
        stats: &DownloadStats,
    ) {
        if !pause.wait_while_paused(cancel).await {
            record_skip(counters, stats);
            return;
        }

        let dest = self.blog_dir.join(item.file_name());
        if !self.claim(&dest) {
            debug!(id = item.id(), dest = %dest.display(), "destination already claimed this run");
            record_skip(counters, stats);
            return;
        }

        match self.downloader.fetch(&item, &dest).await {
            Ok(FetchOutcome::Completed { bytes, resumed }) => {
                debug!(id = item.id(), bytes, resumed, "transfer complete");
                counters.increment_downloaded();
                stats.downloaded.fetch_add(1, Ordering::SeqCst);
            }
            Ok(FetchOutcome::AlreadyComplete { bytes }) => {
                debug!(id = item.id(), bytes, "already on disk");
                record_skip(counters, stats);
            }
            Err(e) if e.is_cancelled() => record_skip(counters, stats),
            Err(e) => {
                warn!(id = item.id(), url = item.url(), error = %e, "transfer failed");
                counters.increment_failed();
                stats.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn claim(&self, dest: &Path) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dest.to_path_buf())
    }
}

fn record_skip(counters: &JobCounters, stats: &DownloadStats) {
    counters.increment_skipped();
    stats.skipped.fetch_add(1, Ordering::SeqCst);
}
