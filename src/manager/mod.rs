//! Queue manager: owns every registered blog and schedules their runs.
//!
//! Each run acquires one of `concurrent_blogs` slots, builds a [`Crawler`] through
//! the [`CrawlerFactory`], then runs the crawler and a [`DownloadEngine`] side by
//! side over a fresh [`WorkQueue`]. The crawl closes the queue when it ends; the
//! engine finishes whatever is left.
//!
//! Cancellation is hierarchical: [`QueueManager::shutdown`] fires a parent token
//! every run token is a child of, so one call stops all blogs.

mod error;
mod factory;
mod job;
mod signal;

pub use error::ManagerError;
pub use factory::{CrawlerFactory, PlatformCrawlerFactory};
pub use job::{BlogJob, CounterSnapshot, JobCounters, JobState};
pub use signal::PauseToken;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::{AppSettings, BlogSettings};
use crate::crawler::{CrawlError, CrawlState, Crawler};
use crate::download::{
    DEFAULT_CONCURRENCY, DownloadEngine, FileDownloader, ProgressEvent, ProgressSink,
    sanitize_filename_component,
};
use crate::queue::WorkQueue;
use crate::transport::HttpClient;

/// Everything a run task needs, cloned into each spawned run.
#[derive(Debug, Clone)]
struct RunContext {
    settings: Arc<AppSettings>,
    client: HttpClient,
    slots: Arc<Semaphore>,
    factory: Arc<dyn CrawlerFactory>,
    progress: Option<mpsc::Sender<ProgressEvent>>,
}

/// Registry and scheduler for blog jobs.
#[derive(Debug)]
pub struct QueueManager {
    context: RunContext,
    shutdown: CancellationToken,
    jobs: DashMap<String, Arc<BlogJob>>,
    active: Arc<watch::Sender<usize>>,
}

/// Decrements the active-run count when a run task ends, panicking or not.
struct ActiveRun(Arc<watch::Sender<usize>>);

impl ActiveRun {
    fn register(active: &Arc<watch::Sender<usize>>) -> Self {
        active.send_modify(|count| *count += 1);
        Self(Arc::clone(active))
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }
}

impl QueueManager {
    /// Creates a manager with the default [`PlatformCrawlerFactory`].
    #[must_use]
    pub fn new(settings: Arc<AppSettings>, client: HttpClient) -> Self {
        let slots = Arc::new(Semaphore::new(settings.concurrent_blogs.max(1)));
        Self {
            context: RunContext {
                settings,
                client,
                slots,
                factory: Arc::new(PlatformCrawlerFactory::new()),
                progress: None,
            },
            shutdown: CancellationToken::new(),
            jobs: DashMap::new(),
            active: Arc::new(watch::channel(0).0),
        }
    }

    /// Replaces the crawler factory.
    #[must_use]
    pub fn with_factory(mut self, factory: impl CrawlerFactory + 'static) -> Self {
        self.context.factory = Arc::new(factory);
        self
    }

    /// Forwards transfer progress from every run to `tx`.
    #[must_use]
    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressEvent>) -> Self {
        self.context.progress = Some(tx);
        self
    }

    /// Registers a blog.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Config`] for invalid settings and
    /// [`ManagerError::DuplicateBlog`] when the name (case-insensitive) is taken.
    pub fn add_blog(&self, settings: BlogSettings) -> Result<Arc<BlogJob>, ManagerError> {
        settings.validate()?;
        let key = job_key(&settings.name);
        match self.jobs.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ManagerError::DuplicateBlog {
                name: settings.name,
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let job = Arc::new(BlogJob::new(settings));
                slot.insert(Arc::clone(&job));
                info!(blog = %job.name(), "blog registered");
                Ok(job)
            }
        }
    }

    /// Looks up a blog by name.
    #[must_use]
    pub fn job(&self, name: &str) -> Option<Arc<BlogJob>> {
        self.jobs.get(&job_key(name)).map(|entry| Arc::clone(entry.value()))
    }

    /// Every registered blog, sorted by name.
    #[must_use]
    pub fn jobs(&self) -> Vec<Arc<BlogJob>> {
        let mut jobs: Vec<_> = self.jobs.iter().map(|entry| Arc::clone(entry.value())).collect();
        jobs.sort_by(|a, b| a.name().cmp(b.name()));
        jobs
    }

    /// Starts a run for `name`. It waits for a free blog slot before crawling.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`ManagerError::ShuttingDown`] after [`Self::shutdown`]
    /// - [`ManagerError::UnknownBlog`] for an unregistered name
    /// - [`ManagerError::AlreadyActive`] while a run is in flight
    pub fn enqueue(&self, name: &str) -> Result<(), ManagerError> {
        if self.shutdown.is_cancelled() {
            return Err(ManagerError::ShuttingDown);
        }
        let job = self.job(name).ok_or_else(|| ManagerError::unknown(name))?;
        let Some(cancel) = job.try_begin_run(&self.shutdown) else {
            return Err(ManagerError::AlreadyActive {
                name: job.name().to_string(),
            });
        };
        let context = self.context.clone();
        let active = ActiveRun::register(&self.active);
        tokio::spawn(async move {
            let _active = active;
            run_blog(context, job, cancel).await;
        });
        Ok(())
    }

    /// Pauses a running blog at its next page or item boundary.
    ///
    /// Returns `false` when the blog has no run in flight.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::UnknownBlog`] for an unregistered name.
    pub fn pause(&self, name: &str) -> Result<bool, ManagerError> {
        let job = self.job(name).ok_or_else(|| ManagerError::unknown(name))?;
        Ok(job.pause())
    }

    /// Resumes a paused blog. Returns `false` when it was not paused.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::UnknownBlog`] for an unregistered name.
    pub fn resume(&self, name: &str) -> Result<bool, ManagerError> {
        let job = self.job(name).ok_or_else(|| ManagerError::unknown(name))?;
        Ok(job.resume())
    }

    /// Cancels the blog's current run. A no-op when nothing is running.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::UnknownBlog`] for an unregistered name.
    pub fn cancel(&self, name: &str) -> Result<(), ManagerError> {
        let job = self.job(name).ok_or_else(|| ManagerError::unknown(name))?;
        job.cancel();
        Ok(())
    }

    /// Whether [`Self::shutdown`] has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancels every run and waits for all of them to settle.
    ///
    /// Transfers stop between chunks. Counters are kept. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!(blogs = self.jobs.len(), "shutting down");
            self.shutdown.cancel();
        }
        self.wait_idle().await;
    }

    /// Number of runs queued or in flight.
    #[must_use]
    pub fn active_runs(&self) -> usize {
        *self.active.borrow()
    }

    /// Waits until no run is queued or in flight. Cancel-safe.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

fn job_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[instrument(skip_all, fields(blog = %job.name()))]
async fn run_blog(context: RunContext, job: Arc<BlogJob>, cancel: CancellationToken) {
    let slot = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        permit = Arc::clone(&context.slots).acquire_owned() => permit.ok(),
    };
    let Some(_slot) = slot else {
        job.advance(JobState::Cancelled);
        info!("run cancelled before it started");
        return;
    };

    job.advance(JobState::Crawling);
    let final_state = match execute_run(&context, &job, &cancel).await {
        Ok(state) => state,
        Err(_) if cancel.is_cancelled() => JobState::Cancelled,
        Err(e) => {
            warn!(error = %e, "blog run failed");
            JobState::Failed
        }
    };
    job.advance(final_state);
    let counters = job.counters().snapshot();
    info!(
        state = %final_state,
        discovered = counters.discovered,
        downloaded = counters.downloaded,
        skipped = counters.skipped,
        failed = counters.failed,
        "blog run settled"
    );
}

async fn execute_run(
    context: &RunContext,
    job: &BlogJob,
    cancel: &CancellationToken,
) -> Result<JobState, ManagerError> {
    let blog = Arc::clone(job.settings());
    let settings = &context.settings;
    let blog_dir = settings
        .download_location
        .join(sanitize_filename_component(&blog.name));
    tokio::fs::create_dir_all(&blog_dir)
        .await
        .map_err(|source| ManagerError::Io {
            path: blog_dir.clone(),
            source,
        })?;

    let crawler: Crawler = context
        .factory
        .build(Arc::clone(&blog), Arc::clone(settings), context.client.clone())
        .await?;

    let queue = WorkQueue::new(settings.queue_capacity);
    let drain = queue.drain().ok_or(CrawlError::QueueClosed)?;
    let mut downloader = FileDownloader::new(context.client.clone(), settings, cancel.clone());
    if let Some(tx) = &context.progress {
        downloader = downloader.with_progress(ProgressSink::from_sender(blog.name.clone(), tx.clone()));
    }
    let concurrency = usize::try_from(settings.concurrent_connections).unwrap_or(DEFAULT_CONCURRENCY);
    let engine = DownloadEngine::new(downloader, blog_dir, concurrency);

    let crawl = async {
        let result = crawler
            .run(job.counters(), &queue, cancel, job.pause_token())
            .await;
        queue.close();
        if result.is_ok() && !cancel.is_cancelled() {
            job.advance(JobState::Downloading);
        }
        result
    };
    let download = engine.run(drain, job.counters(), job.pause_token(), cancel);
    let (crawled, stats) = tokio::join!(crawl, download);

    let outcome = crawled?;
    info!(
        pages = outcome.pages,
        items = outcome.items,
        downloaded = stats.downloaded(),
        skipped = stats.skipped(),
        failed = stats.failed(),
        "blog run finished"
    );
    if cancel.is_cancelled() || outcome.final_state == CrawlState::Cancelled {
        Ok(JobState::Cancelled)
    } else {
        Ok(JobState::Completed)
    }
}
