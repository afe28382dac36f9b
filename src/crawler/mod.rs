//! Blog crawler: pages through a blog's feed and turns media references into
//! [`TransferItem`]s on the blog's [`WorkQueue`].
//!
//! A single [`Crawler`] handles every blog flavour. What differs is plugged in
//! through [`CrawlerParts`]:
//!
//! - a [`PaginationStrategy`] (public read API or hidden dashboard feed)
//! - an [`AuthStrategy`] (basic auth and platform cookies)
//! - the [`HostExtractor`] set, filtered by the blog's host toggles
//!
//! # State machine
//!
//! ```text
//! Start -> FetchingPage -> Extracting -> FetchingPage ... -> Draining -> Done
//!              ^  |
//!              |  v
//!          PausedWait            (Cancelled is reachable from any state)
//! ```

mod auth;
mod detector;
mod error;
mod feed;
mod filter;
mod token;

pub use auth::{AuthStrategy, BlogPasswordAuth, basic_auth_value};
pub use detector::BlogDetector;
pub use error::CrawlError;
pub use feed::{FeedPage, FeedPost, HiddenBlogPagination, PaginationStrategy, PublicApiPagination};
pub use filter::{TagFilter, skip_gif};
pub use token::{FORM_KEY_HEADER, FormKeyCache, extract_form_key};

use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{AppSettings, BlogSettings};
use crate::download::{FailureType, RetryDecision, RetryPolicy};
use crate::extractor::{ExtractedMedia, HostExtractor, MediaVariant, normalize_image_size};
use crate::manager::{JobCounters, PauseToken};
use crate::queue::{MediaKind, TransferItem, WorkQueue};
use crate::transport::{HttpClient, RequestOptions, TransportError};

/// Crawler progress through a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlState {
    /// Not started.
    Start,
    /// Waiting on a feed page.
    FetchingPage,
    /// Running extractors over a page's posts.
    Extracting,
    /// Held before a page fetch by the pause signal.
    PausedWait,
    /// No more pages; the download side finishes the queue.
    Draining,
    /// Crawl finished.
    Done,
    /// Crawl stopped by cancellation.
    Cancelled,
}

/// Summary of a finished crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlOutcome {
    /// Pages fetched and parsed.
    pub pages: u32,
    /// Items pushed onto the queue.
    pub items: u64,
    /// Pages given up on and skipped.
    pub failed_pages: u32,
    /// [`CrawlState::Done`] or [`CrawlState::Cancelled`].
    pub final_state: CrawlState,
}

/// Pluggable crawler components.
#[derive(Debug, Clone)]
pub struct CrawlerParts {
    /// Feed flavour.
    pub pagination: Arc<dyn PaginationStrategy>,
    /// Credentials for page fetches.
    pub auth: Arc<dyn AuthStrategy>,
    /// Every available extractor, in run order. Hosts the blog disables are dropped.
    pub extractors: Vec<Arc<dyn HostExtractor>>,
}

enum PageFailure {
    Cancelled,
    Failed(CrawlError),
}

#[derive(Debug, Default)]
struct Tally {
    pages: u32,
    items: u64,
    failed_pages: u32,
}

/// Crawls one blog.
#[derive(Debug)]
pub struct Crawler {
    blog: Arc<BlogSettings>,
    settings: Arc<AppSettings>,
    client: HttpClient,
    pagination: Arc<dyn PaginationStrategy>,
    auth: Arc<dyn AuthStrategy>,
    extractors: Vec<(Arc<dyn HostExtractor>, MediaVariant)>,
    tags: TagFilter,
    form_key: Option<FormKeyCache>,
    page_policy: RetryPolicy,
    state: Mutex<CrawlState>,
}

impl Crawler {
    /// Builds a crawler for `blog`, enabling the extractors its host toggles name.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Config`] for an unknown variant selector and
    /// [`CrawlError::Extract`] for a variant the host cannot serve.
    pub fn new(
        blog: Arc<BlogSettings>,
        settings: Arc<AppSettings>,
        client: HttpClient,
        parts: CrawlerParts,
    ) -> Result<Self, CrawlError> {
        let mut extractors = Vec::new();
        for extractor in parts.extractors {
            let Some(variant) = blog.variant_for(extractor.host())? else {
                continue;
            };
            extractor.ensure_supported(variant).map_err(CrawlError::Extract)?;
            extractors.push((extractor, variant));
        }
        let form_key = parts
            .pagination
            .form_key_source(&blog, &settings.platform_domain)
            .map(FormKeyCache::new);
        Ok(Self {
            tags: TagFilter::parse(&blog.tags),
            page_policy: RetryPolicy::with_attempts_and_base(
                settings.page_retries,
                settings.retry_base_delay(),
            ),
            blog,
            settings,
            client,
            pagination: parts.pagination,
            auth: parts.auth,
            extractors,
            form_key,
            state: Mutex::new(CrawlState::Start),
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CrawlState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: CrawlState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            debug!(blog = %self.blog.name, from = ?*state, to = ?next, "crawl state");
            *state = next;
        }
    }

    fn cancelled(&self, tally: &Tally) -> CrawlOutcome {
        self.transition(CrawlState::Cancelled);
        info!(blog = %self.blog.name, pages = tally.pages, items = tally.items, "crawl cancelled");
        tally.outcome(CrawlState::Cancelled)
    }

    /// Crawls every page, pushing items onto `queue`.
    ///
    /// The caller closes the queue once this returns.
    ///
    /// # Errors
    ///
    /// Returns a [`CrawlError`] when a page fails with no way to skip it, an
    /// extractor rejects its configuration, or the queue's consumer went away.
    #[instrument(skip_all, fields(blog = %self.blog.name))]
    pub async fn run(
        &self,
        counters: &JobCounters,
        queue: &WorkQueue,
        cancel: &CancellationToken,
        pause: &PauseToken,
    ) -> Result<CrawlOutcome, CrawlError> {
        let page_size = self.settings.page_size.max(1);
        let mut tally = Tally::default();
        let mut known_total: Option<u64> = None;
        let mut page: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Ok(self.cancelled(&tally));
            }
            if self.blog.page_cap.is_some_and(|cap| page >= cap) || self.item_cap_reached(&tally) {
                break;
            }
            if pause.is_paused() {
                self.transition(CrawlState::PausedWait);
                if !pause.wait_while_paused(cancel).await {
                    return Ok(self.cancelled(&tally));
                }
            }

            self.transition(CrawlState::FetchingPage);
            let offset = u64::from(page) * u64::from(page_size);
            let url = self
                .pagination
                .page_url(&self.blog, &self.settings.platform_domain, offset, page_size);
            let feed = match self.fetch_page(&url, cancel).await {
                Ok(body) => self.pagination.parse_page(&url, &body, offset, page_size),
                Err(PageFailure::Cancelled) => return Ok(self.cancelled(&tally)),
                Err(PageFailure::Failed(e)) => Err(e),
            };
            let feed = match feed {
                Ok(feed) => feed,
                Err(e) => {
                    let next_offset = offset + u64::from(page_size);
                    if known_total.is_some_and(|total| total > next_offset) {
                        warn!(page, error = %e, "skipping failed page");
                        tally.failed_pages += 1;
                        page += 1;
                        continue;
                    }
                    return Err(e);
                }
            };
            tally.pages += 1;
            if feed.total.is_some() {
                known_total = feed.total;
            }

            self.transition(CrawlState::Extracting);
            for post in &feed.posts {
                if self.item_cap_reached(&tally) {
                    break;
                }
                if !self.tags.allows(&post.tags) {
                    continue;
                }
                if !self.extract_post(post, counters, queue, cancel, &mut tally).await? {
                    return Ok(self.cancelled(&tally));
                }
            }

            if !feed.has_more {
                break;
            }
            page += 1;
        }

        self.transition(CrawlState::Draining);
        info!(
            pages = tally.pages,
            items = tally.items,
            failed_pages = tally.failed_pages,
            "crawl finished"
        );
        self.transition(CrawlState::Done);
        Ok(tally.outcome(CrawlState::Done))
    }

    fn item_cap_reached(&self, tally: &Tally) -> bool {
        self.blog
            .item_cap
            .is_some_and(|cap| tally.items >= cap as u64)
    }

    /// Runs every enabled extractor over one post. Returns `false` on cancellation.
    async fn extract_post(
        &self,
        post: &FeedPost,
        counters: &JobCounters,
        queue: &WorkQueue,
        cancel: &CancellationToken,
        tally: &mut Tally,
    ) -> Result<bool, CrawlError> {
        for (extractor, variant) in &self.extractors {
            let found = match extractor.search(&post.content, *variant).await {
                Ok(found) => found,
                Err(e) if e.is_fatal() => return Err(CrawlError::Extract(e)),
                Err(e) => {
                    warn!(post = %post.id, host = %extractor.host(), error = %e, "extraction failed for post");
                    continue;
                }
            };
            for media in found {
                if self.item_cap_reached(tally) {
                    return Ok(true);
                }
                let Some(item) = self.to_item(media, post.timestamp, counters) else {
                    continue;
                };
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Ok(false),
                    pushed = queue.push(item) => pushed.map_err(|_| CrawlError::QueueClosed)?,
                }
                counters.increment_discovered();
                tally.items += 1;
            }
        }
        Ok(true)
    }

    fn to_item(&self, media: ExtractedMedia, timestamp: i64, counters: &JobCounters) -> Option<TransferItem> {
        if skip_gif(self.blog.skip_gif, &media.url) {
            debug!(url = %media.url, "gif skipped");
            counters.increment_skipped();
            return None;
        }
        let url = if media.kind == MediaKind::Image {
            normalize_image_size(&media.url, self.settings.image_size)
        } else {
            media.url
        };
        match TransferItem::new(media.origin_url, url, media.id, media.kind, timestamp) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(error = %e, "dropping unusable media reference");
                counters.increment_skipped();
                None
            }
        }
    }

    async fn page_options(&self) -> RequestOptions {
        let mut options = self
            .pagination
            .page_options(&self.blog, &self.settings.platform_domain);
        let auth = self.auth.request_options(&self.blog);
        options.headers.extend(auth.headers);
        options.cookie_hosts.extend(auth.cookie_hosts);
        if let Some(cache) = &self.form_key
            && let Some(key) = cache
                .get(&self.client, &self.auth.request_options(&self.blog))
                .await
        {
            options = options.with_header(FORM_KEY_HEADER, key);
        }
        options
    }

    async fn fetch_page(&self, url: &str, cancel: &CancellationToken) -> Result<String, PageFailure> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let options = self.page_options().await;
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(PageFailure::Cancelled),
                result = self.client.get_text(url, &options) => result,
            };
            let error = match result {
                Ok(body) => return Ok(body),
                Err(error) => error,
            };
            if matches!(error, TransportError::AuthRequired { .. })
                && let Some(cache) = &self.form_key
            {
                cache.invalidate().await;
            }
            if error.is_configuration() {
                return Err(PageFailure::Failed(CrawlError::page(url, error)));
            }
            match self.page_policy.should_retry(FailureType::Transient, attempt) {
                RetryDecision::Retry { delay, .. } => {
                    warn!(url, attempt, error = %error, "page fetch failed, retrying");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(PageFailure::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::DoNotRetry { .. } => {
                    return Err(PageFailure::Failed(CrawlError::page(url, error)));
                }
            }
        }
    }
}

impl Tally {
    fn outcome(&self, final_state: CrawlState) -> CrawlOutcome {
        CrawlOutcome {
            pages: self.pages,
            items: self.items,
            failed_pages: self.failed_pages,
            final_state,
        }
    }
}
