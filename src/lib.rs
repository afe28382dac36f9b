//! Blogfetch Core Library
//!
//! Crawls the feeds of blogs hosted on a blogging platform and downloads the
//! media they reference, from the platform's own media hosts and from a handful
//! of third-party file hosts.
//!
//! # Architecture
//!
//! - [`config`] - settings snapshot, per-blog options, TOML loading
//! - [`transport`] - shared HTTP client with connection ceiling, timeouts and throttling
//! - [`auth`] - cookie bridge and Netscape cookie import
//! - [`extractor`] - per-host media link extraction and image size normalization
//! - [`crawler`] - feed pagination, blog detection and item discovery
//! - [`queue`] - bounded work queue between crawler and downloader
//! - [`download`] - resumable fetches and the per-blog download engine
//! - [`manager`] - blog registry, scheduling, pause and cancellation

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod crawler;
pub mod download;
pub mod extractor;
pub mod manager;
pub mod queue;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use auth::{CookieBridge, SharedCookieService};
pub use config::{AppSettings, BlogKind, BlogSettings, ConfigError, FileConfig, load_config};
pub use crawler::{CrawlError, Crawler};
pub use download::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DownloadEngine, DownloadError, FileDownloader,
    ProgressEvent, RetryPolicy,
};
pub use extractor::{HostKind, ImageSize, MediaVariant};
pub use manager::{BlogJob, JobState, ManagerError, QueueManager};
pub use queue::{MediaKind, QueueError, TransferItem, WorkQueue};
pub use transport::{HttpClient, TransportError};
