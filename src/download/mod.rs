//! Media transfer: resumable single-file fetches and the per-blog engine around them.
//!
//! - [`FileDownloader`] - resume, retry with backoff, bandwidth throttling, cancellation
//! - [`DownloadEngine`] - drains a work queue with bounded concurrency
//! - [`RetryPolicy`] / [`classify_error`] - which failures are worth another attempt
//! - [`ProgressSink`] - non-blocking progress snapshots
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use blogfetch_core::config::AppSettings;
//! use blogfetch_core::download::FileDownloader;
//! use blogfetch_core::queue::{MediaKind, TransferItem};
//! use blogfetch_core::transport::HttpClient;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = AppSettings::default();
//! let client = HttpClient::new(&settings, None)?;
//! let downloader = FileDownloader::new(client, &settings, CancellationToken::new());
//! let url = "https://64.media.tumblr.com/abc/tumblr_xyz_1280.jpg";
//! let item = TransferItem::new(url, url, "tumblr_xyz", MediaKind::Image, 0)?;
//! downloader.fetch(&item, Path::new("./tumblr_xyz.jpg")).await?;
//! # Ok(())
//! # }
//! ```

mod downloader;
mod engine;
mod error;
mod filename;
mod progress;
mod retry;

pub use downloader::{FetchOutcome, FileDownloader};
pub use engine::{DEFAULT_CONCURRENCY, DownloadEngine, DownloadStats};
pub use error::DownloadError;
pub use filename::destination_file_name;
pub(crate) use filename::sanitize_filename_component;
pub use progress::{ProgressEvent, ProgressSink, TransferProgress};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, RetryState, classify_error};
