//! Error types for the crawler.

use thiserror::Error;

use crate::config::ConfigError;
use crate::extractor::ExtractError;
use crate::transport::TransportError;

/// Errors that abort a crawl.
///
/// Per-page and per-post failures that can be isolated are logged and counted
/// instead.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Blog settings could not be turned into an extractor set.
    #[error("invalid blog configuration: {0}")]
    Config(#[from] ConfigError),

    /// An extractor rejected its configured variant.
    #[error(transparent)]
    Extract(ExtractError),

    /// A page failed every attempt and the feed was not known to continue past it.
    #[error("page {url} failed: {source}")]
    Page {
        /// The page URL.
        url: String,
        /// The last transport failure.
        #[source]
        source: TransportError,
    },

    /// A page body could not be read as a feed document.
    #[error("page {url} is not a readable feed: {reason}")]
    Parse {
        /// The page URL.
        url: String,
        /// What went wrong.
        reason: String,
    },

    /// The download side went away before crawling finished.
    #[error("work queue closed while crawling")]
    QueueClosed,
}

impl CrawlError {
    /// Creates a page failure.
    pub fn page(url: impl Into<String>, source: TransportError) -> Self {
        Self::Page {
            url: url.into(),
            source,
        }
    }

    /// Creates a parse failure.
    pub fn parse(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            url: url.into(),
            reason: reason.into(),
        }
    }
}
