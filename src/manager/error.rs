//! Error types for the queue manager.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::crawler::CrawlError;
use crate::transport::TransportError;

/// Errors raised by [`super::QueueManager`] operations and blog runs.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// No blog registered under this name.
    #[error("unknown blog '{name}'")]
    UnknownBlog {
        /// The requested name.
        name: String,
    },

    /// A blog with this name is already registered.
    #[error("blog '{name}' is already registered")]
    DuplicateBlog {
        /// The duplicated name.
        name: String,
    },

    /// The blog already has a run in flight.
    #[error("blog '{name}' is already queued or running")]
    AlreadyActive {
        /// The blog name.
        name: String,
    },

    /// [`super::QueueManager::shutdown`] was called.
    #[error("queue manager is shutting down")]
    ShuttingDown,

    /// Invalid blog settings.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The crawl aborted.
    #[error(transparent)]
    Crawl(#[from] CrawlError),

    /// Blog kind detection failed.
    #[error("could not detect blog kind: {0}")]
    Detect(TransportError),

    /// The blog directory could not be created.
    #[error("cannot create blog directory {path}: {source}")]
    Io {
        /// The directory.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ManagerError {
    pub(crate) fn unknown(name: &str) -> Self {
        Self::UnknownBlog {
            name: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_blog() {
        assert_eq!(ManagerError::unknown("x").to_string(), "unknown blog 'x'");
        assert_eq!(
            ManagerError::AlreadyActive { name: "x".to_string() }.to_string(),
            "blog 'x' is already queued or running"
        );
    }
}
