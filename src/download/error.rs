//! Error types for the download module.

use std::path::PathBuf;

use thiserror::Error;

use crate::transport::TransportError;

/// Errors that can occur while fetching one item.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Cancellation was observed before the transfer finished.
    #[error("download of {url} cancelled")]
    Cancelled {
        /// The item URL.
        url: String,
    },

    /// Another writer holds the destination file.
    #[error("destination {path} is in use by another writer: {source}")]
    FileConflict {
        /// The locked destination.
        path: PathBuf,
        /// The lock failure.
        #[source]
        source: std::io::Error,
    },

    /// Local filesystem failure while opening, writing or flushing.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Transport failure that is not worth retrying, or the last retryable one.
    #[error(transparent)]
    Transport(TransportError),

    /// The body ended before the advertised length arrived.
    #[error("stream for {url} ended at {received} of {expected} bytes")]
    Incomplete {
        /// The item URL.
        url: String,
        /// Total bytes expected on disk.
        expected: u64,
        /// Bytes on disk when the stream ended.
        received: u64,
    },

    /// Every allowed attempt failed with a retryable error.
    #[error("giving up on {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// The item URL.
        url: String,
        /// Attempts made.
        attempts: u32,
        /// Description of the last failure.
        last: String,
    },
}

impl DownloadError {
    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Creates an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a lock conflict error.
    pub fn file_conflict(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileConflict {
            path: path.into(),
            source,
        }
    }

    /// Creates a premature end-of-stream error.
    pub fn incomplete(url: impl Into<String>, expected: u64, received: u64) -> Self {
        Self::Incomplete {
            url: url.into(),
            expected,
            received,
        }
    }

    /// Creates the terminal error after the attempt cap.
    pub fn retries_exhausted(url: impl Into<String>, attempts: u32, last: &Self) -> Self {
        Self::RetriesExhausted {
            url: url.into(),
            attempts,
            last: last.to_string(),
        }
    }

    /// Whether this is a cancellation rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
