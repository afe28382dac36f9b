//! Error types for the work queue.

use thiserror::Error;

/// Errors raised by [`super::WorkQueue`] and [`super::TransferItem`].
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue was closed before the item could be added.
    #[error("work queue is closed")]
    Closed,

    /// The item cannot be transferred.
    #[error("invalid transfer item '{url}': {reason}")]
    InvalidItem {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl QueueError {
    pub(crate) fn invalid(url: &str, reason: &'static str) -> Self {
        Self::InvalidItem {
            url: url.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_item_display_names_url() {
        let err = QueueError::invalid("ftp://x", "scheme must be http or https");
        assert_eq!(
            err.to_string(),
            "invalid transfer item 'ftp://x': scheme must be http or https"
        );
    }
}
