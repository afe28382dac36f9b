//! Transfer progress snapshots.

use tokio::sync::mpsc;
use tokio::time::Instant;

/// Progress of one transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    /// Bytes on disk, including any resumed prefix.
    pub bytes_received: u64,
    /// Expected total, once the response headers are known.
    pub total_bytes: Option<u64>,
    /// Rate over the current attempt, bytes per second.
    pub bytes_per_sec: f64,
}

impl TransferProgress {
    /// Percentage complete, when the total is known.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percentage(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some((self.bytes_received as f64 / total as f64 * 100.0).min(100.0)),
            None => None,
        }
    }
}

/// A progress snapshot tagged with its blog and item.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Blog the item belongs to.
    pub blog: String,
    /// Item id.
    pub item_id: String,
    /// The snapshot.
    pub progress: TransferProgress,
}

/// Sending half of the progress channel.
///
/// Sends never block; snapshots are dropped when the receiver lags.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    blog: String,
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressSink {
    /// Creates a sink and its receiver.
    #[must_use]
    pub fn channel(blog: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::from_sender(blog, tx), rx)
    }

    /// Wraps an existing sender, for sinks shared between blogs.
    #[must_use]
    pub fn from_sender(blog: impl Into<String>, tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            blog: blog.into(),
            tx,
        }
    }

    /// Publishes a snapshot without waiting.
    pub fn report(&self, item_id: &str, progress: TransferProgress) {
        let _ = self.tx.try_send(ProgressEvent {
            blog: self.blog.clone(),
            item_id: item_id.to_string(),
            progress,
        });
    }
}

/// Tracks one attempt's rate.
#[derive(Debug)]
pub(crate) struct RateMeter {
    started: Instant,
    base: u64,
}

impl RateMeter {
    pub(crate) fn start(base: u64) -> Self {
        Self {
            started: Instant::now(),
            base,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn snapshot(&self, bytes_received: u64, total_bytes: Option<u64>) -> TransferProgress {
        let elapsed = self.started.elapsed().as_secs_f64();
        let fresh = bytes_received.saturating_sub(self.base) as f64;
        TransferProgress {
            bytes_received,
            total_bytes,
            bytes_per_sec: if elapsed > 0.0 { fresh / elapsed } else { 0.0 },
        }
    }
}
