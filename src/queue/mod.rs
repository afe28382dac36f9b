//! Bounded hand-off between one blog's crawler and its download engine.
//!
//! # Overview
//!
//! - [`WorkQueue`] - cloneable producer handle with backpressure
//! - [`QueueDrain`] - the single consumer, a [`Stream`] of [`TransferItem`]s
//! - [`TransferItem`] - one validated media reference
//!
//! Items come out in the order they went in. After [`WorkQueue::close`] no new item
//! is accepted, but everything already queued is still delivered before the drain
//! ends.
//!
//! # Example
//!
//! ```
//! use blogfetch_core::queue::{MediaKind, TransferItem, WorkQueue};
//!
//! # tokio_test::block_on(async {
//! let queue = WorkQueue::new(4);
//! let mut drain = queue.drain().expect("first drain");
//! let item = TransferItem::new("https://b.example/post/1", "https://m.example/a.jpg", "a", MediaKind::Image, 0)?;
//! queue.push(item).await?;
//! queue.close();
//! assert_eq!(drain.next().await.map(|i| i.id().to_string()), Some("a".to_string()));
//! assert!(drain.next().await.is_none());
//! # Ok::<(), blogfetch_core::queue::QueueError>(())
//! # });
//! ```

mod error;
mod item;

pub use error::QueueError;
pub use item::{MediaKind, TransferItem};

use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

#[derive(Debug)]
struct Shared {
    sender: Mutex<Option<mpsc::Sender<TransferItem>>>,
    receiver: Mutex<Option<mpsc::Receiver<TransferItem>>>,
    closed: CancellationToken,
}

/// Producer side of a bounded FIFO of [`TransferItem`]s.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    shared: Arc<Shared>,
}

impl WorkQueue {
    /// Creates a queue holding at most `capacity` pending items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                sender: Mutex::new(Some(tx)),
                receiver: Mutex::new(Some(rx)),
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Appends an item, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the queue was closed before or while waiting,
    /// or if the drain was dropped.
    #[instrument(skip(self, item), fields(id = item.id()))]
    pub async fn push(&self, item: TransferItem) -> Result<(), QueueError> {
        let sender = self
            .shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(QueueError::Closed)?;
        let permit = tokio::select! {
            biased;
            () = self.shared.closed.cancelled() => return Err(QueueError::Closed),
            permit = sender.reserve() => permit.map_err(|_| QueueError::Closed)?,
        };
        // close() takes this lock, so the item lands strictly before or not at all
        let open = self.shared.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if open.is_none() {
            return Err(QueueError::Closed);
        }
        permit.send(item);
        Ok(())
    }

    /// Stops accepting new items. Idempotent.
    pub fn close(&self) {
        let dropped = {
            let mut sender = self.shared.sender.lock().unwrap_or_else(PoisonError::into_inner);
            self.shared.closed.cancel();
            sender.take()
        };
        if dropped.is_some() {
            debug!("work queue closed");
        }
    }

    /// Whether [`Self::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Takes the consumer side. Returns `None` after the first call.
    #[must_use]
    pub fn drain(&self) -> Option<QueueDrain> {
        self.shared
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|rx| QueueDrain { rx })
    }
}

/// Consumer side of a [`WorkQueue`].
///
/// Ends once the queue is closed, every producer push has finished, and all queued
/// items have been yielded.
#[derive(Debug)]
pub struct QueueDrain {
    rx: mpsc::Receiver<TransferItem>,
}

impl QueueDrain {
    /// Receives the next item.
    pub async fn next(&mut self) -> Option<TransferItem> {
        self.rx.recv().await
    }
}

impl Stream for QueueDrain {
    type Item = TransferItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;

    fn item(id: &str) -> TransferItem {
        TransferItem::new(
            "https://blog.example/",
            format!("https://media.example/{id}.jpg"),
            id,
            MediaKind::Image,
            0,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_items_are_fifo_and_survive_close() {
        let queue = WorkQueue::new(8);
        let drain = queue.drain().unwrap();
        for id in ["a", "b", "c"] {
            queue.push(item(id)).await.unwrap();
        }
        queue.close();
        let ids: Vec<String> = drain.map(|i| i.id().to_string()).collect().await;
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_push_after_close_fails() {
        let queue = WorkQueue::new(1);
        queue.close();
        queue.close();
        assert!(queue.is_closed());
        assert!(matches!(queue.push(item("a")).await, Err(QueueError::Closed)));
    }

    #[tokio::test]
    async fn test_drain_is_taken_once() {
        let queue = WorkQueue::new(1);
        assert!(queue.drain().is_some());
        assert!(queue.drain().is_none());
    }

    #[tokio::test]
    async fn test_full_queue_applies_backpressure() {
        let queue = WorkQueue::new(1);
        let mut drain = queue.drain().unwrap();
        queue.push(item("a")).await.unwrap();

        let producer = queue.clone();
        let blocked = tokio::spawn(async move { producer.push(item("b")).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        assert_eq!(drain.next().await.unwrap().id(), "a");
        blocked.await.unwrap().unwrap();
        assert_eq!(drain.next().await.unwrap().id(), "b");
    }

    #[tokio::test]
    async fn test_close_rejects_push_waiting_for_space() {
        let queue = WorkQueue::new(1);
        let drain = queue.drain().unwrap();
        queue.push(item("a")).await.unwrap();

        let producer = queue.clone();
        let blocked = tokio::spawn(async move { producer.push(item("b")).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        queue.close();
        assert!(matches!(blocked.await.unwrap(), Err(QueueError::Closed)));
        let ids: Vec<String> = drain.map(|i| i.id().to_string()).collect().await;
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn test_dropped_drain_closes_producers() {
        let queue = WorkQueue::new(1);
        drop(queue.drain());
        assert!(matches!(queue.push(item("a")).await, Err(QueueError::Closed)));
    }
}
