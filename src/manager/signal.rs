//! Pause signal shared by a job's crawler and download engine.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Level-triggered pause flag.
///
/// Independent of cancellation: a paused job can still be cancelled, and waiters
/// wake on either.
#[derive(Debug, Clone)]
pub struct PauseToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for PauseToken {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseToken {
    /// Creates an unpaused token.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Sets the pause flag.
    pub fn pause(&self) {
        self.tx.send_replace(true);
    }

    /// Clears the pause flag and wakes waiters.
    pub fn resume(&self) {
        self.tx.send_replace(false);
    }

    /// Whether the flag is set.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    /// Waits until the flag clears or `cancel` fires.
    ///
    /// Returns `true` if the caller may continue, `false` if it was cancelled.
    pub async fn wait_while_paused(&self, cancel: &CancellationToken) -> bool {
        let mut rx = self.tx.subscribe();
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            res = rx.wait_for(|paused| !*paused) => res.is_ok() && !cancel.is_cancelled(),
        }
    }
}
