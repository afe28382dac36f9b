//! Bandwidth throttling for response byte streams.
//!
//! A global budget of `bandwidth_kb_per_sec` is divided evenly across the configured
//! number of connections, and every throttled stream is held to that share. The
//! division uses the configured connection count, not the number of transfers that
//! happen to be active, so the aggregate stays within budget when every slot is busy.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use tokio::time::{Instant, Sleep};

use super::TransportError;

/// Byte stream produced by the transport layer.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Global bandwidth budget and the connection count it is shared by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleBudget {
    bandwidth_kb_per_sec: u64,
    concurrent_connections: u32,
}

impl ThrottleBudget {
    /// Creates a budget of `bandwidth_kb_per_sec` KiB/s shared by `concurrent_connections`.
    #[must_use]
    pub fn new(bandwidth_kb_per_sec: u64, concurrent_connections: u32) -> Self {
        Self {
            bandwidth_kb_per_sec,
            concurrent_connections: concurrent_connections.max(1),
        }
    }

    /// A budget that never throttles.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(0, 1)
    }

    /// Whether throttling is disabled.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.bandwidth_kb_per_sec == 0
    }

    /// Bytes per second allowed for a single stream, or `None` when unlimited.
    #[must_use]
    pub fn per_stream_bytes_per_sec(&self) -> Option<u64> {
        if self.is_unlimited() {
            return None;
        }
        let rate = self.bandwidth_kb_per_sec * 1024 / u64::from(self.concurrent_connections);
        Some(rate.max(1))
    }

    /// Wraps `stream` so it never exceeds this budget's per-stream share.
    ///
    /// Returns the stream unchanged when no bandwidth limit is configured.
    #[must_use]
    pub fn wrap(&self, stream: ByteStream) -> ByteStream {
        match self.per_stream_bytes_per_sec() {
            Some(rate) => ThrottledStream::new(stream, rate).boxed(),
            None => stream,
        }
    }
}

/// Stream adapter that delays reads so the average rate stays at `bytes_per_sec`.
///
/// Each chunk is passed through as soon as it arrives; the *next* read is postponed
/// until the bytes seen so far fit the rate.
pub struct ThrottledStream {
    inner: ByteStream,
    bytes_per_sec: u64,
    started: Instant,
    consumed: u64,
    delay: Option<Pin<Box<Sleep>>>,
}

impl ThrottledStream {
    /// Wraps `inner`, limiting it to `bytes_per_sec`.
    #[must_use]
    pub fn new(inner: ByteStream, bytes_per_sec: u64) -> Self {
        Self {
            inner,
            bytes_per_sec: bytes_per_sec.max(1),
            started: Instant::now(),
            consumed: 0,
            delay: None,
        }
    }

    /// The enforced rate.
    #[must_use]
    pub fn bytes_per_sec(&self) -> u64 {
        self.bytes_per_sec
    }

    #[allow(clippy::cast_precision_loss)]
    fn schedule_next_read(&mut self) {
        let due = Duration::from_secs_f64(self.consumed as f64 / self.bytes_per_sec as f64);
        let deadline = self.started + due;
        if deadline > Instant::now() {
            self.delay = Some(Box::pin(tokio::time::sleep_until(deadline)));
        }
    }
}

impl Stream for ThrottledStream {
    type Item = Result<Bytes, TransportError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(delay) = this.delay.as_mut() {
            ready!(delay.as_mut().poll(cx));
            this.delay = None;
        }

        let item = ready!(this.inner.poll_next_unpin(cx));
        if let Some(Ok(chunk)) = &item {
            this.consumed += chunk.len() as u64;
            this.schedule_next_read();
        }
        Poll::Ready(item)
    }
}

/// Fails `stream` with [`TransportError::Timeout`] when a single read from it takes
/// longer than `timeout`.
///
/// Apply this before [`ThrottleBudget::wrap`] so pacing delays never count as a stalled
/// read. The stream ends after the timeout error.
#[must_use]
pub fn with_read_timeout(stream: ByteStream, timeout: Duration, url: &str) -> ByteStream {
    let url = url.to_string();
    futures_util::stream::unfold(Some(stream), move |state| {
        let url = url.clone();
        async move {
            let mut inner = state?;
            match tokio::time::timeout(timeout, inner.next()).await {
                Ok(Some(item)) => Some((item, Some(inner))),
                Ok(None) => None,
                Err(_) => Some((Err(TransportError::timeout(url)), None)),
            }
        }
    })
    .boxed()
}

impl std::fmt::Debug for ThrottledStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottledStream")
            .field("bytes_per_sec", &self.bytes_per_sec)
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunks(count: usize, size: usize) -> ByteStream {
        stream::iter((0..count).map(move |_| Ok(Bytes::from(vec![0_u8; size])))).boxed()
    }

    #[test]
    fn test_per_stream_rate_is_budget_divided_by_connections() {
        let budget = ThrottleBudget::new(1000, 4);
        assert_eq!(budget.per_stream_bytes_per_sec(), Some(1000 * 1024 / 4));

        let single = ThrottleBudget::new(512, 1);
        assert_eq!(single.per_stream_bytes_per_sec(), Some(512 * 1024));
    }

    #[test]
    fn test_zero_bandwidth_is_unlimited() {
        let budget = ThrottleBudget::new(0, 8);
        assert!(budget.is_unlimited());
        assert_eq!(budget.per_stream_bytes_per_sec(), None);
        assert_eq!(ThrottleBudget::unlimited().per_stream_bytes_per_sec(), None);
    }

    #[test]
    fn test_zero_connections_treated_as_one() {
        let budget = ThrottleBudget::new(10, 0);
        assert_eq!(budget.per_stream_bytes_per_sec(), Some(10 * 1024));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_wrap_passes_stream_through_without_delay() {
        let start = Instant::now();
        let collected: Vec<_> = ThrottleBudget::unlimited()
            .wrap(chunks(8, 1024))
            .collect()
            .await;
        assert_eq!(collected.len(), 8);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_delay_does_not_trip_read_timeout() {
        // 2 KiB/s with a one second read timeout; the 8 KiB chunk forces a 4s pause
        let budget = ThrottleBudget::new(2, 1);
        let timed = with_read_timeout(chunks(2, 8192), Duration::from_secs(1), "https://m.example/a.bin");
        let start = Instant::now();
        let collected: Vec<_> = budget.wrap(timed).collect().await;
        assert_eq!(collected.len(), 2);
        assert!(collected.iter().all(Result::is_ok));
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_read_times_out_once() {
        let stalled: ByteStream = stream::iter([Ok(Bytes::from_static(b"ab"))])
            .chain(stream::pending())
            .boxed();
        let collected: Vec<_> = with_read_timeout(stalled, Duration::from_secs(1), "https://m.example/a.bin")
            .collect()
            .await;
        assert_eq!(collected.len(), 2);
        assert!(collected[0].is_ok());
        assert!(matches!(collected[1], Err(TransportError::Timeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_stream_holds_average_rate() {
        // 1 KiB/s across one connection; four 1 KiB chunks need at least three seconds
        let budget = ThrottleBudget::new(1, 1);
        let start = Instant::now();
        let collected: Vec<_> = budget.wrap(chunks(4, 1024)).collect().await;
        assert_eq!(collected.len(), 4);
        assert!(collected.iter().all(Result::is_ok));
        assert!(
            start.elapsed() >= Duration::from_secs(3),
            "elapsed {:?}",
            start.elapsed()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_stream_forwards_errors() {
        let inner = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(TransportError::timeout("https://example.com")),
        ])
        .boxed();
        let mut throttled = ThrottledStream::new(inner, 1024);
        assert!(throttled.next().await.unwrap().is_ok());
        assert!(matches!(
            throttled.next().await.unwrap(),
            Err(TransportError::Timeout { .. })
        ));
        assert!(throttled.next().await.is_none());
    }
}
