//! Resumable single-file transfer.
//!
//! [`FileDownloader::fetch`] treats the bytes already on disk as the resume offset,
//! asks the server for the remainder with a `Range` request and appends it. A file
//! whose length already matches the remote size is left alone after a HEAD check.

use std::io::ErrorKind;
use std::path::Path;

use futures_util::StreamExt;
use reqwest::{Method, StatusCode};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::progress::{ProgressSink, RateMeter};
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use super::DownloadError;
use crate::config::AppSettings;
use crate::queue::TransferItem;
use crate::transport::{
    ByteStream, HttpClient, RequestOptions, TransportError, header_content_length,
};

/// How a successful fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Bytes were transferred; `bytes` is the final file length.
    Completed {
        /// Final file length.
        bytes: u64,
        /// Whether the last attempt continued from a non-zero offset.
        resumed: bool,
    },
    /// The local file already held the whole remote file.
    AlreadyComplete {
        /// Local file length.
        bytes: u64,
    },
}

/// Fetches media files to disk with resume, retry and cancellation.
#[derive(Debug, Clone)]
pub struct FileDownloader {
    client: HttpClient,
    retry_policy: RetryPolicy,
    buffer_size: usize,
    cancel: CancellationToken,
    progress: Option<ProgressSink>,
}

impl FileDownloader {
    /// Creates a downloader using the settings' retry cap, backoff base and buffer size.
    #[must_use]
    pub fn new(client: HttpClient, settings: &AppSettings, cancel: CancellationToken) -> Self {
        Self {
            client,
            retry_policy: RetryPolicy::with_attempts_and_base(
                settings.max_number_of_retries,
                settings.retry_base_delay(),
            ),
            buffer_size: settings.buffer_size(),
            cancel,
            progress: None,
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Publishes progress snapshots to `sink`.
    #[must_use]
    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    /// The retry policy in use.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Downloads `item` into `dest`, resuming from whatever is already there.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::Cancelled`] when the token fires before completion
    /// - [`DownloadError::FileConflict`] when another writer holds `dest`
    /// - [`DownloadError::RetriesExhausted`] when every attempt failed transiently;
    ///   the partial file is kept for the next run
    /// - [`DownloadError::Transport`] or [`DownloadError::Io`] for fatal failures
    #[instrument(skip(self, item), fields(id = item.id(), url = item.url(), dest = %dest.display()))]
    pub async fn fetch(&self, item: &TransferItem, dest: &Path) -> Result<FetchOutcome, DownloadError> {
        let url = item.url();
        let existing = existing_length(dest).await?;
        if existing > 0
            && let Some(total) = self.remote_size(url).await
            && total <= existing
        {
            debug!(existing, total, "local file already complete");
            return Ok(FetchOutcome::AlreadyComplete { bytes: existing });
        }
        if self.cancel.is_cancelled() {
            return Err(DownloadError::cancelled(url));
        }

        let file = open_locked(dest, existing > 0).await?;
        let mut writer = BufWriter::with_capacity(self.buffer_size, file);
        let mut offset = existing;
        let mut attempts = self.retry_policy.start();

        while let Some(attempt) = attempts.next_attempt() {
            if self.cancel.is_cancelled() {
                return Err(DownloadError::cancelled(url));
            }
            let error = match self.attempt(item, dest, &mut writer, &mut offset).await {
                Ok((bytes, resumed)) => return Ok(FetchOutcome::Completed { bytes, resumed }),
                Err(error) => error,
            };

            let failure = classify_error(&error);
            match self.retry_policy.should_retry(failure, attempt) {
                RetryDecision::Retry { delay, .. } => {
                    warn!(attempt, offset, error = %error, delay_ms = delay.as_millis(), "transfer attempt failed, retrying");
                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => return Err(DownloadError::cancelled(url)),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(attempt, %reason, "not retrying");
                    if failure == FailureType::Transient {
                        return Err(DownloadError::retries_exhausted(url, attempt, &error));
                    }
                    return Err(error);
                }
            }
        }

        Err(DownloadError::RetriesExhausted {
            url: url.to_string(),
            attempts: attempts.attempts(),
            last: "attempt cap reached".to_string(),
        })
    }

    /// One ranged GET streamed into `writer`. Returns the final length and whether the
    /// body continued a non-empty file.
    async fn attempt(
        &self,
        item: &TransferItem,
        dest: &Path,
        writer: &mut BufWriter<File>,
        offset: &mut u64,
    ) -> Result<(u64, bool), DownloadError> {
        let url = item.url();
        let _slot = self
            .client
            .acquire_connection()
            .await
            .map_err(DownloadError::Transport)?;
        let mut options = RequestOptions::default().with_header("accept-encoding", "identity");
        if *offset > 0 {
            options = options.with_header("range", format!("bytes={offset}-"));
        }
        let request = self
            .client
            .request(Method::GET, url, &options)
            .map_err(DownloadError::Transport)?;
        let response = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(DownloadError::cancelled(url)),
            response = self.client.execute(request, url) => response.map_err(DownloadError::Transport)?,
        };

        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE && *offset > 0 {
            debug!(offset, "range past end of remote file");
            return Ok((*offset, true));
        }
        if !status.is_success() {
            return Err(DownloadError::Transport(TransportError::status(url, status.as_u16())));
        }
        if *offset > 0 && status != StatusCode::PARTIAL_CONTENT {
            debug!(offset, "server ignored range, restarting from zero");
            writer.flush().await.map_err(|e| DownloadError::io(dest, e))?;
            writer
                .get_mut()
                .set_len(0)
                .await
                .map_err(|e| DownloadError::io(dest, e))?;
            *offset = 0;
        }

        let resumed = *offset > 0;
        let total = header_content_length(&response).map(|remaining| *offset + remaining);
        let mut stream = self.client.wrap_for_bandwidth(self.client.body_stream(response, url));
        let meter = RateMeter::start(*offset);

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    flush(writer, dest).await?;
                    return Err(DownloadError::cancelled(url));
                }
                next = stream.next() => next,
            };
            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                None => break,
                Some(Err(e)) => {
                    flush(writer, dest).await?;
                    return Err(DownloadError::Transport(e));
                }
            };
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(dest, e))?;
            *offset += chunk.len() as u64;
            if let Some(sink) = &self.progress {
                sink.report(item.id(), meter.snapshot(*offset, total));
            }
        }

        flush(writer, dest).await?;
        match total {
            Some(expected) if *offset < expected => Err(DownloadError::incomplete(url, expected, *offset)),
            _ => Ok((*offset, resumed)),
        }
    }

    async fn remote_size(&self, url: &str) -> Option<u64> {
        match self.client.content_length(url, &RequestOptions::default()).await {
            Ok(size) => size,
            Err(e) => {
                debug!(error = %e, "size check failed, transferring anyway");
                None
            }
        }
    }

    /// Opens `url` as a throttled byte stream, or `None` for a non-success status.
    ///
    /// The connection slot is only held while the response headers are awaited.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Transport`] when the request cannot be sent.
    #[instrument(skip(self))]
    pub async fn fetch_to_memory(&self, url: &str) -> Result<Option<ByteStream>, DownloadError> {
        let response = {
            let _slot = self
                .client
                .acquire_connection()
                .await
                .map_err(DownloadError::Transport)?;
            let request = self
                .client
                .request(Method::GET, url, &RequestOptions::default())
                .map_err(DownloadError::Transport)?;
            self.client
                .execute(request, url)
                .await
                .map_err(DownloadError::Transport)?
        };
        if !response.status().is_success() {
            debug!(status = response.status().as_u16(), "fetch to memory got non-success status");
            return Ok(None);
        }
        Ok(Some(self.client.wrap_for_bandwidth(self.client.body_stream(response, url))))
    }

    /// Writes a whole stream to `path`, replacing any existing file. Returns bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] for filesystem failures and
    /// [`DownloadError::Transport`] when the stream fails.
    pub async fn persist_stream_to_file(mut stream: ByteStream, path: &Path) -> Result<u64, DownloadError> {
        let file = File::create(path).await.map_err(|e| DownloadError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(DownloadError::Transport)?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(path, e))?;
            written += chunk.len() as u64;
        }
        flush(&mut writer, path).await?;
        Ok(written)
    }
}

async fn existing_length(dest: &Path) -> Result<u64, DownloadError> {
    match tokio::fs::metadata(dest).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(DownloadError::io(dest, e)),
    }
}

/// Opens `dest` for appending and takes an exclusive advisory lock on it.
async fn open_locked(dest: &Path, resume: bool) -> Result<File, DownloadError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dest)
        .await
        .map_err(|e| DownloadError::io(dest, e))?;
    let std_file = file.into_std().await;
    fs2::FileExt::try_lock_exclusive(&std_file).map_err(|e| DownloadError::file_conflict(dest, e))?;
    let file = File::from_std(std_file);
    if !resume {
        file.set_len(0).await.map_err(|e| DownloadError::io(dest, e))?;
    }
    Ok(file)
}

async fn flush(writer: &mut BufWriter<File>, dest: &Path) -> Result<(), DownloadError> {
    writer.flush().await.map_err(|e| DownloadError::io(dest, e))
}
