//! Error types for the transport layer.

use std::error::Error as _;

use thiserror::Error;

/// Errors raised while building or sending requests and reading responses.
///
/// [`TransportError::is_retryable`] separates transient network conditions from
/// configuration mistakes and server answers that another attempt would not change.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The URL could not be parsed or is not http(s).
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
    },

    /// A configured header name or value is not valid HTTP.
    #[error("invalid header '{name}'")]
    InvalidHeader {
        /// The rejected header name.
        name: String,
    },

    /// The HTTP client (proxy, TLS backend) could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// No response or body chunk arrived within the configured timeout.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The connection was closed or reset before the exchange completed.
    #[error("connection closed while requesting {url}: {source}")]
    ConnectionClosed {
        /// The URL being read.
        url: String,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The connection could not be established.
    #[error("failed to connect for {url}: {source}")]
    Connect {
        /// The URL being requested.
        url: String,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// Any other network-level failure.
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL being requested.
        url: String,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The server demands authentication (401, 403, 407).
    #[error("[AUTH] authentication required (HTTP {status}) requesting {url}")]
    AuthRequired {
        /// The URL that was rejected.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The connection limiter was shut down.
    #[error("connection limiter closed")]
    LimiterClosed,
}

impl TransportError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a status error, promoting authentication statuses to [`Self::AuthRequired`].
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        if matches!(status, 401 | 403 | 407) {
            Self::AuthRequired {
                url: url.into(),
                status,
            }
        } else {
            Self::HttpStatus {
                url: url.into(),
                status,
            }
        }
    }

    /// Classifies a reqwest error raised for `url`.
    pub fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        let url = url.to_string();
        if source.is_timeout() {
            Self::Timeout { url }
        } else if source.is_connect() {
            Self::Connect { url, source }
        } else if source.is_body() || is_connection_closed(&source) {
            Self::ConnectionClosed { url, source }
        } else if source.is_builder() {
            Self::InvalidUrl { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Whether another attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ConnectionClosed { .. } | Self::Connect { .. }
        )
    }

    /// Whether the error stems from configuration rather than the network.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl { .. } | Self::InvalidHeader { .. } | Self::Client { .. }
        )
    }
}

/// Walks the source chain looking for a reset/closed connection.
fn is_connection_closed(error: &reqwest::Error) -> bool {
    let mut current = error.source();
    while let Some(inner) = current {
        if let Some(io) = inner.downcast_ref::<std::io::Error>()
            && matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            )
        {
            return true;
        }
        let text = inner.to_string().to_lowercase();
        if text.contains("connection closed") || text.contains("incomplete message") {
            return true;
        }
        current = inner.source();
    }
    false
}
