//! Error types for host extractors.

use thiserror::Error;

use super::{HostKind, MediaVariant};
use crate::transport::TransportError;

/// Errors raised by host extractors.
///
/// An empty match set is not an error.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The host cannot serve the requested variant. Fatal configuration error.
    #[error("{host} does not support the '{variant}' variant")]
    UnsupportedVariant {
        /// The host asked.
        host: HostKind,
        /// The rejected variant.
        variant: MediaVariant,
    },

    /// A metadata lookup timed out.
    #[error("{host} lookup for '{id}' timed out")]
    Timeout {
        /// The host being queried.
        host: HostKind,
        /// The matched identifier.
        id: String,
    },

    /// A metadata lookup failed for another reason.
    #[error("{host} lookup for '{id}' failed: {source}")]
    Lookup {
        /// The host being queried.
        host: HostKind,
        /// The matched identifier.
        id: String,
        /// The transport failure.
        #[source]
        source: TransportError,
    },

    /// A lookup answered with a document missing the requested rendition.
    #[error("{host} lookup for '{id}' returned an unusable response: {reason}")]
    MalformedResponse {
        /// The host being queried.
        host: HostKind,
        /// The matched identifier.
        id: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl ExtractError {
    /// Creates a lookup error, keeping timeouts distinct.
    pub fn lookup(host: HostKind, id: impl Into<String>, source: TransportError) -> Self {
        let id = id.into();
        if matches!(source, TransportError::Timeout { .. }) {
            Self::Timeout { host, id }
        } else {
            Self::Lookup { host, id, source }
        }
    }

    /// Whether the error must abort the run rather than be isolated.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnsupportedVariant { .. })
    }
}
