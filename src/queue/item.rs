//! The unit of work handed from the crawler to the downloader.

use std::fmt;

use url::Url;

use super::QueueError;
use crate::download::destination_file_name;

/// Logical kind of a media reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Image on the platform's media servers.
    Image,
    /// Video on the platform's media servers.
    Video,
    /// Image on a third-party host.
    ExternalImage,
    /// Video on a third-party host.
    ExternalVideo,
    /// Any other third-party file.
    ExternalFile,
}

impl MediaKind {
    /// Stable lowercase name for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::ExternalImage => "external_image",
            Self::ExternalVideo => "external_video",
            Self::ExternalFile => "external_file",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One media file to download.
///
/// Constructed only through [`TransferItem::new`], so every queued item carries an
/// absolute http(s) URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferItem {
    origin_url: String,
    url: String,
    id: String,
    kind: MediaKind,
    timestamp: i64,
}

impl TransferItem {
    /// Validates and builds an item.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidItem`] when `url` is not an absolute http(s) URL,
    /// still contains template placeholders, or `id` is empty.
    pub fn new(
        origin_url: impl Into<String>,
        url: impl Into<String>,
        id: impl Into<String>,
        kind: MediaKind,
        timestamp: i64,
    ) -> Result<Self, QueueError> {
        let url = url.into();
        let id = id.into();
        if url.contains('{') || url.contains('}') {
            return Err(QueueError::invalid(&url, "unresolved placeholder"));
        }
        let parsed = Url::parse(&url).map_err(|_| QueueError::invalid(&url, "not a valid URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(QueueError::invalid(&url, "scheme must be http or https"));
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(QueueError::invalid(&url, "missing host"));
        }
        if id.trim().is_empty() {
            return Err(QueueError::invalid(&url, "empty id"));
        }
        Ok(Self {
            origin_url: origin_url.into(),
            url,
            id,
            kind,
            timestamp,
        })
    }

    /// Where the reference was found.
    #[must_use]
    pub fn origin_url(&self) -> &str {
        &self.origin_url
    }

    /// Resolved URL to fetch.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Identifier used as the local filename stem.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Media kind.
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Post timestamp, seconds since the epoch.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// File name this item is stored under inside its blog directory.
    #[must_use]
    pub fn file_name(&self) -> String {
        destination_file_name(&self.id, &self.url, self.kind)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn item(url: &str) -> Result<TransferItem, QueueError> {
        TransferItem::new("https://blog.example/post/1", url, "abc", MediaKind::Image, 1_500_000_000)
    }

    #[test]
    fn test_valid_item_exposes_fields() {
        let item = item("https://media.example/abc_1280.jpg").unwrap();
        assert_eq!(item.url(), "https://media.example/abc_1280.jpg");
        assert_eq!(item.origin_url(), "https://blog.example/post/1");
        assert_eq!(item.id(), "abc");
        assert_eq!(item.kind(), MediaKind::Image);
        assert_eq!(item.timestamp(), 1_500_000_000);
        assert_eq!(item.file_name(), "abc.jpg");
    }

    #[test]
    fn test_relative_and_non_http_urls_rejected() {
        assert!(matches!(item("/abc.jpg"), Err(QueueError::InvalidItem { .. })));
        assert!(matches!(item("ftp://media.example/abc.jpg"), Err(QueueError::InvalidItem { .. })));
        assert!(matches!(item("data:image/png;base64,AAAA"), Err(QueueError::InvalidItem { .. })));
    }

    #[test]
    fn test_placeholder_urls_rejected() {
        let err = item("https://media.example/{id}.jpg").unwrap_err();
        assert!(err.to_string().contains("placeholder"));
    }

    #[test]
    fn test_empty_id_rejected() {
        let err = TransferItem::new("", "https://media.example/a.jpg", " ", MediaKind::Image, 0)
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidItem { reason: "empty id", .. }));
    }
}
