//! webmshare.com links.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::{ExtractError, ExtractedMedia, HostExtractor, HostKind, MediaVariant};
use crate::queue::MediaKind;

#[allow(clippy::expect_used)]
static WEBMSHARE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:www\.)?webmshare\.com/(?:play/|download-webm/)?([A-Za-z0-9]{4})\b")
        .expect("webmshare regex is valid")
});

const VARIANTS: &[MediaVariant] = &[MediaVariant::Any, MediaVariant::Webm, MediaVariant::Mp4];

/// Finds webmshare links and maps them to the direct file server.
///
/// Repeated links yield repeated items; deduplication happens at download time.
#[derive(Debug, Clone, Default)]
pub struct WebmshareExtractor;

impl WebmshareExtractor {
    /// Creates the extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostExtractor for WebmshareExtractor {
    fn host(&self) -> HostKind {
        HostKind::Webmshare
    }

    fn supported_variants(&self) -> &'static [MediaVariant] {
        VARIANTS
    }

    async fn search(
        &self,
        text: &str,
        variant: MediaVariant,
    ) -> Result<Vec<ExtractedMedia>, ExtractError> {
        self.ensure_supported(variant)?;
        Ok(WEBMSHARE_LINK
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                if text[whole.end()..].starts_with('/') {
                    return None;
                }
                let id = caps.get(1)?.as_str();
                let url = match variant {
                    MediaVariant::Mp4 => format!("https://s1.webmshare.com/f/{id}.mp4"),
                    _ => format!("https://s1.webmshare.com/{id}.webm"),
                };
                Some(ExtractedMedia {
                    url,
                    origin_url: whole.as_str().to_string(),
                    id: id.to_string(),
                    kind: MediaKind::ExternalVideo,
                })
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_play_link_resolves_to_mp4() {
        let found = WebmshareExtractor::new()
            .search("watch https://webmshare.com/play/ab12 now", MediaVariant::Mp4)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "ab12");
        assert_eq!(found[0].url, "https://s1.webmshare.com/f/ab12.mp4");
        assert_eq!(found[0].origin_url, "https://webmshare.com/play/ab12");
    }

    #[tokio::test]
    async fn test_duplicate_links_are_kept() {
        let text = "https://webmshare.com/play/ab12 and again https://webmshare.com/play/ab12";
        let found = WebmshareExtractor::new()
            .search(text, MediaVariant::Mp4)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], found[1]);
    }

    #[tokio::test]
    async fn test_webm_variant_and_bare_link() {
        let found = WebmshareExtractor::new()
            .search("https://www.webmshare.com/Zz09", MediaVariant::Webm)
            .await
            .unwrap();
        assert_eq!(found[0].url, "https://s1.webmshare.com/Zz09.webm");
    }

    #[tokio::test]
    async fn test_longer_ids_do_not_match() {
        let found = WebmshareExtractor::new()
            .search("https://webmshare.com/play/abcdef", MediaVariant::Any)
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_gif_variant_is_unsupported() {
        assert!(WebmshareExtractor::new()
            .search("https://webmshare.com/play/ab12", MediaVariant::Gif)
            .await
            .is_err());
    }
}
