//! imgur.com direct links.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::{ExtractError, ExtractedMedia, HostExtractor, HostKind, MediaVariant};
use crate::queue::MediaKind;

#[allow(clippy::expect_used)]
static IMGUR_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:i\.|m\.|www\.)?imgur\.com/([A-Za-z0-9]{5,8})(?:\.(jpe?g|png|gifv?|mp4|webm))?\b")
        .expect("imgur regex is valid")
});

const VARIANTS: &[MediaVariant] = &[
    MediaVariant::Any,
    MediaVariant::Mp4,
    MediaVariant::Gif,
    MediaVariant::Webm,
];

/// Finds imgur image links and rewrites them to the direct `i.imgur.com` host.
///
/// Album and gallery links (`/a/..`, `/gallery/..`) are skipped.
#[derive(Debug, Clone, Default)]
pub struct ImgurExtractor;

impl ImgurExtractor {
    /// Creates the extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn extension_for(found: Option<&str>, variant: MediaVariant) -> &'static str {
    match variant {
        MediaVariant::Mp4 => "mp4",
        MediaVariant::Gif => "gif",
        MediaVariant::Webm => "webm",
        _ => match found.map(str::to_ascii_lowercase).as_deref() {
            Some("png") => "png",
            Some("gif") => "gif",
            Some("gifv" | "mp4") => "mp4",
            Some("webm") => "webm",
            _ => "jpg",
        },
    }
}

#[async_trait]
impl HostExtractor for ImgurExtractor {
    fn host(&self) -> HostKind {
        HostKind::Imgur
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
        let mut found = Vec::new();
        for caps in IMGUR_LINK.captures_iter(text) {
            let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if text[whole.end()..].starts_with('/') {
                continue;
            }
            let ext = extension_for(caps.get(2).map(|m| m.as_str()), variant);
            let kind = if matches!(ext, "mp4" | "webm") {
                MediaKind::ExternalVideo
            } else {
                MediaKind::ExternalImage
            };
            found.push(ExtractedMedia {
                url: format!("https://i.imgur.com/{}.{ext}", id.as_str()),
                origin_url: whole.as_str().to_string(),
                id: id.as_str().to_string(),
                kind,
            });
        }
        Ok(found)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_direct_link_keeps_extension() {
        let found = ImgurExtractor::new()
            .search("look https://i.imgur.com/AbCd123.png here", MediaVariant::Any)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "https://i.imgur.com/AbCd123.png");
        assert_eq!(found[0].id, "AbCd123");
        assert_eq!(found[0].kind, MediaKind::ExternalImage);
    }

    #[tokio::test]
    async fn test_gifv_resolves_to_mp4() {
        let found = ImgurExtractor::new()
            .search("https://imgur.com/XyZ12.gifv", MediaVariant::Any)
            .await
            .unwrap();
        assert_eq!(found[0].url, "https://i.imgur.com/XyZ12.mp4");
        assert_eq!(found[0].kind, MediaKind::ExternalVideo);
    }

    #[tokio::test]
    async fn test_page_link_defaults_to_jpg_and_variant_forces_extension() {
        let text = "https://imgur.com/QwErT";
        let any = ImgurExtractor::new().search(text, MediaVariant::Any).await.unwrap();
        assert_eq!(any[0].url, "https://i.imgur.com/QwErT.jpg");
        let gif = ImgurExtractor::new().search(text, MediaVariant::Gif).await.unwrap();
        assert_eq!(gif[0].url, "https://i.imgur.com/QwErT.gif");
    }

    #[tokio::test]
    async fn test_album_links_are_skipped() {
        let found = ImgurExtractor::new()
            .search("https://imgur.com/a/abcde and https://imgur.com/gallery/fghij", MediaVariant::Any)
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_poster_is_unsupported() {
        assert!(ImgurExtractor::new()
            .search("", MediaVariant::Poster)
            .await
            .is_err());
    }
}
