//! Generic upload hosts that serve files straight from a short id.

use async_trait::async_trait;
use regex::Regex;

use super::{ExtractError, ExtractedMedia, HostExtractor, HostKind, MediaVariant};
use crate::queue::MediaKind;

const VARIANTS: &[MediaVariant] = &[MediaVariant::Any, MediaVariant::Mp4, MediaVariant::Webm];

/// Extracts `<id>.<ext>` links from a pomf-style file host.
#[derive(Debug, Clone)]
pub struct FileHostExtractor {
    host: HostKind,
    canonical_base: &'static str,
    pattern: Regex,
}

impl FileHostExtractor {
    fn build(host: HostKind, domain: &str, canonical_base: &'static str) -> Self {
        let pattern = format!(
            r"https?://(?:[\w-]+\.)?{}/([A-Za-z0-9_-]+)\.([A-Za-z0-9]+)",
            regex::escape(domain)
        );
        #[allow(clippy::expect_used)]
        let pattern = Regex::new(&pattern).expect("file host regex is valid");
        Self {
            host,
            canonical_base,
            pattern,
        }
    }

    /// mixtape.moe
    #[must_use]
    pub fn mixtape() -> Self {
        Self::build(HostKind::Mixtape, "mixtape.moe", "https://my.mixtape.moe/")
    }

    /// uguu.se
    #[must_use]
    pub fn uguu() -> Self {
        Self::build(HostKind::Uguu, "uguu.se", "https://a.uguu.se/")
    }

    /// safe.moe
    #[must_use]
    pub fn safe_moe() -> Self {
        Self::build(HostKind::SafeMoe, "safe.moe", "https://a.safe.moe/")
    }

    /// lolisafe.moe
    #[must_use]
    pub fn lolisafe() -> Self {
        Self::build(HostKind::LoliSafe, "lolisafe.moe", "https://i.lolisafe.moe/")
    }

    /// catbox.moe
    #[must_use]
    pub fn catbox() -> Self {
        Self::build(HostKind::CatBox, "catbox.moe", "https://files.catbox.moe/")
    }
}

#[async_trait]
impl HostExtractor for FileHostExtractor {
    fn host(&self) -> HostKind {
        self.host
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
        Ok(self
            .pattern
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?.as_str();
                let id = caps.get(1)?.as_str();
                let url = match variant {
                    MediaVariant::Mp4 => format!("{}{id}.mp4", self.canonical_base),
                    MediaVariant::Webm => format!("{}{id}.webm", self.canonical_base),
                    _ => whole.to_string(),
                };
                Some(ExtractedMedia {
                    url,
                    origin_url: whole.to_string(),
                    id: id.to_string(),
                    kind: MediaKind::ExternalVideo,
                })
            })
            .collect())
    }
}
