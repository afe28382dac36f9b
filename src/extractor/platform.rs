//! Media hosted on the platform's own servers.

use async_trait::async_trait;
use regex::Regex;

use super::size::strip_size_token;
use super::{ExtractError, ExtractedMedia, HostExtractor, HostKind, MediaVariant, file_stem_and_extension};
use crate::config::ConfigError;
use crate::queue::MediaKind;

const VARIANTS: &[MediaVariant] = &[MediaVariant::Any];

/// Finds image and video URLs on the platform's media hosts.
#[derive(Debug, Clone)]
pub struct PlatformMediaExtractor {
    pattern: Regex,
}

impl PlatformMediaExtractor {
    /// Matches `media.`, `vt.` and `va.` subdomains of `domain`, with an optional
    /// numeric shard prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the pattern cannot be built.
    pub fn for_platform(domain: &str) -> Result<Self, ConfigError> {
        let pattern = format!(
            r#"https?://(?:\d+\.)?(?:media|vt|va)\.{}/[^\s"'<>\\]+?\.(?:jpe?g|png|gif|gifv|webp|pnj|mp4)\b"#,
            regex::escape(domain)
        );
        Self::compile(&pattern)
    }

    /// Matches media on one literal host (`host` or `host:port`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the pattern cannot be built.
    pub fn for_host(host: &str) -> Result<Self, ConfigError> {
        let pattern = format!(
            r#"https?://{}(?::\d+)?/[^\s"'<>\\]+?\.(?:jpe?g|png|gif|gifv|webp|pnj|mp4)\b"#,
            regex::escape(host)
        );
        Self::compile(&pattern)
    }

    fn compile(pattern: &str) -> Result<Self, ConfigError> {
        let pattern = Regex::new(pattern)
            .map_err(|e| ConfigError::invalid("platform_domain", e.to_string()))?;
        Ok(Self { pattern })
    }

    fn to_media(url: &str) -> Option<ExtractedMedia> {
        let (stem, ext) = file_stem_and_extension(url)?;
        let kind = if ext.as_deref() == Some("mp4") {
            MediaKind::Video
        } else {
            MediaKind::Image
        };
        Some(ExtractedMedia {
            url: url.to_string(),
            origin_url: url.to_string(),
            id: strip_size_token(&stem),
            kind,
        })
    }
}

#[async_trait]
impl HostExtractor for PlatformMediaExtractor {
    fn host(&self) -> HostKind {
        HostKind::Platform
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
            .find_iter(text)
            .filter_map(|m| Self::to_media(m.as_str()))
            .collect())
    }
}
