//! Host extractors: find media references for one host in a block of text.
//!
//! Each extractor owns a fixed URL pattern for its host and maps a requested
//! [`MediaVariant`] to the concrete URL that host serves for it. No match is an empty
//! result, not an error. Only [`GfycatExtractor`] touches the network.
//!
//! The crawler runs the enabled extractors in the order returned by
//! [`platform_extractors`].

mod error;
mod file_host;
mod gfycat;
mod imgur;
mod platform;
pub mod size;
mod webmshare;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{AppSettings, ConfigError};
use crate::queue::MediaKind;
use crate::transport::HttpClient;

pub use error::ExtractError;
pub use file_host::FileHostExtractor;
pub use gfycat::GfycatExtractor;
pub use imgur::ImgurExtractor;
pub use platform::PlatformMediaExtractor;
pub use size::{ImageSize, normalize_image_size};
pub use webmshare::WebmshareExtractor;

/// Hosts the pipeline knows how to extract from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKind {
    /// The blogging platform's own media servers.
    Platform,
    /// imgur.com
    Imgur,
    /// gfycat.com
    Gfycat,
    /// webmshare.com
    Webmshare,
    /// mixtape.moe
    Mixtape,
    /// uguu.se
    Uguu,
    /// safe.moe
    SafeMoe,
    /// lolisafe.moe
    LoliSafe,
    /// catbox.moe
    CatBox,
}

impl HostKind {
    /// Stable lowercase name, matching the configuration keys.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Imgur => "imgur",
            Self::Gfycat => "gfycat",
            Self::Webmshare => "webmshare",
            Self::Mixtape => "mixtape",
            Self::Uguu => "uguu",
            Self::SafeMoe => "safemoe",
            Self::LoliSafe => "lolisafe",
            Self::CatBox => "catbox",
        }
    }
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested rendition of a media reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaVariant {
    /// Whatever the host serves by default.
    Any,
    /// MP4 video.
    Mp4,
    /// WebM video.
    Webm,
    /// Full GIF.
    Gif,
    /// GIF capped at 5 MB.
    Max5mbGif,
    /// GIF capped at 2 MB.
    Max2mbGif,
    /// Motion JPEG.
    Mjpg,
    /// Still poster frame.
    Poster,
    /// Animated WebP.
    Webp,
}

impl MediaVariant {
    /// Stable lowercase selector string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
            Self::Gif => "gif",
            Self::Max5mbGif => "max5mbgif",
            Self::Max2mbGif => "max2mbgif",
            Self::Mjpg => "mjpg",
            Self::Poster => "poster",
            Self::Webp => "webp",
        }
    }
}

impl fmt::Display for MediaVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "mp4" => Ok(Self::Mp4),
            "webm" => Ok(Self::Webm),
            "gif" => Ok(Self::Gif),
            "max5mbgif" => Ok(Self::Max5mbGif),
            "max2mbgif" => Ok(Self::Max2mbGif),
            "mjpg" => Ok(Self::Mjpg),
            "poster" => Ok(Self::Poster),
            "webp" => Ok(Self::Webp),
            _ => Err(ConfigError::UnknownVariant {
                value: s.to_string(),
            }),
        }
    }
}

/// One media reference found by an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMedia {
    /// Resolved URL for the requested variant.
    pub url: String,
    /// The URL as it appeared in the text.
    pub origin_url: String,
    /// Stable identifier, used as the local filename stem.
    pub id: String,
    /// Logical kind of the media.
    pub kind: MediaKind,
}

/// Link-extraction strategy for one host.
#[async_trait]
pub trait HostExtractor: Send + Sync + fmt::Debug {
    /// Which host this extractor handles.
    fn host(&self) -> HostKind;

    /// Variants this host can resolve.
    fn supported_variants(&self) -> &'static [MediaVariant];

    /// Rejects variants this host cannot serve.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::UnsupportedVariant`].
    fn ensure_supported(&self, variant: MediaVariant) -> Result<(), ExtractError> {
        if self.supported_variants().contains(&variant) {
            Ok(())
        } else {
            Err(ExtractError::UnsupportedVariant {
                host: self.host(),
                variant,
            })
        }
    }

    /// Finds every reference to this host in `text`, in order of appearance.
    ///
    /// Duplicates are returned as often as they occur.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::UnsupportedVariant`] for a variant outside
    /// [`Self::supported_variants`], and lookup errors for network-resolving hosts.
    async fn search(&self, text: &str, variant: MediaVariant)
    -> Result<Vec<ExtractedMedia>, ExtractError>;
}

/// The default extractor set, in the order the crawler runs them.
///
/// # Errors
///
/// Returns a [`ConfigError`] when the platform domain cannot form a valid pattern.
pub fn platform_extractors(
    settings: &AppSettings,
    client: &HttpClient,
) -> Result<Vec<Arc<dyn HostExtractor>>, ConfigError> {
    Ok(vec![
        Arc::new(PlatformMediaExtractor::for_platform(&settings.platform_domain)?),
        Arc::new(ImgurExtractor::new()),
        Arc::new(GfycatExtractor::new(client.clone())),
        Arc::new(WebmshareExtractor::new()),
        Arc::new(FileHostExtractor::mixtape()),
        Arc::new(FileHostExtractor::uguu()),
        Arc::new(FileHostExtractor::safe_moe()),
        Arc::new(FileHostExtractor::lolisafe()),
        Arc::new(FileHostExtractor::catbox()),
    ])
}

/// Last path segment of `url` split into stem and lowercase extension.
pub(crate) fn file_stem_and_extension(url: &str) -> Option<(String, Option<String>)> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }
    Some(match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), Some(ext.to_ascii_lowercase())),
        _ => (segment.to_string(), None),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_parse_is_case_insensitive() {
        assert_eq!("MP4".parse::<MediaVariant>().unwrap(), MediaVariant::Mp4);
        assert_eq!(
            " Max5mbGif ".parse::<MediaVariant>().unwrap(),
            MediaVariant::Max5mbGif
        );
    }

    #[test]
    fn test_unknown_variant_is_config_error() {
        assert!(matches!(
            "huge".parse::<MediaVariant>(),
            Err(ConfigError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn test_variant_display_round_trips() {
        for variant in [
            MediaVariant::Any,
            MediaVariant::Mp4,
            MediaVariant::Webm,
            MediaVariant::Gif,
            MediaVariant::Max5mbGif,
            MediaVariant::Max2mbGif,
            MediaVariant::Mjpg,
            MediaVariant::Poster,
            MediaVariant::Webp,
        ] {
            assert_eq!(variant.to_string().parse::<MediaVariant>().unwrap(), variant);
        }
    }

    #[test]
    fn test_default_extractor_order_is_fixed() {
        let settings = AppSettings::default();
        let client = HttpClient::new(&settings, None).unwrap();
        let hosts: Vec<_> = platform_extractors(&settings, &client)
            .unwrap()
            .iter()
            .map(|e| e.host())
            .collect();
        assert_eq!(
            hosts,
            vec![
                HostKind::Platform,
                HostKind::Imgur,
                HostKind::Gfycat,
                HostKind::Webmshare,
                HostKind::Mixtape,
                HostKind::Uguu,
                HostKind::SafeMoe,
                HostKind::LoliSafe,
                HostKind::CatBox,
            ]
        );
    }

    #[test]
    fn test_file_stem_and_extension() {
        assert_eq!(
            file_stem_and_extension("https://files.catbox.moe/abc123.MP4?x=1"),
            Some(("abc123".to_string(), Some("mp4".to_string())))
        );
        assert_eq!(
            file_stem_and_extension("https://example.com/noext"),
            Some(("noext".to_string(), None))
        );
        assert_eq!(file_stem_and_extension("https://example.com/"), None);
    }
}
