//! gfycat.com links, resolved through the site's metadata endpoint.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{ExtractError, ExtractedMedia, HostExtractor, HostKind, MediaVariant};
use crate::queue::MediaKind;
use crate::transport::{HttpClient, RequestOptions};

const DEFAULT_API_BASE: &str = "https://gfycat.com";

#[allow(clippy::expect_used)]
static GFYCAT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(https?://[A-Za-z0-9_/:.]*gfycat\.com/([A-Za-z0-9_]+))")
        .expect("gfycat regex is valid")
});

const VARIANTS: &[MediaVariant] = &[
    MediaVariant::Mp4,
    MediaVariant::Webm,
    MediaVariant::Gif,
    MediaVariant::Max5mbGif,
    MediaVariant::Max2mbGif,
    MediaVariant::Mjpg,
    MediaVariant::Poster,
    MediaVariant::Webp,
];

#[derive(Debug, Deserialize)]
struct GfyResponse {
    #[serde(rename = "gfyItem")]
    gfy_item: Option<GfyItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GfyItem {
    #[serde(rename = "gifUrl")]
    gif_url: Option<String>,
    #[serde(rename = "max5mbGif")]
    max5mb_gif: Option<String>,
    #[serde(rename = "max2mbGif")]
    max2mb_gif: Option<String>,
    #[serde(rename = "mjpgUrl")]
    mjpg_url: Option<String>,
    #[serde(rename = "mp4Url")]
    mp4_url: Option<String>,
    #[serde(rename = "posterUrl")]
    poster_url: Option<String>,
    #[serde(rename = "webmUrl")]
    webm_url: Option<String>,
    #[serde(rename = "webpUrl")]
    webp_url: Option<String>,
}

impl GfyItem {
    fn rendition(&self, variant: MediaVariant) -> Option<&str> {
        let url = match variant {
            MediaVariant::Mp4 => &self.mp4_url,
            MediaVariant::Webm => &self.webm_url,
            MediaVariant::Gif => &self.gif_url,
            MediaVariant::Max5mbGif => &self.max5mb_gif,
            MediaVariant::Max2mbGif => &self.max2mb_gif,
            MediaVariant::Mjpg => &self.mjpg_url,
            MediaVariant::Poster => &self.poster_url,
            MediaVariant::Webp => &self.webp_url,
            MediaVariant::Any => return None,
        };
        url.as_deref().filter(|u| !u.is_empty())
    }
}

fn kind_for(variant: MediaVariant) -> MediaKind {
    match variant {
        MediaVariant::Mp4 | MediaVariant::Webm => MediaKind::ExternalVideo,
        _ => MediaKind::ExternalImage,
    }
}

/// Resolves gfycat links to a concrete rendition.
///
/// Each distinct id is looked up once per `search` call. gfycat has no default
/// rendition, so [`MediaVariant::Any`] is rejected.
#[derive(Debug, Clone)]
pub struct GfycatExtractor {
    client: HttpClient,
    api_base: String,
}

impl GfycatExtractor {
    /// Creates an extractor querying gfycat.com.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Points lookups at another origin.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    #[instrument(skip(self), fields(host = "gfycat"))]
    async fn lookup(&self, id: &str) -> Result<GfyItem, ExtractError> {
        let url = format!("{}/cajax/get/{id}", self.api_base);
        let body = self
            .client
            .get_text(&url, &RequestOptions::xhr())
            .await
            .map_err(|e| ExtractError::lookup(HostKind::Gfycat, id, e))?;
        let parsed: GfyResponse =
            serde_json::from_str(&body).map_err(|e| ExtractError::MalformedResponse {
                host: HostKind::Gfycat,
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        parsed.gfy_item.ok_or_else(|| ExtractError::MalformedResponse {
            host: HostKind::Gfycat,
            id: id.to_string(),
            reason: "missing gfyItem".to_string(),
        })
    }
}

#[async_trait]
impl HostExtractor for GfycatExtractor {
    fn host(&self) -> HostKind {
        HostKind::Gfycat
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
        let mut resolved: HashMap<String, GfyItem> = HashMap::new();
        let mut found = Vec::new();
        for caps in GFYCAT_LINK.captures_iter(text) {
            let (Some(origin), Some(id)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let id = id.as_str();
            if !resolved.contains_key(id) {
                let item = self.lookup(id).await?;
                resolved.insert(id.to_string(), item);
            }
            let Some(url) = resolved.get(id).and_then(|item| item.rendition(variant)) else {
                return Err(ExtractError::MalformedResponse {
                    host: HostKind::Gfycat,
                    id: id.to_string(),
                    reason: format!("no '{variant}' rendition"),
                });
            };
            debug!(id, url, "gfycat link resolved");
            found.push(ExtractedMedia {
                url: url.to_string(),
                origin_url: origin.as_str().to_string(),
                id: id.to_string(),
                kind: kind_for(variant),
            });
        }
        Ok(found)
    }
}
