//! Platform image rendition sizes.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::config::ConfigError;

#[allow(clippy::expect_used)]
static SIZE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"_(?:raw|1280|540|500|400|250|100|75sq)\b").expect("size token regex is valid")
});

/// Rendition the platform serves for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum ImageSize {
    /// Original upload. Media servers only expose it up to 1280px.
    Raw,
    /// 1280 px wide.
    #[default]
    Px1280,
    /// 540 px wide.
    Px540,
    /// 500 px wide.
    Px500,
    /// 400 px wide.
    Px400,
    /// 250 px wide.
    Px250,
    /// 100 px wide.
    Px100,
    /// 75 px square thumbnail.
    Px75Sq,
}

impl ImageSize {
    /// Selector string as written in configuration.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Px1280 => "1280",
            Self::Px540 => "540",
            Self::Px500 => "500",
            Self::Px400 => "400",
            Self::Px250 => "250",
            Self::Px100 => "100",
            Self::Px75Sq => "75sq",
        }
    }

    /// Token written into the media URL for this size.
    #[must_use]
    pub fn target_token(self) -> &'static str {
        match self {
            Self::Raw => "1280",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageSize {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "1280" => Ok(Self::Px1280),
            "540" => Ok(Self::Px540),
            "500" => Ok(Self::Px500),
            "400" => Ok(Self::Px400),
            "250" => Ok(Self::Px250),
            "100" => Ok(Self::Px100),
            "75sq" => Ok(Self::Px75Sq),
            _ => Err(ConfigError::UnknownImageSize {
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ImageSize {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Rewrites every size token in a platform image URL to `size`.
///
/// URLs without a size token are returned unchanged. Applying the same size twice
/// yields the same URL.
#[must_use]
pub fn normalize_image_size(url: &str, size: ImageSize) -> String {
    let replacement = format!("_{}", size.target_token());
    SIZE_TOKEN.replace_all(url, replacement.as_str()).into_owned()
}

/// Removes the size token from a file stem, so every rendition shares one id.
pub(crate) fn strip_size_token(stem: &str) -> String {
    SIZE_TOKEN.replace_all(stem, "").into_owned()
}
