//! Post and media filters.

use url::Url;

/// Accepts posts carrying at least one configured tag.
///
/// An empty tag list accepts every post. Matching ignores case and surrounding
/// whitespace.
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    tags: Vec<String>,
}

impl TagFilter {
    /// Parses a comma-separated tag list.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self {
            tags: raw
                .split(',')
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Whether a post with `post_tags` passes.
    #[must_use]
    pub fn allows(&self, post_tags: &[String]) -> bool {
        self.tags.is_empty()
            || post_tags
                .iter()
                .any(|tag| self.tags.contains(&tag.trim().to_lowercase()))
    }
}

/// Whether `url` should be dropped under the gif-skip setting.
///
/// Looks at the URL path only, so a query string cannot hide the extension.
#[must_use]
pub fn skip_gif(skip: bool, url: &str) -> bool {
    if !skip {
        return false;
    }
    let path = Url::parse(url).map_or_else(|_| url.to_string(), |u| u.path().to_string());
    let path = path.to_ascii_lowercase();
    path.ends_with(".gif") || path.ends_with(".gifv")
}
