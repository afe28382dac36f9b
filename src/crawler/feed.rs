//! Feed pagination strategies.
//!
//! A [`PaginationStrategy`] knows where page `n` of a blog lives and how to turn the
//! response into [`FeedPost`]s. Extraction works on every string in a post, so the
//! strategies do not need to know which fields hold media. The one exception is photo
//! renditions: only the widest `photo-url-*` of each photo is kept, and `alt_sizes`
//! lists are skipped, so a photo yields a single reference.

use std::fmt;

use serde_json::{Map, Value};

use super::CrawlError;
use crate::config::BlogSettings;
use crate::transport::RequestOptions;

/// One post from a feed page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPost {
    /// Post id.
    pub id: String,
    /// Post time, seconds since the epoch.
    pub timestamp: i64,
    /// Post tags.
    pub tags: Vec<String>,
    /// String values of the post, newline separated, with one rendition per photo.
    pub content: String,
}

/// One parsed feed page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPage {
    /// Posts in feed order.
    pub posts: Vec<FeedPost>,
    /// Total posts on the blog, when the feed reports it.
    pub total: Option<u64>,
    /// Whether another page should be requested.
    pub has_more: bool,
}

/// Page addressing and parsing for one feed flavour.
pub trait PaginationStrategy: Send + Sync + fmt::Debug {
    /// URL of the page starting at `offset`.
    fn page_url(&self, blog: &BlogSettings, platform_domain: &str, offset: u64, page_size: u32) -> String;

    /// Extra request options for page fetches.
    fn page_options(&self, _blog: &BlogSettings, _platform_domain: &str) -> RequestOptions {
        RequestOptions::default()
    }

    /// Page the form key is scraped from, for feeds that require one.
    fn form_key_source(&self, _blog: &BlogSettings, _platform_domain: &str) -> Option<String> {
        None
    }

    /// Parses a page body fetched from `url`.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Parse`] when the body is not the expected document.
    fn parse_page(&self, url: &str, body: &str, offset: u64, page_size: u32) -> Result<FeedPage, CrawlError>;
}

/// The public read API (`/api/read/json`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicApiPagination;

const API_WRAPPER_PREFIX: &str = "var tumblr_api_read =";

const PHOTO_URL_PREFIX: &str = "photo-url-";

impl PaginationStrategy for PublicApiPagination {
    fn page_url(&self, blog: &BlogSettings, platform_domain: &str, offset: u64, page_size: u32) -> String {
        format!(
            "{}/api/read/json?debug=1&num={page_size}&start={offset}",
            blog.feed_base(platform_domain)
        )
    }

    fn parse_page(&self, url: &str, body: &str, offset: u64, _page_size: u32) -> Result<FeedPage, CrawlError> {
        let trimmed = body.trim();
        let json = trimmed
            .strip_prefix(API_WRAPPER_PREFIX)
            .map_or(trimmed, |rest| rest.trim().trim_end_matches(';').trim_end());
        let document: Value =
            serde_json::from_str(json).map_err(|e| CrawlError::parse(url, e.to_string()))?;
        let posts = document
            .get("posts")
            .and_then(Value::as_array)
            .ok_or_else(|| CrawlError::parse(url, "missing posts array"))?;
        let total = document.get("posts-total").and_then(number_or_string);
        let posts: Vec<FeedPost> = posts
            .iter()
            .map(|post| to_feed_post(post, "unix-timestamp"))
            .collect();
        let has_more = match total {
            Some(total) => !posts.is_empty() && offset + (posts.len() as u64) < total,
            None => !posts.is_empty(),
        };
        Ok(FeedPage {
            posts,
            total,
            has_more,
        })
    }
}

/// The dashboard endpoint serving blogs hidden from logged-out visitors.
#[derive(Debug, Clone, Copy, Default)]
pub struct HiddenBlogPagination;

impl HiddenBlogPagination {
    fn base(blog: &BlogSettings, platform_domain: &str) -> String {
        blog.feed_base_url
            .as_deref()
            .map(|b| b.trim().trim_end_matches('/').to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| format!("https://www.{platform_domain}"))
    }
}

impl PaginationStrategy for HiddenBlogPagination {
    fn page_url(&self, blog: &BlogSettings, platform_domain: &str, offset: u64, page_size: u32) -> String {
        format!(
            "{}/svc/indash_blog?tumblelog_name_or_id={}&post_id=&limit={page_size}&offset={offset}&should_bypass_safemode=true",
            Self::base(blog, platform_domain),
            urlencoding::encode(&blog.name)
        )
    }

    fn page_options(&self, blog: &BlogSettings, platform_domain: &str) -> RequestOptions {
        RequestOptions::xhr().with_referer(format!(
            "{}/dashboard/blog/{}",
            Self::base(blog, platform_domain),
            blog.name
        ))
    }

    fn form_key_source(&self, blog: &BlogSettings, platform_domain: &str) -> Option<String> {
        Some(format!(
            "{}/dashboard/blog/{}",
            Self::base(blog, platform_domain),
            blog.name
        ))
    }

    fn parse_page(&self, url: &str, body: &str, _offset: u64, page_size: u32) -> Result<FeedPage, CrawlError> {
        let document: Value =
            serde_json::from_str(body.trim()).map_err(|e| CrawlError::parse(url, e.to_string()))?;
        let posts = document
            .pointer("/response/posts")
            .and_then(Value::as_array)
            .ok_or_else(|| CrawlError::parse(url, "missing response.posts array"))?;
        let posts: Vec<FeedPost> = posts.iter().map(|post| to_feed_post(post, "timestamp")).collect();
        let has_more = posts.len() as u64 >= u64::from(page_size) && !posts.is_empty();
        Ok(FeedPage {
            posts,
            total: None,
            has_more,
        })
    }
}

fn number_or_string(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_feed_post(post: &Value, timestamp_field: &str) -> FeedPost {
    let id = match post.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    let timestamp = post
        .get(timestamp_field)
        .and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .unwrap_or_default();
    let tags = post
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let mut strings = Vec::new();
    collect_strings(post, &mut strings);
    FeedPost {
        id,
        timestamp,
        tags,
        content: strings.join("\n"),
    }
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => collect_object(map, out),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn collect_object<'a>(map: &'a Map<String, Value>, out: &mut Vec<&'a str>) {
    // top-level renditions mirror photos[0] when a photoset is present
    let has_photoset = map
        .get("photos")
        .and_then(Value::as_array)
        .is_some_and(|photos| !photos.is_empty());
    if !has_photoset && let Some(url) = widest_photo_url(map) {
        out.push(url);
    }
    for (key, value) in map {
        if key.starts_with(PHOTO_URL_PREFIX) || key == "alt_sizes" {
            continue;
        }
        collect_strings(value, out);
    }
}

fn widest_photo_url(map: &Map<String, Value>) -> Option<&str> {
    map.iter()
        .filter_map(|(key, value)| {
            let width: u32 = key.strip_prefix(PHOTO_URL_PREFIX)?.parse().ok()?;
            Some((width, value.as_str()?))
        })
        .filter(|(_, url)| !url.is_empty())
        .max_by_key(|(width, _)| *width)
        .map(|(_, url)| url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const API_PAGE: &str = r#"var tumblr_api_read = {"tumblelog":{"name":"example"},"posts-start":0,"posts-total":"3","posts":[
        {"id":"101","unix-timestamp":1500000000,"type":"photo","photo-url-1280":"https://64.media.tumblr.com/a/tumblr_one_1280.jpg","tags":["cats"]},
        {"id":102,"unix-timestamp":1500000100,"type":"regular","regular-body":"<p><a href=\"https://webmshare.com/play/ab12\">clip</a></p>"}
    ]};"#;

    #[test]
    fn test_public_page_url() {
        let blog = BlogSettings::new("example");
        assert_eq!(
            PublicApiPagination.page_url(&blog, "tumblr.com", 50, 50),
            "https://example.tumblr.com/api/read/json?debug=1&num=50&start=50"
        );
    }

    #[test]
    fn test_public_page_strips_wrapper_and_reads_posts() {
        let page = PublicApiPagination.parse_page("u", API_PAGE, 0, 2).unwrap();
        assert_eq!(page.total, Some(3));
        assert!(page.has_more);
        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.posts[0].id, "101");
        assert_eq!(page.posts[0].timestamp, 1_500_000_000);
        assert_eq!(page.posts[0].tags, vec!["cats"]);
        assert!(page.posts[0].content.contains("tumblr_one_1280.jpg"));
        assert_eq!(page.posts[1].id, "102");
        assert!(page.posts[1].content.contains("https://webmshare.com/play/ab12"));
    }

    #[test]
    fn test_public_last_page_has_no_more() {
        let page = PublicApiPagination.parse_page("u", API_PAGE, 1, 2).unwrap();
        assert!(!page.has_more);
    }

    #[test]
    fn test_public_plain_json_is_accepted() {
        let page = PublicApiPagination
            .parse_page("u", r#"{"posts-total":0,"posts":[]}"#, 0, 50)
            .unwrap();
        assert_eq!(page.total, Some(0));
        assert!(!page.has_more);
    }

    #[test]
    fn test_public_garbage_is_parse_error() {
        let err = PublicApiPagination.parse_page("u", "<html>", 0, 50).unwrap_err();
        assert!(matches!(err, CrawlError::Parse { .. }));
    }

    #[test]
    fn test_hidden_page_url_and_options() {
        let blog = BlogSettings::new("example");
        let strategy = HiddenBlogPagination;
        assert_eq!(
            strategy.page_url(&blog, "tumblr.com", 20, 10),
            "https://www.tumblr.com/svc/indash_blog?tumblelog_name_or_id=example&post_id=&limit=10&offset=20&should_bypass_safemode=true"
        );
        let options = strategy.page_options(&blog, "tumblr.com");
        assert!(options.xhr);
        assert_eq!(
            options.referer.as_deref(),
            Some("https://www.tumblr.com/dashboard/blog/example")
        );
        assert!(strategy.form_key_source(&blog, "tumblr.com").is_some());
        assert!(PublicApiPagination.form_key_source(&blog, "tumblr.com").is_none());
    }

    #[test]
    fn test_hidden_page_has_more_when_full() {
        let body = r#"{"response":{"posts":[{"id":"1","timestamp":5,"tags":[]},{"id":"2","timestamp":6}]}}"#;
        let page = HiddenBlogPagination.parse_page("u", body, 0, 2).unwrap();
        assert!(page.has_more);
        assert_eq!(page.posts[1].timestamp, 6);
        let short = HiddenBlogPagination.parse_page("u", body, 0, 3).unwrap();
        assert!(!short.has_more);
    }

    #[test]
    fn test_photo_keeps_only_widest_rendition() {
        let body = r#"{"posts-total":1,"posts":[{"id":"7","type":"photo",
            "photo-caption":"caption",
            "photo-url-1280":"https://64.media.tumblr.com/x/tumblr_pic_1280.jpg",
            "photo-url-500":"https://64.media.tumblr.com/x/tumblr_pic_500.jpg",
            "photo-url-400":"https://64.media.tumblr.com/x/tumblr_pic_400.jpg",
            "photo-url-250":"https://64.media.tumblr.com/x/tumblr_pic_250.jpg",
            "photo-url-100":"https://64.media.tumblr.com/x/tumblr_pic_100.jpg",
            "photo-url-75":"https://64.media.tumblr.com/x/tumblr_pic_75sq.jpg"}]}"#;
        let page = PublicApiPagination.parse_page("u", body, 0, 50).unwrap();
        let content = &page.posts[0].content;
        assert_eq!(content.matches("tumblr_pic_").count(), 1);
        assert!(content.contains("tumblr_pic_1280.jpg"));
        assert!(content.contains("caption"));
    }

    #[test]
    fn test_photoset_yields_one_rendition_per_photo() {
        let body = r#"{"posts-total":1,"posts":[{"id":"8","type":"photo",
            "photo-url-1280":"https://m.example/tumblr_a_1280.jpg",
            "photo-url-500":"https://m.example/tumblr_a_500.jpg",
            "photos":[
                {"photo-url-1280":"https://m.example/tumblr_a_1280.jpg","photo-url-500":"https://m.example/tumblr_a_500.jpg"},
                {"photo-url-1280":"https://m.example/tumblr_b_1280.jpg","photo-url-500":"https://m.example/tumblr_b_500.jpg"}
            ]}]}"#;
        let page = PublicApiPagination.parse_page("u", body, 0, 50).unwrap();
        let content = &page.posts[0].content;
        assert_eq!(content.matches("tumblr_a_").count(), 1);
        assert_eq!(content.matches("tumblr_b_").count(), 1);
    }

    #[test]
    fn test_hidden_photo_alt_sizes_are_skipped() {
        let body = r#"{"response":{"posts":[{"id":"9","timestamp":1,"photos":[{
            "original_size":{"url":"https://m.example/tumblr_c_1280.jpg"},
            "alt_sizes":[{"url":"https://m.example/tumblr_c_500.jpg"},{"url":"https://m.example/tumblr_c_250.jpg"}]
        }]}]}}"#;
        let page = HiddenBlogPagination.parse_page("u", body, 0, 50).unwrap();
        let content = &page.posts[0].content;
        assert_eq!(content.matches("tumblr_c_").count(), 1);
        assert!(content.contains("tumblr_c_1280.jpg"));
    }
}
