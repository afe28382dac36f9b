//! Classifies a blog by where its front page redirects.

use tracing::{debug, instrument};

use crate::config::{BlogKind, BlogSettings};
use crate::transport::{HttpClient, RequestOptions, TransportError};

/// Follows a blog's front page redirects to tell public, hidden and protected blogs
/// apart.
#[derive(Debug, Clone)]
pub struct BlogDetector {
    client: HttpClient,
    platform_domain: String,
}

impl BlogDetector {
    /// Detector for blogs under `platform_domain`.
    #[must_use]
    pub fn new(client: HttpClient, platform_domain: impl Into<String>) -> Self {
        Self {
            client,
            platform_domain: platform_domain.into(),
        }
    }

    async fn location(&self, url: &str) -> Result<String, TransportError> {
        let mut options = RequestOptions::default();
        options.cookie_hosts = vec![format!("https://www.{}/", self.platform_domain)];
        let location = self.client.final_url(url, &options).await?;
        Ok(location.to_string())
    }

    /// Whether `url` serves a blog to logged-out visitors.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the page cannot be requested.
    pub async fn is_blog(&self, url: &str) -> Result<bool, TransportError> {
        Ok(!self.location(url).await?.contains("login_required"))
    }

    /// Whether `url` redirects into the dashboard.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the page cannot be requested.
    pub async fn is_hidden_blog(&self, url: &str) -> Result<bool, TransportError> {
        Ok(is_hidden_location(&self.location(url).await?))
    }

    /// Whether `url` redirects to the password prompt.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the page cannot be requested.
    pub async fn is_password_protected(&self, url: &str) -> Result<bool, TransportError> {
        Ok(self.location(url).await?.contains("blog_auth"))
    }

    /// Resolves [`BlogKind::Auto`] with a single request; explicit kinds pass through.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the front page cannot be requested.
    #[instrument(skip(self, blog), fields(blog = %blog.name))]
    pub async fn detect_kind(&self, blog: &BlogSettings) -> Result<BlogKind, TransportError> {
        if blog.kind != BlogKind::Auto {
            return Ok(blog.kind);
        }
        let location = self.location(&blog.feed_base(&self.platform_domain)).await?;
        let kind = if is_hidden_location(&location) {
            BlogKind::Hidden
        } else {
            BlogKind::Public
        };
        debug!(%location, ?kind, "blog kind detected");
        Ok(kind)
    }
}

fn is_hidden_location(location: &str) -> bool {
    location.contains("login_required") || location.contains("dashboard/blog/")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::AppSettings;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    #[tokio::test]
    async fn test_detects_hidden_and_public_blogs() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/hidden"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/login_required/hidden", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/login_required/hidden"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/locked"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/blog_auth/locked", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/blog_auth/locked"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/open"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = HttpClient::new(&AppSettings::default(), None).unwrap();
        let detector = BlogDetector::new(client, "tumblr.com");
        let hidden = format!("{}/hidden", server.uri());
        let open = format!("{}/open", server.uri());
        let locked = format!("{}/locked", server.uri());

        assert!(detector.is_hidden_blog(&hidden).await.unwrap());
        assert!(!detector.is_blog(&hidden).await.unwrap());
        assert!(detector.is_blog(&open).await.unwrap());
        assert!(!detector.is_hidden_blog(&open).await.unwrap());
        assert!(detector.is_password_protected(&locked).await.unwrap());
        assert!(!detector.is_password_protected(&open).await.unwrap());
    }

    #[tokio::test]
    async fn test_detect_kind_uses_feed_base() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/dashboard/blog/example", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dashboard/blog/example"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = HttpClient::new(&AppSettings::default(), None).unwrap();
        let detector = BlogDetector::new(client, "tumblr.com");
        let mut blog = BlogSettings::new("example");
        blog.feed_base_url = Some(server.uri());
        assert_eq!(detector.detect_kind(&blog).await.unwrap(), BlogKind::Hidden);

        blog.kind = BlogKind::Public;
        assert_eq!(detector.detect_kind(&blog).await.unwrap(), BlogKind::Public);
    }
}
