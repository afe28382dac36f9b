//! Builds the crawler for a blog run.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::ManagerError;
use crate::config::{AppSettings, BlogKind, BlogSettings};
use crate::crawler::{
    BlogDetector, BlogPasswordAuth, Crawler, CrawlerParts, HiddenBlogPagination, PaginationStrategy,
    PublicApiPagination,
};
use crate::extractor::{HostExtractor, platform_extractors};
use crate::transport::HttpClient;

/// Produces a [`Crawler`] for each blog run.
#[async_trait]
pub trait CrawlerFactory: Send + Sync + fmt::Debug {
    /// Builds a crawler for `blog`.
    ///
    /// # Errors
    ///
    /// Returns a [`ManagerError`] when the blog cannot be crawled as configured.
    async fn build(
        &self,
        blog: Arc<BlogSettings>,
        settings: Arc<AppSettings>,
        client: HttpClient,
    ) -> Result<Crawler, ManagerError>;
}

/// Default factory: resolves the blog kind, then wires pagination, password auth and
/// extractors.
#[derive(Debug, Default, Clone)]
pub struct PlatformCrawlerFactory {
    extractors: Option<Vec<Arc<dyn HostExtractor>>>,
}

impl PlatformCrawlerFactory {
    /// Factory using the default extractor set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory using `extractors` instead of the default set.
    #[must_use]
    pub fn with_extractors(extractors: Vec<Arc<dyn HostExtractor>>) -> Self {
        Self {
            extractors: Some(extractors),
        }
    }
}

#[async_trait]
impl CrawlerFactory for PlatformCrawlerFactory {
    async fn build(
        &self,
        blog: Arc<BlogSettings>,
        settings: Arc<AppSettings>,
        client: HttpClient,
    ) -> Result<Crawler, ManagerError> {
        let kind = BlogDetector::new(client.clone(), settings.platform_domain.clone())
            .detect_kind(&blog)
            .await
            .map_err(ManagerError::Detect)?;
        let pagination: Arc<dyn PaginationStrategy> = match kind {
            BlogKind::Hidden => Arc::new(HiddenBlogPagination),
            BlogKind::Public | BlogKind::Auto => Arc::new(PublicApiPagination),
        };
        let extractors = match &self.extractors {
            Some(extractors) => extractors.clone(),
            None => platform_extractors(&settings, &client)?,
        };
        let parts = CrawlerParts {
            pagination,
            auth: Arc::new(BlogPasswordAuth::new(settings.platform_domain.clone())),
            extractors,
        };
        Ok(Crawler::new(blog, settings, client, parts)?)
    }
}
