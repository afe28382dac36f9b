//! Anti-forgery form key scraped from an authenticated platform page.

use std::sync::LazyLock;

use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::transport::{HttpClient, RequestOptions};

#[allow(clippy::expect_used)]
static FORM_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"id="tumblr_form_key" content="([\S]*)">"#).expect("form key regex is valid")
});

/// Header the hidden-feed endpoint expects the key in.
pub const FORM_KEY_HEADER: &str = "X-tumblr-form-key";

/// Pulls the form key out of a page, if present and non-empty.
#[must_use]
pub fn extract_form_key(document: &str) -> Option<String> {
    FORM_KEY
        .captures(document)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|key| !key.is_empty())
}

/// Lazily fetched, cached form key.
#[derive(Debug)]
pub struct FormKeyCache {
    source_url: String,
    key: Mutex<Option<String>>,
}

impl FormKeyCache {
    /// Cache refreshed from `source_url`.
    #[must_use]
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            key: Mutex::new(None),
        }
    }

    /// Returns the cached key, fetching it first if needed.
    ///
    /// A failed refresh is logged and yields `None`; the caller proceeds without it.
    pub async fn get(&self, client: &HttpClient, options: &RequestOptions) -> Option<String> {
        let mut key = self.key.lock().await;
        if key.is_none() {
            match client.get_text(&self.source_url, options).await {
                Ok(document) => {
                    *key = extract_form_key(&document);
                    if key.is_none() {
                        warn!(url = %self.source_url, "form key not found in page");
                    } else {
                        debug!("form key refreshed");
                    }
                }
                Err(e) => warn!(url = %self.source_url, error = %e, "form key refresh failed"),
            }
        }
        key.clone()
    }

    /// Drops the cached key so the next [`Self::get`] refreshes it.
    pub async fn invalidate(&self) {
        *self.key.lock().await = None;
    }
}
