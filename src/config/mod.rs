//! Immutable configuration snapshot consumed by the acquisition pipeline.
//!
//! [`AppSettings`] holds the process-wide limits (timeouts, retries, bandwidth,
//! concurrency) and [`BlogSettings`] the per-blog filters and host toggles. Both are
//! validated once and then shared read-only behind an `Arc`; a settings change means
//! building a new snapshot and handing it to new component instances.

mod error;
pub mod file;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::extractor::{HostKind, ImageSize, MediaVariant};
use crate::transport::ThrottleBudget;
use crate::user_agent::default_user_agent;

pub use error::ConfigError;
pub use file::{FileConfig, load_config, resolve_default_config_path};

/// Size of one write-buffer block; the buffer is `buffer_size_multiplier` blocks.
pub const BUFFER_BLOCK_SIZE: usize = 4096;

/// Default platform domain blogs are hosted under.
pub const DEFAULT_PLATFORM_DOMAIN: &str = "tumblr.com";

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BUFFER_MULTIPLIER: usize = 16;
const DEFAULT_CONCURRENT_CONNECTIONS: u32 = 8;
const DEFAULT_CONCURRENT_BLOGS: usize = 2;
const DEFAULT_PAGE_SIZE: u32 = 50;
const DEFAULT_PAGE_RETRIES: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Process-wide settings snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppSettings {
    /// Timeout applied to every send and every body read, in seconds.
    pub timeout_secs: u64,
    /// Maximum transfer attempts per item (including the first).
    pub max_number_of_retries: u32,
    /// Write buffer size in units of [`BUFFER_BLOCK_SIZE`].
    pub buffer_size_multiplier: usize,
    /// Global bandwidth budget in KiB/s; 0 means unlimited.
    pub bandwidth_kb_per_sec: u64,
    /// Process-wide ceiling on simultaneous connections.
    pub concurrent_connections: u32,
    /// Maximum number of blogs running at once.
    pub concurrent_blogs: usize,
    /// Also throttle page and API requests, not only media transfers.
    pub limit_scan_bandwidth: bool,
    /// Preferred rendition for platform images.
    pub image_size: ImageSize,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
    /// Optional HTTP proxy.
    pub proxy: Option<ProxySettings>,
    /// Domain blogs live under (`<blog>.<platform_domain>`).
    pub platform_domain: String,
    /// Root directory; each blog downloads into its own subdirectory.
    pub download_location: PathBuf,
    /// Posts requested per feed page.
    pub page_size: u32,
    /// Attempts per feed page before the page counts as failed.
    pub page_retries: u32,
    /// Base delay for retry backoff, in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Capacity of each blog's work queue.
    pub queue_capacity: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_number_of_retries: DEFAULT_MAX_RETRIES,
            buffer_size_multiplier: DEFAULT_BUFFER_MULTIPLIER,
            bandwidth_kb_per_sec: 0,
            concurrent_connections: DEFAULT_CONCURRENT_CONNECTIONS,
            concurrent_blogs: DEFAULT_CONCURRENT_BLOGS,
            limit_scan_bandwidth: false,
            image_size: ImageSize::Px1280,
            user_agent: default_user_agent(),
            proxy: None,
            platform_domain: DEFAULT_PLATFORM_DOMAIN.to_string(),
            download_location: PathBuf::from("."),
            page_size: DEFAULT_PAGE_SIZE,
            page_retries: DEFAULT_PAGE_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl AppSettings {
    /// Checks every numeric option against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("timeout_secs", self.timeout_secs, 1, 3_600)?;
        check_range(
            "max_number_of_retries",
            u64::from(self.max_number_of_retries),
            1,
            100,
        )?;
        check_range(
            "buffer_size_multiplier",
            self.buffer_size_multiplier as u64,
            1,
            1_024,
        )?;
        check_range(
            "concurrent_connections",
            u64::from(self.concurrent_connections),
            1,
            400,
        )?;
        check_range("concurrent_blogs", self.concurrent_blogs as u64, 1, 100)?;
        check_range("page_size", u64::from(self.page_size), 1, 50)?;
        check_range("page_retries", u64::from(self.page_retries), 1, 20)?;
        check_range("retry_base_delay_ms", self.retry_base_delay_ms, 0, 60_000)?;
        check_range("queue_capacity", self.queue_capacity as u64, 1, 65_536)?;

        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::invalid("user_agent", "must not be empty"));
        }
        if self.platform_domain.trim().is_empty() || self.platform_domain.contains('/') {
            return Err(ConfigError::invalid(
                "platform_domain",
                format!("'{}' is not a bare domain", self.platform_domain),
            ));
        }
        if let Some(proxy) = &self.proxy {
            proxy.validate()?;
        }
        Ok(())
    }

    /// Timeout for a single send or body read.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Write buffer size in bytes.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size_multiplier.max(1) * BUFFER_BLOCK_SIZE
    }

    /// Bandwidth budget shared by every transfer.
    #[must_use]
    pub fn throttle_budget(&self) -> ThrottleBudget {
        ThrottleBudget::new(self.bandwidth_kb_per_sec, self.concurrent_connections)
    }

    /// Base delay for retry backoff.
    #[must_use]
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("{value}. Expected range: {min}..={max}"),
        ))
    }
}

/// HTTP proxy with optional credentials.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxySettings {
    /// Proxy host name or address.
    pub host: String,
    /// Proxy port.
    pub port: u16,
    /// Optional user name for proxy authentication.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional password for proxy authentication.
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxySettings {
    /// Proxy URL handed to the HTTP client.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::invalid("proxy.host", "must not be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::invalid("proxy.port", "must not be 0"));
        }
        Ok(())
    }
}

impl fmt::Debug for ProxySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxySettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// How a blog's feed is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlogKind {
    /// Probe the blog first and pick public or hidden.
    #[default]
    Auto,
    /// Publicly readable through the JSON read API.
    Public,
    /// Login-required blog read through the dashboard endpoint.
    Hidden,
}

/// Per-blog filters and host toggles.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlogSettings {
    /// Blog name; also the subdomain and the download subdirectory.
    pub name: String,
    /// Blog password for protected blogs.
    #[serde(default)]
    pub password: Option<String>,
    /// Comma-separated tag allow-list; empty disables tag filtering.
    #[serde(default)]
    pub tags: String,
    /// Skip animated images (`.gif`, `.gifv`).
    #[serde(default)]
    pub skip_gif: bool,
    /// How the feed is reached.
    #[serde(default)]
    pub kind: BlogKind,
    /// Overrides `https://<name>.<platform_domain>` as the feed origin.
    #[serde(default)]
    pub feed_base_url: Option<String>,
    /// Stop after this many feed pages.
    #[serde(default)]
    pub page_cap: Option<u32>,
    /// Stop after this many discovered items.
    #[serde(default)]
    pub item_cap: Option<usize>,
    /// Enabled hosts and the variant selector requested from each.
    #[serde(default = "default_hosts")]
    pub hosts: BTreeMap<HostKind, String>,
}

fn default_hosts() -> BTreeMap<HostKind, String> {
    BTreeMap::from([(HostKind::Platform, "any".to_string())])
}

impl BlogSettings {
    /// Creates settings for `name` with defaults: no filters, platform media only.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: None,
            tags: String::new(),
            skip_gif: false,
            kind: BlogKind::Auto,
            feed_base_url: None,
            page_cap: None,
            item_cap: None,
            hosts: default_hosts(),
        }
    }

    /// Enables `host` with the given variant selector.
    #[must_use]
    pub fn with_host(mut self, host: HostKind, variant: impl Into<String>) -> Self {
        self.hosts.insert(host, variant.into());
        self
    }

    /// Origin of the blog's feed.
    #[must_use]
    pub fn feed_base(&self, platform_domain: &str) -> String {
        match &self.feed_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}.{platform_domain}", self.name),
        }
    }

    /// Parsed variant for `host`, or `None` when the host is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownVariant`] for an unrecognized selector string.
    pub fn variant_for(&self, host: HostKind) -> Result<Option<MediaVariant>, ConfigError> {
        self.hosts
            .get(&host)
            .map(|raw| raw.parse::<MediaVariant>())
            .transpose()
    }

    /// Validates the blog name and every host selector.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ConfigError::invalid("blogs.name", "must not be empty"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::invalid(
                "blogs.name",
                format!("'{name}' contains characters not allowed in a blog name"),
            ));
        }
        for raw in self.hosts.values() {
            raw.parse::<MediaVariant>()?;
        }
        Ok(())
    }
}

impl fmt::Debug for BlogSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlogSettings")
            .field("name", &self.name)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("tags", &self.tags)
            .field("skip_gif", &self.skip_gif)
            .field("kind", &self.kind)
            .field("feed_base_url", &self.feed_base_url)
            .field("page_cap", &self.page_cap)
            .field("item_cap", &self.item_cap)
            .field("hosts", &self.hosts)
            .finish()
    }
}
