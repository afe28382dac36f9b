//! Request credentials for feed pages.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::config::BlogSettings;
use crate::transport::RequestOptions;

/// Supplies the auth headers and cookie origins attached to every page fetch.
pub trait AuthStrategy: Send + Sync + fmt::Debug {
    /// Options carrying this strategy's credentials for `blog`.
    fn request_options(&self, blog: &BlogSettings) -> RequestOptions;
}

/// Basic auth from the blog password plus the platform's session cookies.
#[derive(Debug, Clone)]
pub struct BlogPasswordAuth {
    platform_domain: String,
    cookie_hosts: Vec<String>,
}

impl BlogPasswordAuth {
    /// Credentials for blogs under `platform_domain`.
    #[must_use]
    pub fn new(platform_domain: impl Into<String>) -> Self {
        let platform_domain = platform_domain.into();
        let cookie_hosts = vec![format!("https://www.{platform_domain}/")];
        Self {
            platform_domain,
            cookie_hosts,
        }
    }
}

impl AuthStrategy for BlogPasswordAuth {
    fn request_options(&self, blog: &BlogSettings) -> RequestOptions {
        let username = format!("{}.{}", blog.name, self.platform_domain);
        let password = blog.password.as_deref().unwrap_or_default();
        let mut options = RequestOptions::default()
            .with_header("authorization", basic_auth_value(&username, password));
        options.cookie_hosts.clone_from(&self.cookie_hosts);
        options
    }
}

/// `Basic` credentials encoded as ISO-8859-1; characters outside it become `?`.
#[must_use]
pub fn basic_auth_value(username: &str, password: &str) -> String {
    let latin1: Vec<u8> = format!("{username}:{password}")
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect();
    format!("Basic {}", STANDARD.encode(latin1))
}
