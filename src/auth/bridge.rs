//! Cookie bridge: the explicit cookie store the transport layer reads and writes.
//!
//! Cookies are kept in a plain map from domain to cookie list. The full set can be
//! enumerated with [`CookieBridge::get_all`] and replaced with
//! [`CookieBridge::set_all`] so an external collaborator can persist it.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

/// A single cookie.
///
/// The value is redacted in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Domain without a leading dot, lowercased.
    pub domain: String,
    /// Only sent to `domain` itself, not its subdomains.
    pub host_only: bool,
    /// Path scope.
    pub path: String,
    /// Only sent over https.
    pub secure: bool,
    /// Expiry as unix seconds; `None` for a session cookie.
    pub expires: Option<u64>,
    /// Cookie name.
    pub name: String,
    value: String,
}

impl Cookie {
    /// Creates a session cookie valid for `domain` and its subdomains.
    #[must_use]
    pub fn new(
        domain: impl AsRef<str>,
        path: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            domain: normalize_domain(domain.as_ref()),
            host_only: false,
            path: path.into(),
            secure: false,
            expires: None,
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns the cookie value. Avoid logging it.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Sets the expiry.
    #[must_use]
    pub fn with_expires(mut self, expires: Option<u64>) -> Self {
        self.expires = expires;
        self
    }

    /// Marks the cookie https-only.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Restricts the cookie to its exact domain.
    #[must_use]
    pub fn with_host_only(mut self, host_only: bool) -> Self {
        self.host_only = host_only;
        self
    }

    /// Whether the cookie has expired at `now` (unix seconds).
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    /// Whether the cookie should be sent with a request to `url` at `now`.
    #[must_use]
    pub fn matches(&self, url: &Url, now: u64) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let domain_ok = host == self.domain
            || (!self.host_only && host.ends_with(&format!(".{}", self.domain)));
        domain_ok
            && url.path().starts_with(&self.path)
            && (!self.secure || url.scheme() == "https")
            && !self.is_expired(now)
    }

    fn same_slot(&self, other: &Self) -> bool {
        self.name == other.name && self.path == other.path && self.domain == other.domain
    }
}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cookie")
            .field("domain", &self.domain)
            .field("host_only", &self.host_only)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("expires", &self.expires)
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Cookie store consumed by the transport layer.
pub trait CookieBridge: Send + Sync + fmt::Debug {
    /// Cookies to send with a request to `url`.
    fn cookies_for(&self, url: &Url) -> Vec<Cookie>;

    /// Records cookies returned by a response from `url`.
    fn store(&self, url: &Url, cookies: Vec<Cookie>);

    /// Expires every cookie that would be sent to `url`.
    fn remove_for(&self, url: &Url);

    /// Every cookie currently held.
    fn get_all(&self) -> Vec<Cookie>;

    /// Replaces the whole cookie set.
    fn set_all(&self, cookies: Vec<Cookie>);

    /// `Cookie` header value for `url`, if any cookie applies.
    fn header_for(&self, url: &Url) -> Option<String> {
        let pairs: Vec<String> = self
            .cookies_for(url)
            .iter()
            .map(|c| format!("{}={}", c.name, c.value()))
            .collect();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }
}

/// In-memory [`CookieBridge`] keyed by domain.
#[derive(Debug, Default)]
pub struct SharedCookieService {
    domains: DashMap<String, Vec<Cookie>>,
}

impl SharedCookieService {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cookies held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.iter().map(|entry| entry.value().len()).sum()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, cookie: Cookie, now: u64) {
        let mut entry = self.domains.entry(cookie.domain.clone()).or_default();
        entry.retain(|existing| !existing.same_slot(&cookie));
        if !cookie.is_expired(now) {
            entry.push(cookie);
        }
    }
}

impl CookieBridge for SharedCookieService {
    fn cookies_for(&self, url: &Url) -> Vec<Cookie> {
        let now = unix_now();
        let mut matched: Vec<Cookie> = self
            .domains
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|c| c.matches(url, now))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        // longer paths first, as browsers order them
        matched.sort_by(|a, b| b.path.len().cmp(&a.path.len()).then(a.name.cmp(&b.name)));
        trace!(url = %url, count = matched.len(), "cookies matched");
        matched
    }

    fn store(&self, url: &Url, cookies: Vec<Cookie>) {
        let now = unix_now();
        debug!(host = url.host_str().unwrap_or(""), count = cookies.len(), "storing cookies");
        for cookie in cookies {
            self.insert(cookie, now);
        }
    }

    fn remove_for(&self, url: &Url) {
        let now = unix_now();
        for mut entry in self.domains.iter_mut() {
            entry.value_mut().retain(|c| !c.matches(url, now));
        }
    }

    fn get_all(&self) -> Vec<Cookie> {
        let mut all: Vec<Cookie> = self
            .domains
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.domain.cmp(&b.domain).then(a.name.cmp(&b.name)));
        all
    }

    fn set_all(&self, cookies: Vec<Cookie>) {
        let now = unix_now();
        self.domains.clear();
        for cookie in cookies {
            self.insert(cookie, now);
        }
    }
}

/// Parses a `Set-Cookie` header received from `url`.
///
/// Returns `None` for headers without a name, and for `Domain` attributes that do
/// not cover the responding host.
#[must_use]
pub fn parse_set_cookie(raw: &str, url: &Url) -> Option<Cookie> {
    let host = url.host_str()?.to_ascii_lowercase();
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie::new(&host, "/", name, value.trim()).with_host_only(true);
    let mut max_age: Option<i64> = None;
    let mut expires: Option<u64> = None;

    for attribute in parts {
        let (key, val) = attribute
            .split_once('=')
            .map_or((attribute.trim(), ""), |(k, v)| (k.trim(), v.trim()));
        match key.to_ascii_lowercase().as_str() {
            "domain" if !val.is_empty() => {
                let domain = normalize_domain(val);
                if host != domain && !host.ends_with(&format!(".{domain}")) {
                    return None;
                }
                cookie.domain = domain;
                cookie.host_only = false;
            }
            "path" if val.starts_with('/') => cookie.path = val.to_string(),
            "secure" => cookie.secure = true,
            "max-age" => max_age = val.parse().ok(),
            "expires" => {
                expires = httpdate::parse_http_date(val)
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs());
            }
            _ => {}
        }
    }

    cookie.expires = match max_age {
        Some(secs) if secs <= 0 => Some(0),
        Some(secs) => Some(unix_now().saturating_add(secs.unsigned_abs())),
        None => expires,
    };
    Some(cookie)
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_cookie_matches_subdomains_unless_host_only() {
        let now = unix_now();
        let cookie = Cookie::new(".tumblr.com", "/", "pfg", "1");
        assert!(cookie.matches(&url("https://www.tumblr.com/"), now));
        assert!(cookie.matches(&url("https://tumblr.com/dashboard"), now));
        assert!(!cookie.matches(&url("https://nottumblr.com/"), now));

        let host_only = cookie.clone().with_host_only(true);
        assert!(!host_only.matches(&url("https://www.tumblr.com/"), now));
    }

    #[test]
    fn test_secure_and_path_scoping() {
        let now = unix_now();
        let cookie = Cookie::new("example.com", "/svc", "k", "v").with_secure(true);
        assert!(cookie.matches(&url("https://example.com/svc/indash"), now));
        assert!(!cookie.matches(&url("http://example.com/svc/indash"), now));
        assert!(!cookie.matches(&url("https://example.com/other"), now));
    }

    #[test]
    fn test_expired_cookie_not_sent() {
        let cookie = Cookie::new("example.com", "/", "k", "v").with_expires(Some(10));
        assert!(!cookie.matches(&url("https://example.com/"), 11));
        assert!(cookie.matches(&url("https://example.com/"), 9));
    }

    #[test]
    fn test_get_all_set_all_round_trip_replaces_store() {
        let service = SharedCookieService::new();
        service.set_all(vec![
            Cookie::new("a.com", "/", "one", "1"),
            Cookie::new("b.com", "/", "two", "2"),
        ]);
        assert_eq!(service.len(), 2);

        service.set_all(vec![Cookie::new("c.com", "/", "three", "3")]);
        let all = service.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "three");
    }

    #[test]
    fn test_store_replaces_same_name_and_path() {
        let service = SharedCookieService::new();
        let origin = url("https://www.tumblr.com/");
        service.store(&origin, vec![Cookie::new("tumblr.com", "/", "pfg", "old")]);
        service.store(&origin, vec![Cookie::new("tumblr.com", "/", "pfg", "new")]);
        let all = service.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value(), "new");
    }

    #[test]
    fn test_remove_for_expires_matching_cookies() {
        let service = SharedCookieService::new();
        service.set_all(vec![
            Cookie::new("tumblr.com", "/", "pfg", "1"),
            Cookie::new("example.com", "/", "other", "2"),
        ]);
        service.remove_for(&url("https://www.tumblr.com/"));
        let names: Vec<_> = service.get_all().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["other".to_string()]);
    }

    #[test]
    fn test_header_for_joins_pairs() {
        let service = SharedCookieService::new();
        service.set_all(vec![
            Cookie::new("tumblr.com", "/", "a", "1"),
            Cookie::new("tumblr.com", "/", "b", "2"),
        ]);
        assert_eq!(
            service.header_for(&url("https://www.tumblr.com/")).as_deref(),
            Some("a=1; b=2")
        );
        assert_eq!(service.header_for(&url("https://example.com/")), None);
    }

    #[test]
    fn test_parse_set_cookie_attributes() {
        let origin = url("https://www.tumblr.com/login");
        let cookie = parse_set_cookie(
            "pfg=abc; Domain=.tumblr.com; Path=/; Secure; HttpOnly",
            &origin,
        )
        .unwrap();
        assert_eq!(cookie.domain, "tumblr.com");
        assert!(!cookie.host_only);
        assert!(cookie.secure);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.expires, None);
    }

    #[test]
    fn test_parse_set_cookie_defaults_to_host_only() {
        let cookie = parse_set_cookie("sid=1", &url("https://www.tumblr.com/")).unwrap();
        assert_eq!(cookie.domain, "www.tumblr.com");
        assert!(cookie.host_only);
        assert_eq!(cookie.path, "/");
    }

    #[test]
    fn test_parse_set_cookie_rejects_foreign_domain() {
        assert!(parse_set_cookie("x=1; Domain=evil.com", &url("https://www.tumblr.com/")).is_none());
        assert!(parse_set_cookie("=1", &url("https://www.tumblr.com/")).is_none());
    }

    #[test]
    fn test_parse_set_cookie_expiry() {
        let origin = url("https://example.com/");
        let expired = parse_set_cookie("x=1; Max-Age=0", &origin).unwrap();
        assert!(expired.is_expired(unix_now()));

        let dated = parse_set_cookie("x=1; Expires=Wed, 21 Oct 2015 07:28:00 GMT", &origin).unwrap();
        assert_eq!(dated.expires, Some(1_445_412_480));
    }

    #[test]
    fn test_store_drops_expired_cookie() {
        let service = SharedCookieService::new();
        let origin = url("https://example.com/");
        service.store(&origin, vec![Cookie::new("example.com", "/", "x", "1")]);
        service.store(&origin, vec![parse_set_cookie("x=; Max-Age=0", &origin).unwrap()]);
        assert!(service.is_empty());
    }

    #[test]
    fn test_cookie_debug_redacts_value() {
        let cookie = Cookie::new("example.com", "/", "session", "supersecret");
        let rendered = format!("{cookie:?}");
        assert!(!rendered.contains("supersecret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
