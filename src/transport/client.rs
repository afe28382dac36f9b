//! Request building and sending for pages, API lookups and media transfers.
//!
//! [`HttpClient`] wraps a pooled `reqwest::Client` and injects the configured
//! user-agent, proxy, referer, extra headers and cookies into every request. All
//! clones share the same connection pool, the same process-wide connection ceiling
//! and the same bandwidth budget.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{
    ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, REFERER,
    SET_COOKIE, USER_AGENT,
};
use reqwest::{Client, Method, Proxy, RequestBuilder, Response, redirect};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument, trace};
use url::Url;

use super::error::TransportError;
use super::throttle::{ByteStream, ThrottleBudget, with_read_timeout};
use crate::auth::{CookieBridge, parse_set_cookie};
use crate::config::AppSettings;

/// Accept header sent with XHR requests.
const XHR_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";

/// Per-request options layered on top of the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// `Referer` header.
    pub referer: Option<String>,
    /// Extra headers, applied in order.
    pub headers: Vec<(String, String)>,
    /// Additional origins whose cookies are attached besides the request URL's own.
    pub cookie_hosts: Vec<String>,
    /// Mark the request as an XMLHttpRequest.
    pub xhr: bool,
}

impl RequestOptions {
    /// Options for an XHR request.
    #[must_use]
    pub fn xhr() -> Self {
        Self {
            xhr: true,
            ..Self::default()
        }
    }

    /// Adds an extra header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the referer.
    #[must_use]
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }
}

/// HTTP client shared by the crawler, extractors and downloader.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    probe: Client,
    user_agent: String,
    cookies: Option<Arc<dyn CookieBridge>>,
    connections: Arc<Semaphore>,
    budget: ThrottleBudget,
    limit_scan_bandwidth: bool,
    timeout: Duration,
}

impl HttpClient {
    /// Builds a client from the settings snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] when the proxy or TLS backend cannot be set up.
    pub fn new(
        settings: &AppSettings,
        cookies: Option<Arc<dyn CookieBridge>>,
    ) -> Result<Self, TransportError> {
        let client = build_client(settings, redirect::Policy::default())?;
        let probe = build_client(settings, redirect::Policy::none())?;
        debug!(
            connections = settings.concurrent_connections,
            bandwidth_kb_per_sec = settings.bandwidth_kb_per_sec,
            proxy = settings.proxy.is_some(),
            "HTTP client ready"
        );
        Ok(Self {
            client,
            probe,
            user_agent: settings.user_agent.clone(),
            cookies,
            connections: Arc::new(Semaphore::new(settings.concurrent_connections.max(1) as usize)),
            budget: settings.throttle_budget(),
            limit_scan_bandwidth: settings.limit_scan_bandwidth,
            timeout: settings.timeout(),
        })
    }

    /// Timeout applied to each send and each body read.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The cookie bridge attached to this client, if any.
    #[must_use]
    pub fn cookie_bridge(&self) -> Option<&Arc<dyn CookieBridge>> {
        self.cookies.as_ref()
    }

    /// Waits for one of the process-wide connection slots.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::LimiterClosed`] if the limiter was shut down.
    pub async fn acquire_connection(&self) -> Result<OwnedSemaphorePermit, TransportError> {
        Arc::clone(&self.connections)
            .acquire_owned()
            .await
            .map_err(|_| TransportError::LimiterClosed)
    }

    /// Builds a request with user-agent, referer, extra headers and cookies applied.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] for a malformed or non-http(s) URL and
    /// [`TransportError::InvalidHeader`] for an unusable header.
    pub fn request(
        &self,
        method: Method,
        url: &str,
        options: &RequestOptions,
    ) -> Result<RequestBuilder, TransportError> {
        self.request_with(&self.client, method, url, options)
    }

    fn request_with(
        &self,
        client: &Client,
        method: Method,
        url: &str,
        options: &RequestOptions,
    ) -> Result<RequestBuilder, TransportError> {
        let parsed = parse_http_url(url)?;
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value(USER_AGENT.as_str(), &self.user_agent)?);
        if let Some(referer) = options.referer.as_deref().filter(|r| !r.is_empty()) {
            headers.insert(REFERER, header_value(REFERER.as_str(), referer)?);
        }
        if options.xhr {
            headers.insert(
                HeaderName::from_static("x-requested-with"),
                HeaderValue::from_static("XMLHttpRequest"),
            );
            headers.insert(ACCEPT, HeaderValue::from_static(XHR_ACCEPT));
        }
        for (name, value) in &options.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TransportError::InvalidHeader { name: name.clone() })?;
            headers.insert(header_name, header_value(name, value)?);
        }
        if let Some(cookie) = self.cookie_header(&parsed, &options.cookie_hosts) {
            headers.insert(COOKIE, header_value(COOKIE.as_str(), &cookie)?);
        }

        Ok(client.request(method, parsed).headers(headers))
    }

    fn cookie_header(&self, url: &Url, extra_hosts: &[String]) -> Option<String> {
        let bridge = self.cookies.as_ref()?;
        let mut pairs: Vec<String> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let extra = extra_hosts.iter().filter_map(|h| Url::parse(h).ok());
        for target in std::iter::once(url.clone()).chain(extra) {
            for cookie in bridge.cookies_for(&target) {
                if seen.insert(cookie.name.clone()) {
                    pairs.push(format!("{}={}", cookie.name, cookie.value()));
                }
            }
        }
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }

    /// Sends a request, storing any returned cookies, without checking the status.
    ///
    /// # Errors
    ///
    /// Returns a classified [`TransportError`]; no response within the timeout is
    /// [`TransportError::Timeout`].
    pub async fn execute(&self, request: RequestBuilder, url: &str) -> Result<Response, TransportError> {
        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| TransportError::timeout(url))?
            .map_err(|e| TransportError::from_reqwest(url, e))?;
        self.store_cookies(&response);
        trace!(url, status = response.status().as_u16(), "response received");
        Ok(response)
    }

    /// Sends a request and fails on any non-success status.
    ///
    /// # Errors
    ///
    /// As [`Self::execute`], plus [`TransportError::AuthRequired`] for 401/403/407 and
    /// [`TransportError::HttpStatus`] for any other non-success status.
    pub async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, TransportError> {
        let response = self.execute(request, url).await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(TransportError::status(url, response.status().as_u16()))
        }
    }

    fn store_cookies(&self, response: &Response) {
        let Some(bridge) = &self.cookies else {
            return;
        };
        let cookies: Vec<_> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|raw| parse_set_cookie(raw, response.url()))
            .collect();
        if !cookies.is_empty() {
            bridge.store(response.url(), cookies);
        }
    }

    /// Fetches a page or API document as text.
    ///
    /// Holds a connection slot for the whole exchange. The body passes through the
    /// bandwidth wrapper only when scan-bandwidth limiting is enabled.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] for send failures, non-success statuses and body
    /// read failures or timeouts.
    #[instrument(skip(self, options), fields(xhr = options.xhr))]
    pub async fn get_text(&self, url: &str, options: &RequestOptions) -> Result<String, TransportError> {
        let _slot = self.acquire_connection().await?;
        let request = self.request(Method::GET, url, options)?;
        let response = self.send(request, url).await?;
        let body = read_body(self.wrap_for_api_request(self.body_stream(response, url))).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Posts a URL-encoded form and returns the response text.
    ///
    /// # Errors
    ///
    /// As [`Self::get_text`].
    #[instrument(skip(self, options, params), fields(xhr = options.xhr))]
    pub async fn post_form(
        &self,
        url: &str,
        options: &RequestOptions,
        params: &[(&str, &str)],
    ) -> Result<String, TransportError> {
        let _slot = self.acquire_connection().await?;
        let request = self
            .request(Method::POST, url, options)?
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded; charset=UTF-8"),
            )
            .body(url_encode(params));
        let response = self.send(request, url).await?;
        let body = read_body(self.wrap_for_api_request(self.body_stream(response, url))).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Reports the remote size from a HEAD request's `Content-Length`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the HEAD request fails.
    #[instrument(skip(self, options))]
    pub async fn content_length(&self, url: &str, options: &RequestOptions) -> Result<Option<u64>, TransportError> {
        let _slot = self.acquire_connection().await?;
        let request = self.request(Method::HEAD, url, options)?;
        let response = self.send(request, url).await?;
        Ok(header_content_length(&response))
    }

    /// Whether `url` answers a HEAD request, without following redirects, with success.
    #[instrument(skip(self))]
    pub async fn remote_page_is_valid(&self, url: &str) -> bool {
        let Ok(_slot) = self.acquire_connection().await else {
            return false;
        };
        let Ok(request) = self.request_with(&self.probe, Method::HEAD, url, &RequestOptions::default()) else {
            return false;
        };
        match self.execute(request, url).await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "remote page probe failed");
                false
            }
        }
    }

    /// Follows redirects from `url` and returns the final location.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the request cannot be sent.
    #[instrument(skip(self, options))]
    pub async fn final_url(&self, url: &str, options: &RequestOptions) -> Result<Url, TransportError> {
        let _slot = self.acquire_connection().await?;
        let request = self.request(Method::GET, url, options)?;
        let response = self.execute(request, url).await?;
        Ok(response.url().clone())
    }

    /// Response body as a [`ByteStream`] whose every network read is bounded by
    /// [`Self::timeout`]. Throttle it afterwards, never before.
    #[must_use]
    pub fn body_stream(&self, response: Response, url: &str) -> ByteStream {
        with_read_timeout(byte_stream(response, url), self.timeout, url)
    }

    /// Applies the media bandwidth budget to `stream`.
    #[must_use]
    pub fn wrap_for_bandwidth(&self, stream: ByteStream) -> ByteStream {
        self.budget.wrap(stream)
    }

    /// Applies the bandwidth budget to page/API bodies only when scan limiting is on.
    #[must_use]
    pub fn wrap_for_api_request(&self, stream: ByteStream) -> ByteStream {
        if self.limit_scan_bandwidth {
            self.budget.wrap(stream)
        } else {
            stream
        }
    }
}

async fn read_body(mut stream: ByteStream) -> Result<Vec<u8>, TransportError> {
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk?);
    }
    Ok(body)
}

/// Turns a response body into a [`ByteStream`] with transport-classified errors.
#[must_use]
pub fn byte_stream(response: Response, url: &str) -> ByteStream {
    let url = url.to_string();
    response
        .bytes_stream()
        .map(move |chunk| chunk.map_err(|e| TransportError::from_reqwest(&url, e)))
        .boxed()
}

/// Reads `Content-Length` from the headers (reqwest reports 0 for HEAD bodies).
#[must_use]
pub fn header_content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Encodes `params` as an `application/x-www-form-urlencoded` body.
#[must_use]
pub fn url_encode(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn parse_http_url(url: &str) -> Result<Url, TransportError> {
    let parsed = Url::parse(url).map_err(|_| TransportError::invalid_url(url))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(TransportError::invalid_url(url));
    }
    Ok(parsed)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value).map_err(|_| TransportError::InvalidHeader {
        name: name.to_string(),
    })
}

fn build_client(settings: &AppSettings, policy: redirect::Policy) -> Result<Client, TransportError> {
    let mut builder = Client::builder()
        .connect_timeout(settings.timeout())
        .gzip(true)
        .redirect(policy)
        .pool_max_idle_per_host(settings.concurrent_connections.max(1) as usize)
        .user_agent(settings.user_agent.clone());
    if let Some(proxy) = &settings.proxy {
        let mut resolved =
            Proxy::all(proxy.url()).map_err(|source| TransportError::Client { source })?;
        if let Some(username) = &proxy.username {
            resolved = resolved.basic_auth(username, proxy.password.as_deref().unwrap_or(""));
        }
        builder = builder.proxy(resolved);
    }
    builder
        .build()
        .map_err(|source| TransportError::Client { source })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::{Cookie, SharedCookieService};
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn settings() -> AppSettings {
        AppSettings {
            timeout_secs: 5,
            ..AppSettings::default()
        }
    }

    #[test]
    fn test_url_encode_escapes_reserved_characters() {
        let body = url_encode(&[("form_key", "a b&c"), ("name", "blog")]);
        assert_eq!(body, "form_key=a%20b%26c&name=blog");
    }

    #[test]
    fn test_malformed_url_is_invalid_url() {
        let client = HttpClient::new(&settings(), None).unwrap();
        let err = client
            .request(Method::GET, "not a url", &RequestOptions::default())
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl { .. }));
        assert!(err.is_configuration());

        let err = client
            .request(Method::GET, "ftp://example.com/file", &RequestOptions::default())
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl { .. }));
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let client = HttpClient::new(&settings(), None).unwrap();
        let options = RequestOptions::default().with_header("bad header", "x");
        let err = client
            .request(Method::GET, "https://example.com", &options)
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidHeader { .. }));
    }

    #[tokio::test]
    async fn test_get_text_sends_configured_headers() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let mut settings = settings();
        settings.user_agent = "blogfetch-test/1.0".to_string();
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("user-agent", "blogfetch-test/1.0"))
            .and(header("referer", "https://ref.example/"))
            .and(header("x-requested-with", "XMLHttpRequest"))
            .and(header("x-extra", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(&settings, None).unwrap();
        let options = RequestOptions::xhr()
            .with_referer("https://ref.example/")
            .with_header("x-extra", "1");
        let body = client
            .get_text(&format!("{}/page", server.uri()), &options)
            .await
            .unwrap();
        assert_eq!(body, "hello");
    }

    #[tokio::test]
    async fn test_get_text_maps_status_errors() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/private"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = HttpClient::new(&settings(), None).unwrap();
        let options = RequestOptions::default();
        let missing = client
            .get_text(&format!("{}/missing", server.uri()), &options)
            .await
            .unwrap_err();
        assert!(matches!(missing, TransportError::HttpStatus { status: 404, .. }));
        let private = client
            .get_text(&format!("{}/private", server.uri()), &options)
            .await
            .unwrap_err();
        assert!(matches!(private, TransportError::AuthRequired { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_slow_response_times_out_as_retryable() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let settings = AppSettings {
            timeout_secs: 1,
            ..AppSettings::default()
        };
        let client = HttpClient::new(&settings, None).unwrap();
        let err = client
            .get_text(&format!("{}/slow", server.uri()), &RequestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_post_form_sends_encoded_body() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("POST"))
            .and(path("/svc"))
            .and(header(
                "content-type",
                "application/x-www-form-urlencoded; charset=UTF-8",
            ))
            .and(body_string("q=a%20b&page=2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(&settings(), None).unwrap();
        let body = client
            .post_form(
                &format!("{}/svc", server.uri()),
                &RequestOptions::xhr(),
                &[("q", "a b"), ("page", "2")],
            )
            .await
            .unwrap();
        assert_eq!(body, "{}");
    }

    #[tokio::test]
    async fn test_cookies_attached_and_stored() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/login"))
            .and(header("cookie", "pfg=abc"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("set-cookie", "session=xyz; Path=/"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cookies = Arc::new(SharedCookieService::new());
        let base = Url::parse(&server.uri()).unwrap();
        cookies.set_all(vec![Cookie::new(
            base.host_str().unwrap(),
            "/",
            "pfg",
            "abc",
        )]);
        let bridge: Arc<dyn CookieBridge> = cookies.clone();
        let client = HttpClient::new(&settings(), Some(bridge)).unwrap();
        client
            .get_text(&format!("{}/login", server.uri()), &RequestOptions::default())
            .await
            .unwrap();

        let names: Vec<_> = cookies.get_all().into_iter().map(|c| c.name).collect();
        assert!(names.contains(&"session".to_string()), "stored: {names:?}");
    }

    #[tokio::test]
    async fn test_remote_page_is_valid_does_not_follow_redirects() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("HEAD"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/moved"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", format!("{}/ok", server.uri())),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new(&settings(), None).unwrap();
        assert!(client.remote_page_is_valid(&format!("{}/ok", server.uri())).await);
        assert!(!client.remote_page_is_valid(&format!("{}/moved", server.uri())).await);
        assert!(!client.remote_page_is_valid("not a url").await);
    }

    #[tokio::test]
    async fn test_final_url_follows_redirects() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/login_required/blog", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/login_required/blog"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = HttpClient::new(&settings(), None).unwrap();
        let location = client
            .final_url(&format!("{}/start", server.uri()), &RequestOptions::default())
            .await
            .unwrap();
        assert!(location.path().contains("login_required"));
    }
}
