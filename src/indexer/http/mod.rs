//! Outbound HTTP model
//!
//! [`RequestDescriptor`] is what adapters build and the executor sends;
//! [`RawResponse`] is what comes back. Both are plain values so a request can
//! be compared, logged and replayed.

pub mod executor;
pub mod rate_limiter;

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use serde::Serialize;
use url::Url;

use super::session::CookieJar;
use crate::error::{IndexerError, Result};

pub use executor::{HttpExecutor, HttpTransport, ReqwestTransport, RetryConfig};
pub use rate_limiter::RateLimiterPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Head,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Head => write!(f, "HEAD"),
        }
    }
}

/// A fully formed outbound request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: HttpMethod,
    /// Header name/value pairs in insertion order
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub cookies: CookieJar,
    /// Falls back to the executor default when unset
    pub timeout: Option<Duration>,
    pub allow_redirect: bool,
    /// Return non-2xx responses instead of failing
    pub suppress_http_error: bool,
    pub keep_alive: bool,
    /// Merge `Set-Cookie` values from the response into the indexer session
    pub store_response_cookies: bool,
    pub log_response_content: bool,
    /// Short description used in logs instead of the body
    pub content_summary: Option<String>,
    /// Overrides the indexer's minimum request interval for this request
    pub rate_limit: Option<Duration>,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: vec![],
            body: None,
            cookies: CookieJar::new(),
            timeout: None,
            allow_redirect: true,
            suppress_http_error: false,
            keep_alive: true,
            store_response_cookies: false,
            log_response_content: false,
            content_summary: None,
            rate_limit: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    /// Set a header, replacing an existing one with the same (case-insensitive) name
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn accept(self, accept: &str) -> Self {
        self.header("Accept", accept)
    }

    /// URL-encoded form body
    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields.iter())
            .finish();
        self.body = Some(encoded.into_bytes());
        self.header("Content-Type", "application/x-www-form-urlencoded")
    }

    pub fn json_body(mut self, body: &serde_json::Value) -> Self {
        self.body = Some(body.to_string().into_bytes());
        self.header("Content-Type", "application/json")
    }

    pub fn basic_auth(self, username: &str, password: &str) -> Self {
        let token =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password));
        self.header("Authorization", format!("Basic {}", token))
    }

    pub fn cookies(mut self, cookies: CookieJar) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn allow_redirect(mut self, allow: bool) -> Self {
        self.allow_redirect = allow;
        self
    }

    pub fn suppress_http_error(mut self, suppress: bool) -> Self {
        self.suppress_http_error = suppress;
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn store_response_cookies(mut self, store: bool) -> Self {
        self.store_response_cookies = store;
        self
    }

    pub fn log_response_content(mut self, log: bool) -> Self {
        self.log_response_content = log;
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.content_summary = Some(summary.into());
        self
    }

    pub fn rate_limit(mut self, interval: Duration) -> Self {
        self.rate_limit = Some(interval);
        self
    }

    /// Copy of this request carrying `session` cookies underneath its own
    pub fn with_session_cookies(&self, session: &CookieJar) -> Self {
        let mut request = self.clone();
        let mut merged = session.clone();
        merged.extend(self.cookies.iter().map(|(k, v)| (k.clone(), v.clone())));
        request.cookies = merged;
        request
    }

    /// `Cookie` header value, `None` when there are no cookies
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Req: [{}] {}", self.method, self.url)?;
        if let Some(ref summary) = self.content_summary {
            if !summary.trim().is_empty() {
                write!(f, ": {}", summary)?;
            }
        }
        Ok(())
    }
}

/// Append query parameters to `base`, in the order given
pub fn url_with_query(base: &str, params: &[(&str, &str)]) -> Result<String> {
    let mut url = Url::parse(base)
        .map_err(|e| IndexerError::InvalidRequest(format!("invalid url '{}': {}", base, e)))?;
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params.iter());
    }
    Ok(url.to_string())
}

/// Join a site-relative path onto a base URL
pub fn join_url(base: &str, path: &str) -> Result<String> {
    let base = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    };
    Url::parse(&base)
        .and_then(|b| b.join(path.trim_start_matches('/')))
        .map(|u| u.to_string())
        .map_err(|e| IndexerError::InvalidRequest(format!("invalid url '{}{}': {}", base, path, e)))
}

/// Extract `name=value` from a `Set-Cookie` header
pub fn parse_set_cookie(value: &str) -> Option<(String, String)> {
    let pair = value.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// A response as received, before any adapter interpretation
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// Lowercased header names
    pub headers: Vec<(String, String)>,
    /// Cookies set by this response
    pub cookies: CookieJar,
    pub body: Vec<u8>,
    pub request: Arc<RequestDescriptor>,
}

impl RawResponse {
    pub fn new(request: Arc<RequestDescriptor>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: vec![],
            cookies: CookieJar::new(),
            body: body.into(),
            request,
        }
    }

    /// Add a header; `Set-Cookie` values are also collected into `cookies`
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name == "set-cookie" {
            if let Some((k, v)) = parse_set_cookie(value) {
                self.cookies.insert(k, v);
            }
        }
        self.headers.push((name, value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
