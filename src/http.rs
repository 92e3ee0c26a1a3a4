//! Request and response types seen by the worker
//!
//! These mirror the parts of a fetch request/response the caching strategies
//! care about: method, URL, request mode, status, response kind and body.

use reqwest::Url;
use serde::{Deserialize, Serialize};

/// HTTP method of an intercepted request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Other(String),
}

impl Method {
    /// Parses a method name case-insensitively
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "PATCH" => Method::Patch,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Other(name) => name,
        }
    }
}

/// How the page issued the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestMode {
    /// Loading a full HTML document
    Navigate,
    SameOrigin,
    Cors,
    NoCors,
}

/// HTTP cache behaviour requested for an outgoing network fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Default,
    /// Bypass any intermediate HTTP cache
    Reload,
}

/// An outgoing request from a controlled page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
}

impl Request {
    /// A GET subresource request
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            mode: RequestMode::Cors,
        }
    }

    /// A GET request for a full page load
    pub fn navigate(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            mode: RequestMode::Navigate,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Cache key for this request: the URL without its fragment
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.to_string()
    }
}

/// Origin classification of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    /// Same-origin response
    Basic,
    /// Cross-origin response with CORS headers
    Cors,
    /// Cross-origin response the page cannot read
    Opaque,
    /// Network failure
    Error,
}

/// A response handed back to the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub kind: ResponseKind,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: default_status_text(status).to_string(),
            kind: ResponseKind::Basic,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_kind(mut self, kind: ResponseKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Synthetic response used when neither network nor cache can answer
    pub fn service_unavailable() -> Self {
        Self::new(503, "Offline - resource not available")
            .with_header("content-type", "text/plain; charset=utf-8")
    }

    /// A failed fetch surfaced to the page as a response
    pub fn network_error() -> Self {
        Self {
            status: 0,
            status_text: String::new(),
            kind: ResponseKind::Error,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Status in the 200-299 range
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_network_error(&self) -> bool {
        self.kind == ResponseKind::Error
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn default_status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        304 => "Not Modified",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// Returns true if both URLs share scheme, host and port
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_method_parse_is_case_insensitive() {
        assert_eq!(Method::from_str("get"), Method::Get);
        assert_eq!(Method::from_str("Post"), Method::Post);
        assert_eq!(Method::from_str("purge"), Method::Other("PURGE".to_string()));
        assert_eq!(Method::from_str("purge").as_str(), "PURGE");
    }

    #[test]
    fn test_cache_key_drops_fragment() {
        let req = Request::get(url("http://localhost:8080/index.html#top"));
        assert_eq!(req.cache_key(), "http://localhost:8080/index.html");
    }

    #[test]
    fn test_navigate_request_is_navigation() {
        assert!(Request::navigate(url("http://localhost/")).is_navigation());
        assert!(!Request::get(url("http://localhost/")).is_navigation());
    }

    #[test]
    fn test_service_unavailable_is_503() {
        let resp = Response::service_unavailable();
        assert_eq!(resp.status, 503);
        assert_eq!(resp.status_text, "Service Unavailable");
        assert!(!resp.ok());
    }

    #[test]
    fn test_network_error_response() {
        let resp = Response::network_error();
        assert_eq!(resp.status, 0);
        assert!(resp.is_network_error());
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let resp = Response::new(200, "x").with_header("Content-Type", "text/html");
        assert_eq!(resp.header("content-type"), Some("text/html"));
        assert_eq!(resp.header("etag"), None);
    }

    #[test]
    fn test_same_origin() {
        assert!(same_origin(&url("http://a.test/x"), &url("http://a.test/y")));
        assert!(!same_origin(&url("http://a.test/"), &url("https://a.test/")));
        assert!(!same_origin(&url("http://a.test/"), &url("http://b.test/")));
    }
}
