//! Network access for the worker
//!
//! The worker only talks to the network through the [`Network`] trait so the
//! caching strategies can be exercised against a scripted network in tests.
//! [`HttpNetwork`] is the reqwest-backed implementation used by the CLI.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::{Client, Url};
use thiserror::Error;

use crate::http::{same_origin, CacheMode, Method, Request, Response, ResponseKind};

/// Errors that can occur when fetching from the network
#[derive(Debug, Error)]
pub enum NetworkError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Method could not be expressed as an HTTP method
    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    /// No network connection is available
    #[error("Network unavailable")]
    Offline,
}

/// Anything that can turn a request into a response over the network
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request, cache_mode: CacheMode)
        -> Result<Response, NetworkError>;
}

/// Network implementation backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
    /// Origin of the controlled pages, used to classify responses
    origin: Url,
}

impl HttpNetwork {
    pub fn new(origin: Url) -> Self {
        Self {
            client: Client::new(),
            origin,
        }
    }

    fn classify(&self, final_url: &Url) -> ResponseKind {
        if same_origin(&self.origin, final_url) {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(
        &self,
        request: &Request,
        cache_mode: CacheMode,
    ) -> Result<Response, NetworkError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|_| NetworkError::InvalidMethod(request.method.as_str().to_string()))?;

        let mut builder = self.client.request(method, request.url.clone());
        if cache_mode == CacheMode::Reload {
            builder = builder
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache");
        }

        let response = builder.send().await?;
        let status = response.status();
        let kind = self.classify(response.url());
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = if request.method == Method::Head {
            Vec::new()
        } else {
            response.bytes().await?.to_vec()
        };

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            kind,
            headers,
            body,
        })
    }
}

/// In-memory network answering from a fixed route table
///
/// Unknown URLs answer 404. While offline every fetch fails with
/// [`NetworkError::Offline`]. Every call is recorded so callers can assert on
/// how often the network was hit.
#[derive(Debug, Default)]
pub struct StubNetwork {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    calls: Mutex<Vec<(String, CacheMode)>>,
}

impl StubNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `response` for `url` from now on
    pub fn route(&self, url: &str, response: Response) {
        lock(&self.routes).insert(url.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of fetches issued for `url`
    pub fn hits(&self, url: &str) -> usize {
        lock(&self.calls).iter().filter(|(u, _)| u == url).count()
    }

    /// Every fetch issued so far, in order
    pub fn calls(&self) -> Vec<(String, CacheMode)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Network for StubNetwork {
    async fn fetch(
        &self,
        request: &Request,
        cache_mode: CacheMode,
    ) -> Result<Response, NetworkError> {
        let url = request.url.to_string();
        lock(&self.calls).push((url.clone(), cache_mode));
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Offline);
        }
        Ok(lock(&self.routes)
            .get(&url)
            .cloned()
            .unwrap_or_else(|| Response::new(404, "")))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_network_serves_routes_and_404() {
        let network = StubNetwork::new();
        network.route("http://localhost/a", Response::new(200, "a"));

        let a = Request::get(Url::parse("http://localhost/a").unwrap());
        let b = Request::get(Url::parse("http://localhost/b").unwrap());

        assert_eq!(network.fetch(&a, CacheMode::Default).await.unwrap().body, b"a");
        assert_eq!(network.fetch(&b, CacheMode::Default).await.unwrap().status, 404);
        assert_eq!(network.hits("http://localhost/a"), 1);
    }

    #[tokio::test]
    async fn test_stub_network_offline_fails() {
        let network = StubNetwork::new();
        network.route("http://localhost/a", Response::new(200, "a"));
        network.set_offline(true);

        let a = Request::get(Url::parse("http://localhost/a").unwrap());
        assert!(matches!(
            network.fetch(&a, CacheMode::Reload).await,
            Err(NetworkError::Offline)
        ));
        assert_eq!(
            network.calls(),
            vec![("http://localhost/a".to_string(), CacheMode::Reload)]
        );
    }

    #[test]
    fn test_classify_same_origin_is_basic() {
        let network = HttpNetwork::new(Url::parse("http://localhost:8080/").unwrap());
        let kind = network.classify(&Url::parse("http://localhost:8080/app.js").unwrap());
        assert_eq!(kind, ResponseKind::Basic);
    }

    #[test]
    fn test_classify_cross_origin_is_cors() {
        let network = HttpNetwork::new(Url::parse("http://localhost:8080/").unwrap());
        let kind = network.classify(&Url::parse("https://cdn.example.com/lib.js").unwrap());
        assert_eq!(kind, ResponseKind::Cors);
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host_fails() {
        let origin = Url::parse("http://127.0.0.1:9/").unwrap();
        let network = HttpNetwork::new(origin.clone());
        let result = network
            .fetch(&Request::get(origin), CacheMode::Reload)
            .await;
        assert!(matches!(result, Err(NetworkError::RequestFailed(_))));
    }
}
