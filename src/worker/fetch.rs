//! Fetch interception strategies

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::CacheManager;
use crate::config::FetchStrategy;
use crate::http::{same_origin, CacheMode, Method, Request, Response, ResponseKind};
use crate::network::Network;

/// Where an intercepted response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Fresh from the network
    Network,
    /// From the current bucket
    Cache,
    /// The cached shell document served to a navigation
    Fallback,
    /// Generated by the worker
    Synthetic,
    /// Request was not eligible for caching and went straight to the network
    Passthrough,
    /// Network failed and nothing could stand in for it
    Failed,
}

/// The response to one intercepted request
#[derive(Debug)]
pub struct FetchOutcome {
    pub response: Response,
    pub source: ResponseSource,
    /// Background cache refresh started by a cache hit, if any
    pub revalidation: Option<JoinHandle<()>>,
}

impl FetchOutcome {
    fn new(response: Response, source: ResponseSource) -> Self {
        Self {
            response,
            source,
            revalidation: None,
        }
    }
}

/// Sends a request to the network unmodified
pub async fn pass_through(network: &dyn Network, request: &Request) -> FetchOutcome {
    match network.fetch(request, CacheMode::Default).await {
        Ok(response) => FetchOutcome::new(response, ResponseSource::Passthrough),
        Err(e) => {
            debug!(url = %request.url, error = %e, "pass-through fetch failed");
            FetchOutcome::new(Response::network_error(), ResponseSource::Failed)
        }
    }
}

/// Only complete same-origin responses are stored
fn is_cacheable(response: &Response) -> bool {
    response.status == 200 && response.kind == ResponseKind::Basic
}

impl CacheManager {
    /// Resolves an intercepted request to a response
    ///
    /// Non-GET and cross-origin requests bypass the bucket entirely. Every
    /// path resolves to a response; network failures with no fallback become
    /// a 503 under network-first and a network-error response under
    /// cache-first.
    pub async fn fetch(&self, request: Request) -> FetchOutcome {
        if request.method != Method::Get || !same_origin(&self.origin, &request.url) {
            return pass_through(self.network.as_ref(), &request).await;
        }

        match self.config.strategy {
            FetchStrategy::NetworkFirst => self.network_first(&request).await,
            FetchStrategy::CacheFirst => self.cache_first(&request).await,
        }
    }

    async fn network_first(&self, request: &Request) -> FetchOutcome {
        let key = request.cache_key();
        match self.network.fetch(request, CacheMode::Default).await {
            Ok(response) => {
                self.store(&key, &response).await;
                FetchOutcome::new(response, ResponseSource::Network)
            }
            Err(e) => {
                debug!(url = %key, error = %e, "network failed, trying cache");
                if let Some(cached) = self.lookup(&key).await {
                    return FetchOutcome::new(cached, ResponseSource::Cache);
                }
                if let Some(shell) = self.navigation_fallback(request).await {
                    return FetchOutcome::new(shell, ResponseSource::Fallback);
                }
                FetchOutcome::new(Response::service_unavailable(), ResponseSource::Synthetic)
            }
        }
    }

    async fn cache_first(&self, request: &Request) -> FetchOutcome {
        let key = request.cache_key();
        if let Some(cached) = self.lookup(&key).await {
            return FetchOutcome {
                response: cached,
                source: ResponseSource::Cache,
                revalidation: Some(self.spawn_revalidate(request.clone())),
            };
        }

        match self.network.fetch(request, CacheMode::Default).await {
            Ok(response) => {
                self.store(&key, &response).await;
                FetchOutcome::new(response, ResponseSource::Network)
            }
            Err(e) => {
                debug!(url = %key, error = %e, "cache miss and network failed");
                match self.navigation_fallback(request).await {
                    Some(shell) => FetchOutcome::new(shell, ResponseSource::Fallback),
                    None => FetchOutcome::new(Response::network_error(), ResponseSource::Failed),
                }
            }
        }
    }

    /// Refreshes a cached entry without holding up the response
    fn spawn_revalidate(&self, request: Request) -> JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(async move {
            let key = request.cache_key();
            match worker.network.fetch(&request, CacheMode::Default).await {
                Ok(response) => worker.store(&key, &response).await,
                Err(e) => debug!(url = %key, error = %e, "background refresh failed"),
            }
        })
    }

    async fn navigation_fallback(&self, request: &Request) -> Option<Response> {
        if !request.is_navigation() {
            return None;
        }
        self.lookup(self.fallback.as_str()).await
    }

    async fn lookup(&self, key: &str) -> Option<Response> {
        match self.storage.lookup(&self.cache_name, key).await {
            Ok(entry) => entry.map(|cached| cached.response),
            Err(e) => {
                warn!(url = %key, error = %e, "cache read failed");
                None
            }
        }
    }

    /// Stores a copy of a cacheable response; failures are logged and dropped
    ///
    /// Only writes into this version's bucket while it exists, so a refresh
    /// finishing after a newer version activated leaves no stale bucket.
    async fn store(&self, key: &str, response: &Response) {
        if !is_cacheable(response) {
            return;
        }
        match self.storage.put_existing(&self.cache_name, key, response).await {
            Ok(true) => {}
            Ok(false) => debug!(url = %key, cache = %self.cache_name, "bucket gone, not caching"),
            Err(e) => warn!(url = %key, error = %e, "cache write failed"),
        }
    }
}
