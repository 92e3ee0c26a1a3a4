//! The cache manager worker
//!
//! A [`CacheManager`] is one deployed worker version. It owns the bucket
//! named after its version, precaches the application shell on install,
//! retires every other bucket on activate, intercepts fetches with the
//! configured [`FetchStrategy`](crate::config::FetchStrategy) and answers
//! control messages from pages.
//!
//! Handlers never touch lifecycle state themselves. They report what they
//! did ([`InstallOutcome`], [`ActivateOutcome`], [`MessageOutcome`]) and the
//! [`Registration`](crate::registration::Registration) decides what happens
//! next.

mod fetch;

pub use fetch::{pass_through, FetchOutcome, ResponseSource};

use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use reqwest::Url;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::cache::{CacheStorage, StorageError};
use crate::clients::ClientSet;
use crate::config::{ConfigError, WorkerConfig};
use crate::http::{CacheMode, Request, Response};
use crate::messages::{ClientMessage, VersionInfo, WorkerMessage};
use crate::network::Network;

/// Errors that can occur in worker lifecycle handlers
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A precache asset could not be fetched; the install attempt is discarded
    #[error("Failed to precache {url}: {reason}")]
    Precache { url: String, reason: String },

    /// The cache storage failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The worker configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result of a successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// Bucket that now holds the application shell
    pub cache_name: String,
    /// Number of precached entries
    pub precached: usize,
    /// The worker asks to skip the waiting state
    pub skip_waiting: bool,
}

/// Result of a successful activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateOutcome {
    /// Buckets removed because they belong to other versions
    pub deleted: Vec<String>,
    /// Pages whose controller changed to this worker
    pub claimed: usize,
    /// The broadcast sent to controlled pages
    pub broadcast: WorkerMessage,
    /// Pages that received the broadcast
    pub notified: usize,
}

/// What a control message asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The page asked this worker to stop waiting
    SkipWaiting,
    /// The version was sent on the reply channel
    Replied,
    /// Unrecognized message, or a version request without a live reply channel
    Ignored,
}

/// Events the hosting registration dispatches to a worker
#[derive(Debug)]
pub enum LifecycleEvent {
    Install,
    Activate,
    Fetch(Request),
    Message {
        data: serde_json::Value,
        reply: Option<oneshot::Sender<VersionInfo>>,
    },
}

/// Result of dispatching a [`LifecycleEvent`]
#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallOutcome),
    Activated(ActivateOutcome),
    Responded(FetchOutcome),
    Message(MessageOutcome),
}

/// One deployed worker version
#[derive(Clone)]
pub struct CacheManager {
    config: Arc<WorkerConfig>,
    cache_name: String,
    origin: Url,
    precache: Vec<Url>,
    fallback: Url,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    clients: Arc<ClientSet>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("cache_name", &self.cache_name)
            .field("strategy", &self.config.strategy)
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Creates a worker for `config`, resolving all of its URLs up front
    pub fn new(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        clients: Arc<ClientSet>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            cache_name: config.cache_name(),
            origin: config.origin_url()?,
            precache: config.precache_urls()?,
            fallback: config.fallback_url()?,
            config: Arc::new(config),
            storage,
            network,
            clients,
        })
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn version_info(&self) -> VersionInfo {
        VersionInfo {
            version: self.config.version.clone(),
            cache_name: self.cache_name.clone(),
        }
    }

    /// Runs the handler for one lifecycle event
    pub async fn handle(&self, event: LifecycleEvent) -> Result<EventOutcome, WorkerError> {
        match event {
            LifecycleEvent::Install => self.install().await.map(EventOutcome::Installed),
            LifecycleEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            LifecycleEvent::Fetch(request) => Ok(EventOutcome::Responded(self.fetch(request).await)),
            LifecycleEvent::Message { data, reply } => {
                Ok(EventOutcome::Message(self.handle_message(&data, reply)))
            }
        }
    }

    /// Precaches the application shell into this version's bucket
    ///
    /// Every asset is fetched bypassing the HTTP cache and must answer with
    /// an ok status before anything is written. If any fetch fails the
    /// install fails and no bucket is created for this version.
    pub async fn install(&self) -> Result<InstallOutcome, WorkerError> {
        info!(version = %self.config.version, cache = %self.cache_name, "installing worker");

        let fetches = self.precache.iter().map(|url| async move {
            let request = Request::get(url.clone());
            let response = self
                .network
                .fetch(&request, CacheMode::Reload)
                .await
                .map_err(|e| WorkerError::Precache {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
            if !response.ok() {
                return Err(WorkerError::Precache {
                    url: url.to_string(),
                    reason: format!("status {}", response.status),
                });
            }
            Ok((request.cache_key(), response))
        });

        let responses: Vec<(String, Response)> = match try_join_all(fetches).await {
            Ok(responses) => responses,
            Err(e) => {
                warn!(version = %self.config.version, error = %e, "install failed");
                return Err(e);
            }
        };

        let existed = self.storage.has(&self.cache_name).await?;
        self.storage.open(&self.cache_name).await?;
        for (key, response) in &responses {
            if let Err(e) = self.storage.put(&self.cache_name, key, response).await {
                warn!(cache = %self.cache_name, error = %e, "precache write failed");
                if !existed {
                    let _ = self.storage.delete(&self.cache_name).await;
                }
                return Err(e.into());
            }
        }

        let precached = self.storage.entries(&self.cache_name).await?.len();
        info!(cache = %self.cache_name, precached, "cache populated");

        Ok(InstallOutcome {
            cache_name: self.cache_name.clone(),
            precached,
            skip_waiting: self.config.skip_waiting_on_install,
        })
    }

    /// Retires old buckets, claims open pages and announces the new version
    pub async fn activate(&self) -> Result<ActivateOutcome, WorkerError> {
        info!(version = %self.config.version, "activating worker");

        let mut deleted = Vec::new();
        for name in self.storage.keys().await? {
            if name != self.cache_name {
                info!(cache = %name, "deleting stale cache");
                self.storage.delete(&name).await?;
                deleted.push(name);
            }
        }

        let replaced = self.clients.any_controlled_by_other(&self.config.version);
        let claimed = self.clients.claim(&self.config.version);

        let timestamp = Some(Utc::now().timestamp_millis());
        let version = self.config.version.clone();
        let broadcast = if replaced || !deleted.is_empty() {
            WorkerMessage::SwUpdated { version, timestamp }
        } else {
            WorkerMessage::SwActivated { version, timestamp }
        };
        let notified = self.clients.broadcast(&self.config.version, &broadcast);

        Ok(ActivateOutcome {
            deleted,
            claimed,
            broadcast,
            notified,
        })
    }

    /// Interprets a control message from a page
    pub fn handle_message(
        &self,
        data: &serde_json::Value,
        reply: Option<oneshot::Sender<VersionInfo>>,
    ) -> MessageOutcome {
        match ClientMessage::from_value(data) {
            Some(ClientMessage::SkipWaiting) => MessageOutcome::SkipWaiting,
            Some(ClientMessage::GetVersion) => match reply {
                Some(reply) => match reply.send(self.version_info()) {
                    Ok(()) => MessageOutcome::Replied,
                    Err(_) => MessageOutcome::Ignored,
                },
                None => MessageOutcome::Ignored,
            },
            None => {
                debug!(%data, "ignoring unrecognized message");
                MessageOutcome::Ignored
            }
        }
    }
}
