//! Worker registration and lifecycle
//!
//! A [`Registration`] hosts the worker versions for one scope. It keeps the
//! `waiting` and `active` slots, runs install to completion
//! before activate begins, honours skip-waiting, and routes page fetches to
//! the active worker. Lifecycle steps are serialized behind one async mutex;
//! fetches never wait on it and always see the last activated worker.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tracing::{info, warn};

use crate::cache::CacheStorage;
use crate::clients::ClientSet;
use crate::config::{ConfigError, FetchStrategy, WorkerConfig};
use crate::http::Request;
use crate::messages::VersionInfo;
use crate::network::Network;
use crate::worker::{pass_through, CacheManager, FetchOutcome, MessageOutcome, WorkerError};

/// Capacity of the lifecycle event channel
const EVENT_CAPACITY: usize = 64;

/// Errors that can occur while updating a registration
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The newest worker source could not be loaded
    #[error("Failed to load worker: {0}")]
    Source(#[from] ConfigError),

    /// The new worker failed to install; the previous version stays in place
    #[error("Install of {version} failed: {source}")]
    Install {
        version: String,
        #[source]
        source: WorkerError,
    },
}

/// Lifecycle state of one worker version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

/// Signals observable by pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    /// A new worker version started installing
    UpdateFound { version: String },
    /// A worker version changed state
    StateChange { version: String, state: WorkerState },
    /// Open pages are now controlled by `version`
    ControllerChange { version: String },
}

/// Which worker a page message is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSlot {
    Waiting,
    Active,
}

/// Result of checking for a newer worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateResult {
    /// The source still describes the newest known version
    UpToDate,
    /// A new version installed and is waiting to activate
    Waiting { version: String },
    /// A new version installed and activated
    Activated { version: String },
}

/// Provides the newest worker description
#[async_trait]
pub trait WorkerSource: Send + Sync {
    async fn latest(&self) -> Result<WorkerConfig, ConfigError>;
}

/// Worker source re-read from a JSON config file on every check
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    /// Strategy forced onto every loaded config
    strategy: Option<FetchStrategy>,
}

impl FileSource {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            strategy: None,
        }
    }

    pub fn with_strategy(mut self, strategy: Option<FetchStrategy>) -> Self {
        self.strategy = strategy;
        self
    }
}

#[async_trait]
impl WorkerSource for FileSource {
    async fn latest(&self) -> Result<WorkerConfig, ConfigError> {
        let config = WorkerConfig::load(&self.path)?;
        Ok(match self.strategy {
            Some(strategy) => config.with_strategy(strategy),
            None => config,
        })
    }
}

/// Worker source holding a config set in process
#[derive(Debug)]
pub struct StaticSource {
    config: Mutex<WorkerConfig>,
}

impl StaticSource {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    /// Replaces the config, as a redeploy would
    pub fn deploy(&self, config: WorkerConfig) {
        *self.config.lock().unwrap_or_else(|p| p.into_inner()) = config;
    }
}

#[async_trait]
impl WorkerSource for StaticSource {
    async fn latest(&self) -> Result<WorkerConfig, ConfigError> {
        Ok(self.config.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }
}

#[derive(Debug)]
struct Slot {
    worker: CacheManager,
    state: WorkerState,
    skip_waiting: bool,
}

#[derive(Debug, Default)]
struct Slots {
    waiting: Option<Slot>,
    active: Option<Slot>,
}

/// Versions currently held by a registration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationSnapshot {
    pub waiting: Option<String>,
    pub active: Option<(String, WorkerState)>,
}

/// Lifecycle host for the worker versions of one scope
pub struct Registration {
    source: Arc<dyn WorkerSource>,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    clients: Arc<ClientSet>,
    slots: tokio::sync::Mutex<Slots>,
    /// Worker that answers fetches, updated once activation completes
    controller: Mutex<Option<CacheManager>>,
    events: broadcast::Sender<RegistrationEvent>,
}

impl Registration {
    pub fn new(
        source: Arc<dyn WorkerSource>,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        clients: Arc<ClientSet>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            source,
            storage,
            network,
            clients,
            slots: tokio::sync::Mutex::new(Slots::default()),
            controller: Mutex::new(None),
            events,
        }
    }

    /// Creates a registration and installs the first worker from `source`
    pub async fn register(
        source: Arc<dyn WorkerSource>,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        clients: Arc<ClientSet>,
    ) -> Result<Arc<Self>, RegistrationError> {
        let registration = Arc::new(Self::new(source, storage, network, clients));
        registration.update().await?;
        Ok(registration)
    }

    pub fn clients(&self) -> &Arc<ClientSet> {
        &self.clients
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistrationEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: RegistrationEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_state(&self, slot: &mut Slot, state: WorkerState) {
        slot.state = state;
        self.emit(RegistrationEvent::StateChange {
            version: slot.worker.version().to_string(),
            state,
        });
    }

    pub async fn snapshot(&self) -> RegistrationSnapshot {
        let slots = self.slots.lock().await;
        RegistrationSnapshot {
            waiting: slots.waiting.as_ref().map(|s| s.worker.version().to_string()),
            active: slots
                .active
                .as_ref()
                .map(|s| (s.worker.version().to_string(), s.state)),
        }
    }

    pub async fn active_version(&self) -> Option<String> {
        self.snapshot().await.active.map(|(version, _)| version)
    }

    pub async fn waiting_version(&self) -> Option<String> {
        self.snapshot().await.waiting
    }

    /// Checks the source for a newer worker and installs it
    ///
    /// A failed install leaves the previously active and waiting workers
    /// untouched.
    pub async fn update(&self) -> Result<UpdateResult, RegistrationError> {
        let config = self.source.latest().await?;
        let mut slots = self.slots.lock().await;

        let newest = slots
            .waiting
            .as_ref()
            .or(slots.active.as_ref())
            .map(|s| s.worker.version().to_string());
        if newest.as_deref() == Some(config.version.as_str()) {
            return Ok(UpdateResult::UpToDate);
        }

        let version = config.version.clone();
        let worker = CacheManager::new(
            config,
            self.storage.clone(),
            self.network.clone(),
            self.clients.clone(),
        )?;
        info!(%version, "update found");
        self.emit(RegistrationEvent::UpdateFound {
            version: version.clone(),
        });

        let mut slot = Slot {
            worker,
            state: WorkerState::Parsed,
            skip_waiting: false,
        };
        self.set_state(&mut slot, WorkerState::Installing);
        let outcome = match slot.worker.install().await {
            Ok(outcome) => outcome,
            Err(source) => {
                warn!(%version, error = %source, "discarding worker after failed install");
                self.set_state(&mut slot, WorkerState::Redundant);
                return Err(RegistrationError::Install { version, source });
            }
        };

        slot.skip_waiting = outcome.skip_waiting;
        self.set_state(&mut slot, WorkerState::Installed);
        if let Some(mut replaced) = slots.waiting.replace(slot) {
            self.set_state(&mut replaced, WorkerState::Redundant);
        }

        if self.should_activate(&slots) {
            self.activate_waiting(&mut slots).await;
            Ok(UpdateResult::Activated { version })
        } else {
            info!(%version, "worker installed, waiting to activate");
            Ok(UpdateResult::Waiting { version })
        }
    }

    /// A waiting worker activates when asked to, when there is no active
    /// worker, or when the active worker controls no pages
    fn should_activate(&self, slots: &Slots) -> bool {
        let Some(waiting) = slots.waiting.as_ref() else {
            return false;
        };
        waiting.skip_waiting
            || slots.active.is_none()
            || !self.clients.any_controlled_by_other(waiting.worker.version())
    }

    /// Activates the waiting worker immediately
    ///
    /// Returns false if no worker is waiting.
    pub async fn skip_waiting(&self) -> bool {
        let mut slots = self.slots.lock().await;
        if slots.waiting.is_none() {
            return false;
        }
        self.activate_waiting(&mut slots).await;
        true
    }

    async fn activate_waiting(&self, slots: &mut Slots) {
        let Some(mut slot) = slots.waiting.take() else {
            return;
        };
        if let Some(mut old) = slots.active.take() {
            self.set_state(&mut old, WorkerState::Redundant);
        }

        self.set_state(&mut slot, WorkerState::Activating);
        let version = slot.worker.version().to_string();
        let claimed = match slot.worker.activate().await {
            Ok(outcome) => {
                info!(
                    %version,
                    deleted = outcome.deleted.len(),
                    claimed = outcome.claimed,
                    "worker activated"
                );
                outcome.claimed
            }
            Err(e) => {
                warn!(%version, error = %e, "activation step failed");
                self.clients.claim(&version)
            }
        };
        self.set_state(&mut slot, WorkerState::Activated);
        *self.controller.lock().unwrap_or_else(|p| p.into_inner()) = Some(slot.worker.clone());
        slots.active = Some(slot);

        if claimed > 0 {
            self.emit(RegistrationEvent::ControllerChange { version });
        }
    }

    /// Delivers a page message to the worker in `target`
    ///
    /// A `SKIP_WAITING` addressed to the waiting worker activates it before
    /// this returns. Messages to an empty slot are dropped.
    pub async fn post_message(
        &self,
        target: WorkerSlot,
        data: serde_json::Value,
        reply: Option<oneshot::Sender<VersionInfo>>,
    ) -> MessageOutcome {
        let mut slots = self.slots.lock().await;
        let slot = match target {
            WorkerSlot::Waiting => slots.waiting.as_mut(),
            WorkerSlot::Active => slots.active.as_mut(),
        };
        let Some(slot) = slot else {
            return MessageOutcome::Ignored;
        };

        let outcome = slot.worker.handle_message(&data, reply);
        if outcome == MessageOutcome::SkipWaiting {
            slot.skip_waiting = true;
            if target == WorkerSlot::Waiting {
                self.activate_waiting(&mut slots).await;
            }
        }
        outcome
    }

    /// Resolves a page request through the active worker
    pub async fn fetch(&self, request: Request) -> FetchOutcome {
        let active = self
            .controller
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        match active {
            Some(worker) => worker.fetch(request).await,
            None => pass_through(self.network.as_ref(), &request).await,
        }
    }
}
