//! The set of open pages a worker can control
//!
//! Each connected page gets an id and an inbox. Claiming records the claiming
//! worker's version as the page's controller; broadcasts go to a snapshot of
//! the pages controlled by a version, so pages connecting mid-broadcast are
//! not guaranteed the message.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::debug;

use crate::messages::WorkerMessage;

/// Identifier of a connected page
pub type ClientId = u64;

#[derive(Debug)]
struct Client {
    /// Version of the worker controlling this page, if any
    controller: Option<String>,
    inbox: mpsc::UnboundedSender<WorkerMessage>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: ClientId,
    clients: BTreeMap<ClientId, Client>,
}

/// Registry of open pages
#[derive(Debug, Default)]
pub struct ClientSet {
    inner: Mutex<Inner>,
}

impl ClientSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Connects a new, uncontrolled page and returns its id and inbox
    pub fn connect(&self) -> (ClientId, mpsc::UnboundedReceiver<WorkerMessage>) {
        self.connect_with_controller(None)
    }

    /// Connects a page that loads under an already active worker
    pub fn connect_with_controller(
        &self,
        controller: Option<String>,
    ) -> (ClientId, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.clients.insert(
            id,
            Client {
                controller,
                inbox: tx,
            },
        );
        (id, rx)
    }

    /// Removes a page; returns whether it was connected
    pub fn disconnect(&self, id: ClientId) -> bool {
        self.lock().clients.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Version of the worker controlling a page
    pub fn controller_of(&self, id: ClientId) -> Option<String> {
        self.lock()
            .clients
            .get(&id)
            .and_then(|client| client.controller.clone())
    }

    /// Whether any page is controlled by a version other than `version`
    pub fn any_controlled_by_other(&self, version: &str) -> bool {
        self.lock()
            .clients
            .values()
            .any(|client| matches!(&client.controller, Some(v) if v != version))
    }

    /// Makes `version` the controller of every open page
    ///
    /// Returns the number of pages whose controller changed.
    pub fn claim(&self, version: &str) -> usize {
        let mut inner = self.lock();
        let mut changed = 0;
        for client in inner.clients.values_mut() {
            if client.controller.as_deref() != Some(version) {
                client.controller = Some(version.to_string());
                changed += 1;
            }
        }
        changed
    }

    /// Snapshot of the pages controlled by `version`
    pub fn controlled_by(&self, version: &str) -> Vec<ClientId> {
        self.lock()
            .clients
            .iter()
            .filter(|(_, client)| client.controller.as_deref() == Some(version))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Sends a message to one page; returns false if it is gone
    pub fn post(&self, id: ClientId, message: WorkerMessage) -> bool {
        match self.lock().clients.get(&id) {
            Some(client) => client.inbox.send(message).is_ok(),
            None => false,
        }
    }

    /// Sends `message` to every page controlled by `version`
    ///
    /// The recipients are enumerated first and then messaged one by one.
    /// Returns the number of pages that received the message.
    pub fn broadcast(&self, version: &str, message: &WorkerMessage) -> usize {
        let recipients = self.controlled_by(version);
        let delivered = recipients
            .into_iter()
            .filter(|id| self.post(*id, message.clone()))
            .count();
        debug!(version, delivered, "broadcast to controlled clients");
        delivered
    }
}
