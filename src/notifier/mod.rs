//! Page-side update notifier
//!
//! An [`UpdateNotifier`] is attached to one open page. It periodically asks
//! the registration to check for a newer worker, watches for a new worker
//! finishing install while the page is controlled and for `SW_UPDATED`
//! broadcasts, and drives the update [`Prompt`] through a [`PageHost`].

mod prompt;
mod terminal;

pub use prompt::{DismissReason, Prompt, PromptAction, PromptEvent, PromptState};
pub use terminal::TerminalHost;

use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clients::ClientId;
use crate::config::NotifierConfig;
use crate::messages::WorkerMessage;
use crate::registration::{Registration, RegistrationEvent, WorkerSlot, WorkerState};

/// The page surface the notifier renders to
pub trait PageHost: Send {
    /// Puts the update prompt on screen
    fn show_prompt(&mut self, waiting: Option<&str>);
    /// Takes the prompt off screen
    fn hide_prompt(&mut self, reason: DismissReason);
    /// Reloads the page
    fn reload(&mut self);
}

/// User interaction with the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Reload,
    Dismiss,
}

/// Why [`UpdateNotifier::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierExit {
    /// The page reloaded
    Reloaded,
    /// The page went away
    Closed,
}

/// Update notifier of one open page
pub struct UpdateNotifier<H> {
    registration: Arc<Registration>,
    client_id: ClientId,
    inbox: mpsc::UnboundedReceiver<WorkerMessage>,
    events: broadcast::Receiver<RegistrationEvent>,
    host: H,
    config: NotifierConfig,
    prompt: Prompt,
    /// Generation and deadline of the prompt's auto-dismiss timer
    deadline: Option<(u64, Instant)>,
}

impl<H: PageHost> UpdateNotifier<H> {
    /// Connects a page to `registration`
    ///
    /// The page starts out controlled by the active worker, if there is one.
    pub async fn attach(registration: Arc<Registration>, host: H, config: NotifierConfig) -> Self {
        let events = registration.subscribe();
        let controller = registration.active_version().await;
        let (client_id, inbox) = registration
            .clients()
            .connect_with_controller(controller);
        info!(client_id, "page attached");
        Self {
            registration,
            client_id,
            inbox,
            events,
            host,
            config,
            prompt: Prompt::new(),
            deadline: None,
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    /// Runs until the page reloads or `actions` closes
    ///
    /// The update check repeats every poll interval for the page's lifetime.
    /// On exit the page is disconnected from the registration; `actions` can
    /// be handed to the next page after a reload.
    pub async fn run(mut self, actions: &mut mpsc::Receiver<UserAction>) -> NotifierExit {
        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the first tick (immediate)
        poll.tick().await;

        let exit = loop {
            let deadline = self.deadline;
            tokio::select! {
                _ = poll.tick() => self.check_for_update().await,
                event = self.events.recv() => match event {
                    Ok(event) => self.on_registration_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "missed registration events");
                    }
                    Err(RecvError::Closed) => break NotifierExit::Closed,
                },
                Some(message) = self.inbox.recv() => self.on_worker_message(message).await,
                action = actions.recv() => {
                    let event = match action {
                        Some(UserAction::Reload) => PromptEvent::ReloadClicked,
                        Some(UserAction::Dismiss) => PromptEvent::Dismissed,
                        None => break NotifierExit::Closed,
                    };
                    if self.apply(event).await {
                        break NotifierExit::Reloaded;
                    }
                }
                _ = sleep_until(deadline) => {
                    if let Some((generation, _)) = deadline {
                        self.apply(PromptEvent::TimedOut { generation }).await;
                    }
                }
            }
        };

        self.registration.clients().disconnect(self.client_id);
        exit
    }

    async fn check_for_update(&self) {
        match self.registration.update().await {
            Ok(result) => debug!(?result, "update check finished"),
            Err(e) => warn!(error = %e, "update check failed"),
        }
    }

    async fn on_registration_event(&mut self, event: RegistrationEvent) {
        match event {
            RegistrationEvent::StateChange {
                version,
                state: WorkerState::Installed,
            } => {
                let controlled = self
                    .registration
                    .clients()
                    .controller_of(self.client_id)
                    .is_some();
                if controlled {
                    info!(%version, "new version ready");
                    self.apply(PromptEvent::UpdateDetected {
                        waiting: Some(version),
                    })
                    .await;
                }
            }
            RegistrationEvent::ControllerChange { version } => {
                info!(%version, "new worker took control");
            }
            _ => {}
        }
    }

    async fn on_worker_message(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::SwUpdated { version, .. } => {
                info!(%version, "worker updated");
                self.apply(PromptEvent::UpdateDetected { waiting: None }).await;
            }
            WorkerMessage::SwActivated { version, .. } => {
                debug!(%version, "worker activated");
            }
        }
    }

    /// Feeds the prompt and carries out its action; true if the page reloaded
    async fn apply(&mut self, event: PromptEvent) -> bool {
        match self.prompt.apply(event) {
            PromptAction::Nothing => false,
            PromptAction::Show { generation } => {
                self.deadline = Some((generation, Instant::now() + self.config.prompt_timeout));
                let waiting = match self.prompt.state() {
                    PromptState::Shown { waiting, .. } => waiting.clone(),
                    PromptState::Absent => None,
                };
                self.host.show_prompt(waiting.as_deref());
                false
            }
            PromptAction::Hide(reason) => {
                self.deadline = None;
                self.host.hide_prompt(reason);
                false
            }
            PromptAction::Reload { skip_waiting } => {
                self.deadline = None;
                if let Some(version) = skip_waiting {
                    debug!(%version, "asking waiting worker to activate");
                    self.registration
                        .post_message(WorkerSlot::Waiting, json!({ "type": "SKIP_WAITING" }), None)
                        .await;
                }
                self.host.reload();
                true
            }
        }
    }
}

async fn sleep_until(deadline: Option<(u64, Instant)>) {
    match deadline {
        Some((_, at)) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
