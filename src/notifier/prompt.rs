//! Update prompt state machine
//!
//! `Absent -> Shown -> Absent`. A prompt leaves the screen on reload, on
//! dismiss, or when its timeout fires. Each shown prompt gets a generation
//! number so a timeout armed for an earlier prompt never closes a later one.

/// Why a prompt went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissReason {
    Dismissed,
    TimedOut,
}

/// Visible state of the update prompt
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PromptState {
    #[default]
    Absent,
    Shown {
        generation: u64,
        /// Version of the installed worker waiting to activate, if known
        waiting: Option<String>,
    },
}

/// Inputs to the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptEvent {
    /// A new version is installed or was announced
    UpdateDetected { waiting: Option<String> },
    ReloadClicked,
    Dismissed,
    /// The timeout armed for `generation` fired
    TimedOut { generation: u64 },
}

/// What the page has to do after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptAction {
    Nothing,
    /// Render the prompt and arm its timeout for `generation`
    Show { generation: u64 },
    Hide(DismissReason),
    /// Remove the prompt, activate `skip_waiting` if set, then reload
    Reload { skip_waiting: Option<String> },
}

/// The update prompt of one page
#[derive(Debug, Default)]
pub struct Prompt {
    state: PromptState,
    next_generation: u64,
}

impl Prompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PromptState {
        &self.state
    }

    pub fn is_shown(&self) -> bool {
        matches!(self.state, PromptState::Shown { .. })
    }

    /// Applies one event and returns what the page has to do
    pub fn apply(&mut self, event: PromptEvent) -> PromptAction {
        let (next, action) = match (std::mem::take(&mut self.state), event) {
            (PromptState::Absent, PromptEvent::UpdateDetected { waiting }) => {
                let generation = self.next_generation;
                self.next_generation += 1;
                (
                    PromptState::Shown {
                        generation,
                        waiting,
                    },
                    PromptAction::Show { generation },
                )
            }
            // Already on screen; remember a waiting worker learned later
            (
                PromptState::Shown {
                    generation,
                    waiting,
                },
                PromptEvent::UpdateDetected { waiting: newer },
            ) => (
                PromptState::Shown {
                    generation,
                    waiting: newer.or(waiting),
                },
                PromptAction::Nothing,
            ),
            (PromptState::Shown { waiting, .. }, PromptEvent::ReloadClicked) => (
                PromptState::Absent,
                PromptAction::Reload {
                    skip_waiting: waiting,
                },
            ),
            (PromptState::Shown { .. }, PromptEvent::Dismissed) => (
                PromptState::Absent,
                PromptAction::Hide(DismissReason::Dismissed),
            ),
            (PromptState::Shown { generation, .. }, PromptEvent::TimedOut { generation: fired })
                if generation == fired =>
            {
                (
                    PromptState::Absent,
                    PromptAction::Hide(DismissReason::TimedOut),
                )
            }
            (state, _) => (state, PromptAction::Nothing),
        };
        self.state = next;
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detected(waiting: Option<&str>) -> PromptEvent {
        PromptEvent::UpdateDetected {
            waiting: waiting.map(str::to_string),
        }
    }

    #[test]
    fn test_initial_state_is_absent() {
        assert_eq!(Prompt::new().state(), &PromptState::Absent);
    }

    #[test]
    fn test_update_shows_prompt_once() {
        let mut prompt = Prompt::new();
        assert_eq!(prompt.apply(detected(None)), PromptAction::Show { generation: 0 });
        assert_eq!(prompt.apply(detected(None)), PromptAction::Nothing);
        assert!(prompt.is_shown());
    }

    #[test]
    fn test_reload_carries_waiting_worker() {
        let mut prompt = Prompt::new();
        prompt.apply(detected(None));
        prompt.apply(detected(Some("v2")));

        assert_eq!(
            prompt.apply(PromptEvent::ReloadClicked),
            PromptAction::Reload {
                skip_waiting: Some("v2".to_string())
            }
        );
        assert_eq!(prompt.state(), &PromptState::Absent);
    }

    #[test]
    fn test_dismiss_hides_prompt() {
        let mut prompt = Prompt::new();
        prompt.apply(detected(Some("v2")));
        assert_eq!(
            prompt.apply(PromptEvent::Dismissed),
            PromptAction::Hide(DismissReason::Dismissed)
        );
        assert!(!prompt.is_shown());
    }

    #[test]
    fn test_timeout_hides_matching_generation_only() {
        let mut prompt = Prompt::new();
        prompt.apply(detected(None));
        prompt.apply(PromptEvent::Dismissed);
        assert_eq!(prompt.apply(detected(None)), PromptAction::Show { generation: 1 });

        assert_eq!(
            prompt.apply(PromptEvent::TimedOut { generation: 0 }),
            PromptAction::Nothing
        );
        assert!(prompt.is_shown());
        assert_eq!(
            prompt.apply(PromptEvent::TimedOut { generation: 1 }),
            PromptAction::Hide(DismissReason::TimedOut)
        );
    }

    #[test]
    fn test_actions_without_prompt_do_nothing() {
        let mut prompt = Prompt::new();
        assert_eq!(prompt.apply(PromptEvent::ReloadClicked), PromptAction::Nothing);
        assert_eq!(prompt.apply(PromptEvent::Dismissed), PromptAction::Nothing);
        assert_eq!(
            prompt.apply(PromptEvent::TimedOut { generation: 0 }),
            PromptAction::Nothing
        );
    }
}
