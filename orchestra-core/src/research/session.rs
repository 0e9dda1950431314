//! Session-scoped research state.
//!
//! [`SessionStore`] is the process-lifetime key-value store the front-end
//! keeps between interactions: the current settings plus the controller's
//! [`ControllerState`]. Nothing here survives a restart; completed sessions
//! persist only through the history log.

use crate::config::Settings;
use crate::types::{Conversation, Message};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Where a research conversation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No conversation yet.
    Empty,
    /// The agent spoke last and no report exists.
    AwaitingClarification,
    /// The conversation ends with a user turn the agent has not answered.
    Pending,
    /// An invocation is in flight.
    Processing,
    /// A final report is present.
    Completed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionPhase::Empty => "empty",
            SessionPhase::AwaitingClarification => "awaiting clarification",
            SessionPhase::Pending => "pending",
            SessionPhase::Processing => "processing",
            SessionPhase::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// The controller's view of one interactive research session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    pub conversation: Conversation,
    pub report: Option<String>,
    pub processing: bool,
    pub stop_requested: bool,
}

impl ControllerState {
    pub fn phase(&self) -> SessionPhase {
        if self.processing {
            SessionPhase::Processing
        } else if self.is_completed() {
            SessionPhase::Completed
        } else if self.conversation.is_empty() {
            SessionPhase::Empty
        } else if self.is_awaiting_clarification() {
            SessionPhase::AwaitingClarification
        } else {
            SessionPhase::Pending
        }
    }

    pub fn is_completed(&self) -> bool {
        self.report.is_some()
    }

    /// Any trailing agent message without a report counts as a question;
    /// the message content is not inspected.
    pub fn is_awaiting_clarification(&self) -> bool {
        self.report.is_none() && self.conversation.last().is_some_and(Message::is_assistant)
    }

    /// The agent's pending question, if any.
    pub fn clarification_question(&self) -> Option<&str> {
        if self.is_awaiting_clarification() {
            self.conversation.last().map(|m| m.content.as_str())
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
struct SessionData {
    settings: Settings,
    state: ControllerState,
}

/// Shared handle to the session-scoped state.
///
/// Clones share the same session. The lock is only held for short reads and
/// writes, never across an agent invocation, so a signal handler can record a
/// stop request while a run is in flight.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<SessionData>>,
}

impl SessionStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionData {
                settings,
                state: ControllerState::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionData> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current controller state.
    pub fn snapshot(&self) -> ControllerState {
        self.lock().state.clone()
    }

    pub fn settings(&self) -> Settings {
        self.lock().settings.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().state.phase()
    }

    pub fn is_processing(&self) -> bool {
        self.lock().state.processing
    }

    pub fn stop_requested(&self) -> bool {
        self.lock().state.stop_requested
    }

    /// Start over with an empty conversation, keeping settings.
    ///
    /// Refused while an invocation is in flight.
    pub fn reset_conversation(&self) -> bool {
        let mut data = self.lock();
        if data.state.processing {
            return false;
        }
        data.state = ControllerState::default();
        true
    }

    pub(crate) fn set_settings(&self, settings: Settings) {
        self.lock().settings = settings;
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut ControllerState) -> R) -> R {
        f(&mut self.lock().state)
    }

    pub(crate) fn update_with_settings<R>(
        &self,
        f: impl FnOnce(&mut ControllerState, &Settings) -> R,
    ) -> R {
        let mut data = self.lock();
        let SessionData { settings, state } = &mut *data;
        f(state, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        let mut state = ControllerState::default();
        assert_eq!(state.phase(), SessionPhase::Empty);

        state.conversation.push(Message::user("topic"));
        assert_eq!(state.phase(), SessionPhase::Pending);

        state.conversation.push(Message::assistant("Which timeframe?"));
        assert_eq!(state.phase(), SessionPhase::AwaitingClarification);
        assert_eq!(state.clarification_question(), Some("Which timeframe?"));

        state.processing = true;
        assert_eq!(state.phase(), SessionPhase::Processing);

        state.processing = false;
        state.report = Some("R".into());
        assert_eq!(state.phase(), SessionPhase::Completed);
        assert!(!state.is_awaiting_clarification());
        assert_eq!(state.clarification_question(), None);
    }

    #[test]
    fn test_store_clones_share_state() {
        let store = SessionStore::default();
        let other = store.clone();
        store.update(|s| s.conversation.push(Message::user("x")));
        assert_eq!(other.snapshot().conversation.len(), 1);
    }

    #[test]
    fn test_reset_refused_while_processing() {
        let store = SessionStore::default();
        store.update(|s| {
            s.conversation.push(Message::user("x"));
            s.processing = true;
        });
        assert!(!store.reset_conversation());
        assert_eq!(store.snapshot().conversation.len(), 1);

        store.update(|s| s.processing = false);
        assert!(store.reset_conversation());
        assert_eq!(store.phase(), SessionPhase::Empty);
    }

    #[test]
    fn test_settings_roundtrip() {
        let store = SessionStore::new(Settings::default());
        let mut settings = store.settings();
        settings.max_tokens = 8192;
        store.set_settings(settings.clone());
        assert_eq!(store.settings(), settings);
    }
}
