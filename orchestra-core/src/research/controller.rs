//! Research session controller: the state machine behind the front-end.
//!
//! Each user action is dispatched through [`ResearchController::dispatch`],
//! which reads the session state, decides the transition, invokes the agent
//! through the blocking [`bridge`](super::bridge) and writes the result back.
//! Completed sessions are appended to the history log.
//!
//! Decisions are made by two pure functions, [`plan`] (what to send and with
//! which clarification mode) and [`absorb`] (how a response changes the
//! state); `dispatch` only sequences them around the invocation.

use super::agent::{AgentResponse, ResearchAgent};
use super::bridge;
use super::history::{HistoryStore, SessionRecord};
use super::invocation;
use super::session::{ControllerState, SessionPhase, SessionStore};
use crate::config::SettingsUpdate;
use crate::error::{AgentError, Result};
use crate::types::{Conversation, Message};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Topic recorded when neither the caller nor the conversation provides one.
pub const UNTITLED_TOPIC: &str = "Untitled";

/// A user action produced by the front-end.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Start (or re-run) research on a topic.
    Start { topic: String },
    /// Advance without letting the agent ask for clarification.
    ForceContinue { topic: Option<String> },
    /// Answer the agent's clarification question.
    SubmitClarification {
        answer: String,
        topic: Option<String>,
    },
    /// Ask the in-flight run to stop. Soft: the run is not interrupted.
    Stop,
    /// Replace the research settings.
    SaveSettings(SettingsUpdate),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Start { .. } => "start",
            Action::ForceContinue { .. } => "force_continue",
            Action::SubmitClarification { .. } => "submit_clarification",
            Action::Stop => "stop",
            Action::SaveSettings(_) => "save_settings",
        }
    }
}

/// Why an action was not carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("a research run is already in progress")]
    Busy,
    #[error("the research topic is empty")]
    EmptyTopic,
    #[error("the clarification answer is empty")]
    EmptyAnswer,
    #[error("there is no conversation to continue")]
    NoConversation,
    #[error("the agent is not waiting for a clarification")]
    NotAwaitingClarification,
    #[error("nothing is running")]
    NotProcessing,
    #[error("the action does not run the agent")]
    NotAnInvocation,
}

/// Result of a dispatched action.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The action did not apply to the current state; nothing changed.
    Ignored(Rejection),
    /// The agent asked a question and waits for an answer.
    Clarification { question: String },
    /// The agent produced a final report, now recorded in history.
    Completed {
        report: String,
        record: SessionRecord,
    },
    /// The agent returned without a question or a report.
    Pending,
    /// A stop request was recorded.
    StopRecorded,
    /// Settings were replaced; warnings describe anything suspicious.
    SettingsSaved { warnings: Vec<String> },
}

/// What to send for an invoking action.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Conversation after seeding or appending, sent to the agent.
    pub conversation: Conversation,
    pub allow_clarification: bool,
    /// Caller-supplied topic, trimmed; `None` when blank or absent.
    pub topic: Option<String>,
}

/// Decide what an invoking action sends, or why it cannot run.
///
/// `Stop` and `SaveSettings` never invoke the agent and are rejected with
/// [`Rejection::NotAnInvocation`].
pub fn plan(state: &ControllerState, action: &Action) -> std::result::Result<Plan, Rejection> {
    if state.processing {
        return Err(Rejection::Busy);
    }
    match action {
        Action::Start { topic } => {
            let topic = non_blank(Some(topic)).ok_or(Rejection::EmptyTopic)?;
            let mut conversation = state.conversation.clone();
            if conversation.is_empty() {
                conversation.push(Message::user(topic.clone()));
            }
            Ok(Plan {
                conversation,
                allow_clarification: true,
                topic: Some(topic),
            })
        }
        Action::ForceContinue { topic } => {
            if state.conversation.is_empty() {
                return Err(Rejection::NoConversation);
            }
            Ok(Plan {
                conversation: state.conversation.clone(),
                allow_clarification: false,
                topic: non_blank(topic.as_ref()),
            })
        }
        Action::SubmitClarification { answer, topic } => {
            if !state.is_awaiting_clarification() {
                return Err(Rejection::NotAwaitingClarification);
            }
            let answer = non_blank(Some(answer)).ok_or(Rejection::EmptyAnswer)?;
            let mut conversation = state.conversation.clone();
            conversation.push(Message::user(answer));
            Ok(Plan {
                conversation,
                allow_clarification: true,
                topic: non_blank(topic.as_ref()),
            })
        }
        Action::Stop | Action::SaveSettings(_) => Err(Rejection::NotAnInvocation),
    }
}

/// Fold an agent response into the state.
///
/// A non-empty returned message list replaces the conversation verbatim; a
/// non-blank final report completes the session. `processing` is untouched.
pub fn absorb(mut state: ControllerState, response: &AgentResponse) -> ControllerState {
    if let Some(messages) = &response.messages
        && !messages.is_empty()
    {
        state.conversation = messages.clone();
    }
    if let Some(report) = &response.final_report
        && !report.trim().is_empty()
    {
        state.report = Some(report.clone());
    }
    state
}

/// Topic recorded in history: the caller's, else the first message, else
/// [`UNTITLED_TOPIC`].
pub fn resolve_topic(topic: Option<&str>, conversation: &[Message]) -> String {
    topic
        .map(str::to_string)
        .or_else(|| conversation.first().map(|m| m.content.clone()))
        .unwrap_or_else(|| UNTITLED_TOPIC.to_string())
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Clears `processing` when dropped, whatever happened in between.
struct ProcessingGuard<'a> {
    store: &'a SessionStore,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.store.update(|state| state.processing = false);
    }
}

/// Drives research sessions against an external agent.
pub struct ResearchController {
    agent: Arc<dyn ResearchAgent>,
    history: HistoryStore,
    store: SessionStore,
}

impl ResearchController {
    pub fn new(agent: Arc<dyn ResearchAgent>, history: HistoryStore, store: SessionStore) -> Self {
        Self {
            agent,
            history,
            store,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn state(&self) -> ControllerState {
        self.store.snapshot()
    }

    pub fn phase(&self) -> SessionPhase {
        self.store.phase()
    }

    /// Apply one user action.
    ///
    /// Agent failures and history write failures are returned as errors.
    /// After an agent failure the conversation and report are exactly as they
    /// were before the action. `processing` is always false on return.
    pub fn dispatch(&self, action: Action) -> Result<Outcome> {
        debug!(action = action.name(), phase = %self.phase(), "Dispatching action");
        match action {
            Action::Stop => Ok(self.request_stop()),
            Action::SaveSettings(update) => Ok(self.save_settings(update)),
            action => self.run(&action),
        }
    }

    /// Record a stop request. Only meaningful while a run is in flight, and
    /// does not interrupt it.
    pub fn request_stop(&self) -> Outcome {
        let recorded = self.store.update(|state| {
            if state.processing {
                state.stop_requested = true;
            }
            state.processing
        });
        if recorded {
            info!("Stop requested; the current run will finish first");
            Outcome::StopRecorded
        } else {
            Outcome::Ignored(Rejection::NotProcessing)
        }
    }

    fn save_settings(&self, update: SettingsUpdate) -> Outcome {
        if self.store.is_processing() {
            warn!("Settings change refused while a run is in progress");
            return Outcome::Ignored(Rejection::Busy);
        }
        let saved = self.store.settings().apply_update(update);
        let warnings = saved.validate();
        info!(
            provider = %saved.provider,
            temperature = saved.temperature,
            max_tokens = saved.max_tokens,
            "Settings saved"
        );
        self.store.set_settings(saved);
        Outcome::SettingsSaved { warnings }
    }

    fn run(&self, action: &Action) -> Result<Outcome> {
        let prepared = self.store.update_with_settings(|state, settings| {
            let plan = plan(state, action)?;
            let previous = state.conversation.clone();
            state.conversation = plan.conversation.clone();
            state.processing = true;
            state.stop_requested = false;
            Ok::<_, Rejection>((plan, previous, settings.clone()))
        });
        let (plan, previous, settings) = match prepared {
            Ok(prepared) => prepared,
            Err(rejection) => {
                warn!(action = action.name(), reason = %rejection, "Action ignored");
                return Ok(Outcome::Ignored(rejection));
            }
        };
        let _guard = ProcessingGuard { store: &self.store };

        let config = invocation::build(&settings).with_allow_clarification(plan.allow_clarification);
        info!(
            action = action.name(),
            agent = self.agent.name(),
            model = %config.model_name,
            allow_clarification = config.allow_clarification,
            messages = plan.conversation.len(),
            "Invoking research agent"
        );

        let agent = &self.agent;
        let messages = &plan.conversation;
        let config_ref = &config;
        let invoked: std::result::Result<AgentResponse, AgentError> =
            bridge::run(|| agent.invoke(messages, config_ref));

        let response = match invoked {
            Ok(response) => response,
            Err(e) => {
                warn!(action = action.name(), error = %e, "Research agent failed");
                self.store.update(|state| state.conversation = previous);
                return Err(e.into());
            }
        };

        let state = self.store.update(|state| {
            let next = absorb(std::mem::take(state), &response);
            *state = next;
            state.clone()
        });

        if let Some(report) = state.report.clone().filter(|_| response.has_report()) {
            let topic = resolve_topic(plan.topic.as_deref(), &state.conversation);
            let record = self.history.append(topic, report.clone())?;
            info!(topic = %record.topic, "Research session completed");
            return Ok(Outcome::Completed { report, record });
        }

        match state.clarification_question() {
            Some(question) => {
                info!("Agent requested clarification");
                Ok(Outcome::Clarification {
                    question: question.to_string(),
                })
            }
            None => Ok(Outcome::Pending),
        }
    }
}
