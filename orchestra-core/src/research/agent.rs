//! The external research agent interface.
//!
//! The agent is a black box: it consumes the conversation and an
//! [`InvocationConfig`] and returns either an updated conversation ending in
//! a clarification question or a final report. Responses are normalized into
//! [`AgentResponse`] as soon as they cross this boundary.

use super::invocation::InvocationConfig;
use crate::error::AgentError;
use crate::types::{Conversation, Message};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// What the agent returned from one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentResponse {
    /// Full conversation as the agent sees it, when it returned one.
    pub messages: Option<Conversation>,
    /// Final report, when the research finished.
    pub final_report: Option<String>,
}

impl AgentResponse {
    /// A response carrying only a final report.
    pub fn report(report: impl Into<String>) -> Self {
        Self {
            messages: None,
            final_report: Some(report.into()),
        }
    }

    /// A response carrying only the agent's view of the conversation.
    pub fn conversation(messages: Conversation) -> Self {
        Self {
            messages: Some(messages),
            final_report: None,
        }
    }

    /// Parse the agent's final state.
    ///
    /// `messages` entries are normalized with [`Message::from_agent_value`];
    /// an empty or blank `final_report` counts as absent.
    pub fn from_value(value: &Value) -> Result<Self, AgentError> {
        let Value::Object(state) = value else {
            return Err(AgentError::ResponseParse {
                message: format!("expected a JSON object, got {}", json_kind(value)),
            });
        };

        let messages = match state.get("messages") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(items.iter().map(Message::from_agent_value).collect()),
            Some(other) => {
                return Err(AgentError::ResponseParse {
                    message: format!("`messages` must be an array, got {}", json_kind(other)),
                });
            }
        };

        let final_report = state
            .get("final_report")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string);

        Ok(Self {
            messages,
            final_report,
        })
    }

    pub fn has_report(&self) -> bool {
        self.final_report
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Trait for the external research pipeline.
#[async_trait]
pub trait ResearchAgent: Send + Sync {
    /// Run the pipeline over `messages` with `config`.
    async fn invoke(
        &self,
        messages: &[Message],
        config: &InvocationConfig,
    ) -> Result<AgentResponse, AgentError>;

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        "research-agent"
    }
}

/// One invocation observed by [`MockResearchAgent`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub messages: Conversation,
    pub allow_clarification: bool,
    pub model_name: String,
}

/// A scripted research agent for tests and offline runs.
///
/// Queued results are returned in order. With an empty queue the agent plays
/// a small demo: it asks one clarification question when allowed to, and
/// otherwise writes a report summarizing the user's turns.
pub struct MockResearchAgent {
    responses: Mutex<VecDeque<Result<AgentResponse, String>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockResearchAgent {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a response for the next `invoke` call.
    pub fn queue_response(&self, response: AgentResponse) {
        self.lock_responses().push_back(Ok(response));
    }

    /// Queue a failure for the next `invoke` call.
    pub fn queue_failure(&self, message: impl Into<String>) {
        self.lock_responses().push_back(Err(message.into()));
    }

    /// Builder form of [`queue_response`](Self::queue_response).
    pub fn with_response(self, response: AgentResponse) -> Self {
        self.queue_response(response);
        self
    }

    /// Every invocation seen so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<AgentResponse, String>>> {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn demo_response(messages: &[Message], config: &InvocationConfig) -> AgentResponse {
        let asked_already = messages.iter().any(Message::is_assistant);
        let mut conversation = messages.to_vec();
        if config.allow_clarification && !asked_already {
            conversation.push(Message::assistant(
                "Before I start: which timeframe and which aspects should the research focus on?",
            ));
            return AgentResponse::conversation(conversation);
        }

        let topic = messages
            .iter()
            .find(|m| m.is_user())
            .map(|m| m.content.as_str())
            .unwrap_or("Untitled");
        let notes: Vec<String> = messages
            .iter()
            .filter(|m| m.is_user())
            .skip(1)
            .map(|m| format!("- {}", m.content))
            .collect();
        let mut report = format!("# {topic}\n\n## Summary\n\nOffline report produced without contacting a research agent.\n");
        if !notes.is_empty() {
            report.push_str("\n## Scope\n\n");
            report.push_str(&notes.join("\n"));
            report.push('\n');
        }
        conversation.push(Message::assistant("Research complete."));
        AgentResponse {
            messages: Some(conversation),
            final_report: Some(report),
        }
    }
}

impl Default for MockResearchAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResearchAgent for MockResearchAgent {
    async fn invoke(
        &self,
        messages: &[Message],
        config: &InvocationConfig,
    ) -> Result<AgentResponse, AgentError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                messages: messages.to_vec(),
                allow_clarification: config.allow_clarification,
                model_name: config.model_name.clone(),
            });

        let next = self.lock_responses().pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(AgentError::Failed { message }),
            None => Ok(Self::demo_response(messages, config)),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::research::invocation;
    use crate::types::Role;
    use serde_json::json;

    #[test]
    fn test_from_value_report_only() {
        let response = AgentResponse::from_value(&json!({"final_report": "R"})).unwrap();
        assert_eq!(response, AgentResponse::report("R"));
        assert!(response.has_report());
    }

    #[test]
    fn test_from_value_normalizes_messages() {
        let response = AgentResponse::from_value(&json!({
            "messages": [
                {"type": "human", "content": "topic"},
                {"role": "ai", "content": "Which timeframe?"}
            ],
            "final_report": ""
        }))
        .unwrap();
        let messages = response.messages.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert!(response.final_report.is_none());
    }

    #[test]
    fn test_from_value_rejects_non_object() {
        let err = AgentResponse::from_value(&json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("an array"));

        let err = AgentResponse::from_value(&json!({"messages": "oops"})).unwrap_err();
        assert!(matches!(err, AgentError::ResponseParse { .. }));
    }

    #[tokio::test]
    async fn test_mock_returns_queued_then_records() {
        let agent = MockResearchAgent::new();
        agent.queue_response(AgentResponse::report("done"));
        agent.queue_failure("boom");

        let config = invocation::build(&Settings::default());
        let messages = vec![Message::user("topic")];

        let first = agent.invoke(&messages, &config).await.unwrap();
        assert_eq!(first.final_report.as_deref(), Some("done"));

        let second = agent.invoke(&messages, &config).await;
        assert!(matches!(second, Err(AgentError::Failed { .. })));

        let calls = agent.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].allow_clarification);
        assert_eq!(calls[0].model_name, "gemini-2.0-flash");
    }

    #[tokio::test]
    async fn test_mock_demo_asks_then_reports() {
        let agent = MockResearchAgent::new();
        let config = invocation::build(&Settings::default());

        let mut messages = vec![Message::user("solid-state batteries")];
        let first = agent.invoke(&messages, &config).await.unwrap();
        assert!(!first.has_report());
        messages = first.messages.unwrap();
        assert_eq!(messages.last().map(|m| m.role), Some(Role::Assistant));

        messages.push(Message::user("since 2020"));
        let second = agent.invoke(&messages, &config).await.unwrap();
        let report = second.final_report.unwrap();
        assert!(report.starts_with("# solid-state batteries"));
        assert!(report.contains("- since 2020"));
    }

    #[tokio::test]
    async fn test_mock_demo_skips_question_without_clarification() {
        let agent = MockResearchAgent::new();
        let config = invocation::build(&Settings::default()).with_allow_clarification(false);
        let response = agent
            .invoke(&[Message::user("fusion")], &config)
            .await
            .unwrap();
        assert!(response.has_report());
    }
}
