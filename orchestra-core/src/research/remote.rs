//! HTTP client for a LangGraph-style deployment of the research graph.
//!
//! Runs are submitted to `POST {base_url}/runs/wait`, which blocks server-side
//! until the graph finishes and answers with the final graph state.

use super::agent::{AgentResponse, ResearchAgent};
use super::invocation::InvocationConfig;
use crate::config::AgentEndpointConfig;
use crate::error::AgentError;
use crate::types::Message;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

/// Research agent reached over HTTP.
pub struct RemoteResearchAgent {
    client: Client,
    base_url: String,
    assistant_id: String,
}

impl RemoteResearchAgent {
    pub fn new(config: &AgentEndpointConfig) -> Result<Self, AgentError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|e| AgentError::Request {
            message: format!("Failed to build HTTP client: {e}"),
        })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            assistant_id: config.assistant_id.clone(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/runs/wait", self.base_url)
    }

    /// Build the run request body.
    pub fn request_body(&self, messages: &[Message], config: &InvocationConfig) -> Value {
        let messages: Vec<Value> = messages.iter().map(Message::to_agent_value).collect();
        json!({
            "assistant_id": self.assistant_id,
            "input": { "messages": messages },
            "config": { "configurable": config.to_configurable() },
        })
    }

    /// Interpret the body of a finished run.
    ///
    /// A run that failed inside the graph still answers 200 but carries an
    /// `__error__` object instead of state.
    pub fn parse_run_output(body: &str) -> Result<AgentResponse, AgentError> {
        let value: Value = serde_json::from_str(body).map_err(|e| AgentError::ResponseParse {
            message: format!("Invalid JSON: {e}"),
        })?;
        if let Some(error) = value.get("__error__") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(AgentError::Failed { message });
        }
        AgentResponse::from_value(&value)
    }
}

#[async_trait]
impl ResearchAgent for RemoteResearchAgent {
    async fn invoke(
        &self,
        messages: &[Message],
        config: &InvocationConfig,
    ) -> Result<AgentResponse, AgentError> {
        let url = self.endpoint();
        let body = self.request_body(messages, config);

        debug!(
            url = %url,
            assistant = %self.assistant_id,
            model = %config.model_name,
            messages = messages.len(),
            allow_clarification = config.allow_clarification,
            "Submitting research run"
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Request {
                message: format!("Request failed: {e}"),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| AgentError::Request {
            message: format!("Failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Research run rejected");
            return Err(AgentError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        Self::parse_run_output(&text)
    }

    fn name(&self) -> &str {
        "remote"
    }
}
