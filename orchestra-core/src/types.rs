//! Core type definitions for OrchestraAI research sessions.
//!
//! Defines the conversation message type and the normalization applied to
//! messages coming back from the external research agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Represents a participant role in a research conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Map a role label used by the agent onto a conversation role.
    ///
    /// `user` and `human` are user turns; every other label (`assistant`,
    /// `ai`, `tool`, `system`, unknown) is treated as an agent turn.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "user" | "human" => Role::User,
            _ => Role::Assistant,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single turn in a research conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// An ordered sequence of messages in turn order.
pub type Conversation = Vec<Message>;

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }

    /// Create a user message stamped with the current time.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            timestamp: Some(Utc::now()),
            ..Self::new(Role::User, content)
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Normalize a message returned by the agent.
    ///
    /// The agent may return plain `{role, content}` mappings or serialized
    /// message objects that carry the role under `type` (`human`, `ai`, ...)
    /// and content as a list of text parts. A missing role means an agent
    /// turn; a missing content means an empty one.
    pub fn from_agent_value(value: &Value) -> Self {
        match value {
            Value::String(text) => Self::assistant(text.clone()),
            Value::Object(map) => {
                let role = map
                    .get("role")
                    .or_else(|| map.get("type"))
                    .and_then(Value::as_str)
                    .map(Role::from_label)
                    .unwrap_or(Role::Assistant);
                let content = map.get("content").map(content_text).unwrap_or_default();
                let timestamp = map
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc));
                Self {
                    role,
                    content,
                    timestamp,
                }
            }
            other => Self::assistant(other.to_string()),
        }
    }

    /// Render the message in the `{role, content}` shape the agent consumes.
    pub fn to_agent_value(&self) -> Value {
        serde_json::json!({
            "role": self.role.to_string(),
            "content": self.content,
        })
    }
}

fn content_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.clone()),
                Value::Object(obj) => obj.get("text").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
