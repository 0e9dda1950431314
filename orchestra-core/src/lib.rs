//! # OrchestraAI Core
//!
//! Core library for the OrchestraAI research front-end.
//! Provides the research session controller, the blocking bridge over the
//! async research agent, the history log, configuration, and shared types.

pub mod config;
pub mod error;
pub mod persistence;
pub mod research;
pub mod types;

// Re-export commonly used types at the crate root.
pub use config::{AppConfig, Provider, Settings, SettingsUpdate, config_exists, load_config};
pub use error::{AgentError, ConfigError, HistoryError, OrchestraError, Result};
pub use research::{
    Action, AgentResponse, ControllerState, HistoryStore, InvocationConfig, MockResearchAgent,
    Outcome, Rejection, RemoteResearchAgent, ResearchAgent, ResearchController, SessionPhase,
    SessionRecord, SessionStore,
};
pub use types::{Conversation, Message, Role};
