//! Error types for the OrchestraAI research core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering agent invocation, history persistence, and configuration.

use std::path::PathBuf;

/// Top-level error type for the research core.
#[derive(Debug, thiserror::Error)]
pub enum OrchestraError {
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),
}

/// Errors raised while invoking the external research agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent request failed: {message}")]
    Request { message: String },

    #[error("Agent returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Agent response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Failed to start async runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Agent run failed: {message}")]
    Failed { message: String },
}

/// Errors from the research history log.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("History I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to lock history at {path}: {message}")]
    Lock { path: PathBuf, message: String },
}

impl HistoryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Configuration serialize error: {message}")]
    Serialize { message: String },
}

/// A type alias for results using the top-level `OrchestraError`.
pub type Result<T> = std::result::Result<T, OrchestraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_agent() {
        let err = OrchestraError::Agent(AgentError::Request {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "Agent error: Agent request failed: connection refused"
        );
    }

    #[test]
    fn test_error_display_http() {
        let err = AgentError::Http {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "Agent returned HTTP 502: bad gateway");
    }

    #[test]
    fn test_error_display_history() {
        let err = OrchestraError::History(HistoryError::io(
            "/tmp/history.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        ));
        assert_eq!(
            err.to_string(),
            "History error: History I/O failed for /tmp/history.json: denied"
        );
    }

    #[test]
    fn test_error_display_config() {
        let err = ConfigError::Invalid {
            message: "agent.base_url is empty".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration: agent.base_url is empty"
        );
    }

    #[test]
    fn test_agent_runtime_error_from_io() {
        let io_err = std::io::Error::other("no threads");
        let err: AgentError = io_err.into();
        assert!(matches!(err, AgentError::Runtime(_)));
    }
}
