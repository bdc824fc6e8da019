//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Credentials could not be resolved (raised at client construction)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The model client failed during a turn
    #[error("Model call failed: {0}")]
    ModelCall(String),

    /// Transport-level failure inside a model client
    #[error("Provider error: {0}")]
    Provider(String),

    /// Tool not found in registry
    #[error("tool '{0}' not found")]
    ToolNotFound(String),

    /// Tool execution failed
    #[error("tool '{name}' failed: {message}")]
    ToolExecution { name: String, message: String },

    /// Parse error (e.g., malformed stream payload)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    pub fn tool_execution(name: impl Into<String>, message: impl Into<String>) -> Self {
        AgentError::ToolExecution {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Wrap any failure coming out of a model client as a `ModelCall` error.
    ///
    /// Errors that are already `ModelCall` pass through untouched so that
    /// nested wrapping never stacks prefixes.
    pub fn into_model_call(self) -> Self {
        match self {
            AgentError::ModelCall(_) => self,
            AgentError::Provider(msg) | AgentError::Other(msg) => AgentError::ModelCall(msg),
            other => AgentError::ModelCall(other.to_string()),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ModelCall(_) | AgentError::Provider(_) | AgentError::Io(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Configuration(_) => {
                "The language model is not configured. Check the API key and base URL.".into()
            }
            AgentError::ModelCall(msg) | AgentError::Provider(msg) => {
                format!("The AI service encountered an error: {}", msg)
            }
            AgentError::ToolNotFound(name) => format!("The tool '{}' is not available.", name),
            AgentError::ToolExecution { message, .. } => format!("Tool error: {}", message),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}
