//! Error types for withyou.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WithYouError {
    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Model error: {0}")]
    Llm(String),

    /// Non-success HTTP status from the hosted model.
    #[error("Upstream error {status}: {message}")]
    Upstream {
        status: u16,
        message: String,
        retry_after_ms: Option<u64>,
    },

    #[error("Model request failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Safety error: {0}")]
    Safety(String),

    #[error("Triage error: {0}")]
    Triage(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WithYouError {
    /// HTTP status carried by an upstream failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            WithYouError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, WithYouError>;
