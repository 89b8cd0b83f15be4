//! Error types for the debate system.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DebateError {
    #[error("Missing required configuration: {}", .0.join(", "))]
    MissingConfiguration(Vec<String>),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid debate settings: {0}")]
    InvalidSettings(String),

    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("TTS error: {0}")]
    TtsError(String),

    #[error("No debate is in progress")]
    NoActiveDebate,

    #[error("A debate is already in progress")]
    DebateInProgress,

    #[error("The AI is still responding")]
    TurnInProgress,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Unknown debate record: {0}")]
    UnknownRecord(String),
}

impl DebateError {
    /// Whether the call policy may retry the operation that produced this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            DebateError::Http(e) => e.is_timeout() || e.is_connect(),
            DebateError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
