//! Error types for the form assistant

use serde::ser::{Serialize, SerializeStruct, Serializer};
use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, FormHelperError>;

/// Main error type for the form assistant
#[derive(Error, Debug)]
pub enum FormHelperError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Memory store unavailable: {0}")]
    MemoryUnavailable(String),

    #[error("Memory entry not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Knowledge base error: {0}")]
    Knowledge(String),

    #[error("Remote reasoning error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation timed out after {0} ms")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FormHelperError {
    /// Check if error is retryable
    ///
    /// Only the rate-limit wait is ever retried automatically; this is
    /// informational for callers that want to surface a "try again" hint.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FormHelperError::MemoryUnavailable(_)
                | FormHelperError::Timeout(_)
                | FormHelperError::Remote(RemoteError::RateLimit(_))
                | FormHelperError::Remote(RemoteError::Transport(_))
        )
    }

    /// Stable error code for API responses
    pub fn code(&self) -> i64 {
        match self {
            FormHelperError::NotFound(_) => -32001,
            FormHelperError::InvalidInput(_) => -32602,
            FormHelperError::MemoryUnavailable(_) => -32002,
            FormHelperError::Remote(RemoteError::RateLimit(_)) => -32004,
            FormHelperError::Remote(_) => -32007,
            FormHelperError::Timeout(_) => -32008,
            FormHelperError::Config(_) => -32009,
            _ => -32000,
        }
    }
}

/// Failure classes of the remote reasoning boundary.
///
/// Every variant degrades to the local strategy chain at the router layer.
/// The detail strings may hold upstream bodies; they go to logs only and are
/// never serialized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote service not configured: {0}")]
    Configuration(String),

    #[error("remote service rate limited: {0}")]
    RateLimit(String),

    #[error("remote transport failure: {0}")]
    Transport(String),

    #[error("remote service returned an empty response")]
    EmptyResponse,
}

impl RemoteError {
    /// Short, user-safe description of the failure
    pub fn user_message(&self) -> &'static str {
        match self {
            RemoteError::Configuration(_) => "The AI assistant is not configured.",
            RemoteError::RateLimit(_) => "The AI assistant is busy right now.",
            RemoteError::Transport(_) => "The AI assistant could not be reached.",
            RemoteError::EmptyResponse => "The AI assistant returned no answer.",
        }
    }

    /// Stable label used in logs and diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteError::Configuration(_) => "configuration",
            RemoteError::RateLimit(_) => "rate_limit",
            RemoteError::Transport(_) => "transport",
            RemoteError::EmptyResponse => "empty_response",
        }
    }
}

impl Serialize for RemoteError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RemoteError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", self.user_message())?;
        state.end()
    }
}

#[cfg(feature = "openai")]
impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        RemoteError::Transport(e.to_string())
    }
}
