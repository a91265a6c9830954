//! Error types for the Pincer domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator boundary has its own error enum.

use thiserror::Error;

/// The top-level error type for all Pincer operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("LLM call failed: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Session store errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Bus / channel errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The token consumer asked the engine to stop mid-stream.
    /// `partial` holds everything streamed before the stop.
    #[error("Turn cancelled by token consumer: {reason}")]
    Cancelled { reason: String, partial: String },

}

impl Error {
    /// Partial content carried by a cancelled turn, if any.
    pub fn partial_content(&self) -> Option<&str> {
        match self {
            Self::Cancelled { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Failed to encode session {key}: {reason}")]
    Encode { key: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Message bus closed: {0}")]
    Closed(String),
}
