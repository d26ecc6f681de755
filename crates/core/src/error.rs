//! Error types for the zaibridge domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

/// The top-level error type for all zaibridge operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Caller abandoned the run ---
    #[error("Run cancelled")]
    Cancelled,

    // --- The final assistant turn carried neither text nor tool calls ---
    #[error("The model returned an empty answer")]
    EmptyAnswer,
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of a transport failure, for user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The API key was rejected.
    Authentication,
    /// The provider could not be reached, timed out, or dropped the stream.
    Connection,
    /// The provider answered but refused the request.
    Rejected,
}

// --- Bounded context errors ---

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider reported an error mid-stream: {kind}: {message}")]
    StreamError { kind: String, message: String },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Classify this error for the caller.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::AuthenticationFailed(_) | Self::NotConfigured(_) => FailureKind::Authentication,
            Self::Timeout(_) | Self::Network(_) | Self::StreamInterrupted(_) => {
                FailureKind::Connection
            }
            Self::ApiError { .. } | Self::RateLimited { .. } | Self::StreamError { .. } => {
                FailureKind::Rejected
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupt memory document: {0}")]
    Corrupt(String),
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
