//! Error types for the wardops domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use crate::task::TaskStatus;
use thiserror::Error;

/// The top-level error type for all wardops operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Task store errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Domain operation errors ---
    #[error("Ward error: {0}")]
    Ward(#[from] WardError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures talking to the completion provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// 4xx. The request itself is wrong; no model in the ladder will accept it.
    #[error("Request rejected by provider (status: {status}): {message}")]
    ClientRequest { status: u16, message: String },

    /// 5xx. Retried with backoff, then the ladder falls back.
    #[error("Provider server error (status: {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The response arrived but is missing or has invalid fields.
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Map an HTTP status and body onto the client/server split.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if (400..500).contains(&status) {
            Self::ClientRequest { status, message }
        } else {
            Self::Server { status, message }
        }
    }

    /// Transient failures: worth retrying against the same model.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Server { .. } | Self::Network(_) | Self::Timeout(_)
        )
    }

    /// Failures that must abort the whole ladder.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ClientRequest { .. } | Self::NotConfigured(_))
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("{tool_name} failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}

/// Failures of the task store and its change feed.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Subscription failed: {0}")]
    Subscription(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Failures of the ward domain operations (admit, discharge, lookups).
#[derive(Debug, Error)]
pub enum WardError {
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Patient not found: {0}")]
    PatientNotFound(String),

    #[error("Room {room_id} is occupied by {patient_id}")]
    RoomOccupied { room_id: String, patient_id: String },

    #[error("No room available matching the request")]
    NoRoomAvailable,

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_split_into_client_and_server() {
        assert!(ProviderError::from_status(400, "bad").is_client_error());
        assert!(ProviderError::from_status(429, "slow down").is_client_error());
        assert!(ProviderError::from_status(500, "boom").is_retryable());
        assert!(ProviderError::from_status(503, "unavailable").is_retryable());
    }

    #[test]
    fn malformed_is_neither_retryable_nor_client() {
        let err = ProviderError::MalformedResponse("no choices".into());
        assert!(!err.is_retryable());
        assert!(!err.is_client_error());
    }

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::Server {
            status: 502,
            message: "Bad Gateway".into(),
        });
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("Bad Gateway"));
    }

    #[test]
    fn transition_error_names_both_states() {
        let err = BackendError::InvalidTransition {
            task_id: "t-1".into(),
            from: TaskStatus::Completed,
            to: TaskStatus::Pending,
        };
        let text = err.to_string();
        assert!(text.contains("completed"));
        assert!(text.contains("pending"));
    }
}
