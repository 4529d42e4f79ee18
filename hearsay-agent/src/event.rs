// ABOUTME: Fragment types emitted by agent sessions while answering a query.
// ABOUTME: Thought fragments are intermediate reasoning; Text fragments form the reply.

use serde::{Deserialize, Serialize};

/// Fragments emitted by an agent session during one query/response turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AgentEvent {
    /// Intermediate reasoning; consumers discard these
    Thought(String),

    /// Final answer text, delivered in emission order
    Text(String),

    /// Error occurred during the turn
    Error {
        /// Typed error code for programmatic handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
    },
}

/// Typed error codes for programmatic handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    /// Request timed out
    Timeout,
    /// Rate limited by the backend
    RateLimited,
    /// Permission denied for operation
    PermissionDenied,
    /// Backend-specific error
    BackendError,
}
