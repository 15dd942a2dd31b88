//! Errors reported by a messaging client.
//!
//! Every variant ends up as [`Outcome::Fatal`](crate::outcome::Outcome::Fatal)
//! once the client has exhausted its own retry policy. [`ClientError::is_retryable`]
//! is what that policy consults.

use thiserror::Error;

/// Errors from the messaging client collaborator.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection-level failure (DNS, TLS, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete within its timeout.
    #[error("request timed out")]
    Timeout,

    /// The broker answered with a non-success HTTP status.
    #[error("broker returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Body or reason text.
        message: String,
    },

    /// The broker answered 2xx but reported failure in the body.
    #[error("broker rejected request: {0}")]
    Rejected(String),

    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    Protocol(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The request could not be built (bad origin, bad channel name).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The operation task panicked.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Rejected(_)
            | Self::Protocol(_)
            | Self::Json(_)
            | Self::InvalidRequest(_)
            | Self::Internal(_) => false,
        }
    }

    /// Error category string for logging.
    pub fn category(&self) -> &str {
        match self {
            Self::Transport(_) => "network",
            Self::Timeout => "timeout",
            Self::Status { status: 401 | 403, .. } => "auth",
            Self::Status { status: 429, .. } => "rate_limit",
            Self::Status { .. } => "status",
            Self::Rejected(_) => "rejected",
            Self::Protocol(_) | Self::Json(_) => "parse",
            Self::InvalidRequest(_) => "request",
            Self::Internal(_) => "internal",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
