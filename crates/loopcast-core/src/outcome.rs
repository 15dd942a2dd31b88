//! The three-kind outcome taxonomy shared by every session operation.
//!
//! - [`Outcome::Success`]: completed with a usable (possibly empty) payload
//! - [`Outcome::Cancelled`]: an outstanding subscribe was torn down by a
//!   matching unsubscribe; an expected transition, never a failure
//! - [`Outcome::Fatal`]: anything else, after the client's own retries

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ClientError;

/// The kind of request issued against a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Publish one message to a channel.
    Publish,
    /// Fetch prior messages of a channel.
    FetchHistory,
    /// Long-poll for new messages on a channel set.
    Subscribe,
    /// Tear down the subscription on a channel set.
    Unsubscribe,
}

impl OperationKind {
    /// Stable name for logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::FetchHistory => "fetch_history",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged result of one asynchronous operation.
#[derive(Debug)]
pub enum Outcome<T> {
    /// Completed with a payload.
    Success(T),
    /// Deliberately terminated by a matching unsubscribe.
    Cancelled,
    /// Unrecoverable at the orchestration layer.
    Fatal(ClientError),
}

impl<T> Outcome<T> {
    /// Map a client result into an outcome.
    pub fn from_result(result: Result<T, ClientError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(e) => Self::Fatal(e),
        }
    }

    /// Whether this is [`Outcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether this is [`Outcome::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this is [`Outcome::Fatal`].
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Transform the success payload.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(v) => Outcome::Success(f(v)),
            Self::Cancelled => Outcome::Cancelled,
            Self::Fatal(e) => Outcome::Fatal(e),
        }
    }

    /// Short label (`"success"`, `"cancelled"`, `"fatal"`).
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Cancelled => "cancelled",
            Self::Fatal(_) => "fatal",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn kind_names() {
        assert_eq!(OperationKind::Publish.to_string(), "publish");
        assert_eq!(OperationKind::FetchHistory.to_string(), "fetch_history");
        assert_eq!(
            serde_json::to_string(&OperationKind::Unsubscribe).unwrap(),
            "\"unsubscribe\""
        );
    }

    #[test]
    fn from_result_maps_errors_to_fatal() {
        let ok: Outcome<u8> = Outcome::from_result(Ok(1));
        assert_matches!(ok, Outcome::Success(1));

        let err: Outcome<u8> = Outcome::from_result(Err(ClientError::Timeout));
        assert!(err.is_fatal());
        assert_eq!(err.label(), "fatal");
    }

    #[test]
    fn map_preserves_cancelled() {
        let cancelled: Outcome<u8> = Outcome::Cancelled;
        let mapped = cancelled.map(|v| v + 1);
        assert!(mapped.is_cancelled());

        let success = Outcome::Success(2u8).map(u32::from);
        assert_matches!(success, Outcome::Success(2u32));
    }
}
