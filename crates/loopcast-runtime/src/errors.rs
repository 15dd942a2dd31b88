//! Runtime error types.

use loopcast_core::{ClientError, OperationKind};

/// Misuse of the single-flight session.
///
/// These are programming errors in the controllers, never broker failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// An operation is already outstanding.
    #[error("session occupied: {outstanding} in flight, cannot issue {requested}")]
    Occupied {
        /// Operation currently in flight.
        outstanding: OperationKind,
        /// Operation that was refused.
        requested: OperationKind,
    },

    /// Unsubscribe named a different channel set than the outstanding subscribe.
    #[error("unsubscribe channels {requested} do not match subscribed {subscribed}")]
    ChannelMismatch {
        /// Channels of the outstanding subscribe.
        subscribed: String,
        /// Channels named by the unsubscribe.
        requested: String,
    },

    /// The session was closed.
    #[error("session closed")]
    Closed,
}

/// Terminal failures of the orchestration layer.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A session operation completed with a fatal outcome.
    #[error("{op} failed: {source}")]
    Fatal {
        /// Operation that failed.
        op: OperationKind,
        /// Client error behind the outcome.
        #[source]
        source: ClientError,
    },

    /// A completion arrived that the owning controller cannot accept.
    #[error("unexpected {outcome} outcome for {op} while {state}")]
    UnexpectedOutcome {
        /// Operation the completion belongs to.
        op: OperationKind,
        /// Outcome label (`success`, `cancelled`, `fatal`).
        outcome: &'static str,
        /// Controller state at the time.
        state: &'static str,
    },

    /// `start()` was called while the subscribe loop was not stopped.
    #[error("subscribe loop already active ({0})")]
    LoopAlreadyActive(&'static str),

    /// Session guard violation.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl RuntimeError {
    /// Wrap a fatal client error for `op`.
    pub fn fatal(op: OperationKind, source: ClientError) -> Self {
        Self::Fatal { op, source }
    }

    /// Operation involved, when there is one.
    pub fn operation(&self) -> Option<OperationKind> {
        match self {
            Self::Fatal { op, .. } | Self::UnexpectedOutcome { op, .. } => Some(*op),
            Self::LoopAlreadyActive(_) => Some(OperationKind::Subscribe),
            Self::Session(SessionError::Occupied { requested, .. }) => Some(*requested),
            Self::Session(SessionError::ChannelMismatch { .. }) => {
                Some(OperationKind::Unsubscribe)
            }
            Self::Session(SessionError::Closed) => None,
        }
    }

    /// Error category string for log fields.
    pub fn category(&self) -> &str {
        match self {
            Self::Fatal { source, .. } => source.category(),
            Self::UnexpectedOutcome { .. } => "unexpected_outcome",
            Self::LoopAlreadyActive(_) => "loop_already_active",
            Self::Session(_) => "session",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_display_names_operation() {
        let err = RuntimeError::fatal(OperationKind::Publish, ClientError::Timeout);
        assert!(err.to_string().starts_with("publish failed"));
        assert_eq!(err.operation(), Some(OperationKind::Publish));
    }

    #[test]
    fn category_delegates_to_client_error() {
        let err = RuntimeError::fatal(
            OperationKind::Subscribe,
            ClientError::Status {
                status: 403,
                message: "Forbidden".into(),
            },
        );
        assert_eq!(err.category(), "auth");
        assert_eq!(
            RuntimeError::LoopAlreadyActive("running").category(),
            "loop_already_active"
        );
    }

    #[test]
    fn occupied_message() {
        let err = SessionError::Occupied {
            outstanding: OperationKind::Subscribe,
            requested: OperationKind::Publish,
        };
        assert_eq!(
            err.to_string(),
            "session occupied: subscribe in flight, cannot issue publish"
        );
        assert_eq!(RuntimeError::from(err).category(), "session");
    }
}
