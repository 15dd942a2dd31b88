//! One-shot bootstrap: publish a greeting, fetch recent history, hand off to
//! the subscribe loop.

use loopcast_core::{History, Message, OperationKind, Outcome};

use crate::errors::RuntimeError;
use crate::session::OpRequest;

/// Bootstrap progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequencerState {
    /// Not started.
    Idle,
    /// Waiting for the bootstrap publish.
    Publishing,
    /// Waiting for the history fetch.
    FetchingHistory,
    /// Handed off to the subscribe loop.
    Done,
    /// A step failed.
    Failed,
}

impl SequencerState {
    /// Stable name for logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Publishing => "publishing",
            Self::FetchingHistory => "fetching_history",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// What the orchestrator should do next.
#[derive(Debug)]
pub enum SequencerStep {
    /// Issue this request on the session.
    Issue(OpRequest),
    /// Report the history and start the subscribe loop.
    HandOff(History),
    /// Bootstrap failed.
    Fatal(RuntimeError),
}

/// Bootstrap state machine.
#[derive(Clone, Debug)]
pub struct Sequencer {
    state: SequencerState,
    channel: String,
    message: Message,
    history_count: usize,
}

impl Sequencer {
    /// Create a sequencer for `channel`.
    pub fn new(channel: impl Into<String>, message: Message, history_count: usize) -> Self {
        Self {
            state: SequencerState::Idle,
            channel: channel.into(),
            message,
            history_count,
        }
    }

    /// Current state.
    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Whether the bootstrap has handed off.
    pub fn is_done(&self) -> bool {
        self.state == SequencerState::Done
    }

    /// Begin the bootstrap. Only valid from `Idle`.
    pub fn start(&mut self) -> SequencerStep {
        if self.state != SequencerState::Idle {
            return self.unexpected(OperationKind::Publish, "start");
        }
        self.state = SequencerState::Publishing;
        SequencerStep::Issue(OpRequest::Publish {
            channel: self.channel.clone(),
            message: self.message.clone(),
        })
    }

    /// Handle the bootstrap publish outcome.
    pub fn on_published(&mut self, outcome: Outcome<()>) -> SequencerStep {
        if self.state != SequencerState::Publishing {
            return self.unexpected(OperationKind::Publish, outcome.label());
        }
        match outcome {
            Outcome::Success(()) => {
                self.state = SequencerState::FetchingHistory;
                SequencerStep::Issue(OpRequest::FetchHistory {
                    channel: self.channel.clone(),
                    count: self.history_count,
                })
            }
            other => self.fail(OperationKind::Publish, other),
        }
    }

    /// Handle the history fetch outcome.
    pub fn on_history(&mut self, outcome: Outcome<History>) -> SequencerStep {
        if self.state != SequencerState::FetchingHistory {
            return self.unexpected(OperationKind::FetchHistory, outcome.label());
        }
        match outcome {
            Outcome::Success(history) => {
                self.state = SequencerState::Done;
                SequencerStep::HandOff(history)
            }
            other => self.fail(OperationKind::FetchHistory, other),
        }
    }

    fn fail<T>(&mut self, op: OperationKind, outcome: Outcome<T>) -> SequencerStep {
        let state = self.state.as_str();
        self.state = SequencerState::Failed;
        SequencerStep::Fatal(match outcome {
            Outcome::Fatal(source) => RuntimeError::fatal(op, source),
            other => RuntimeError::UnexpectedOutcome {
                op,
                outcome: other.label(),
                state,
            },
        })
    }

    fn unexpected(&mut self, op: OperationKind, outcome: &'static str) -> SequencerStep {
        let state = self.state.as_str();
        self.state = SequencerState::Failed;
        SequencerStep::Fatal(RuntimeError::UnexpectedOutcome { op, outcome, state })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
