//! Subscribe loop controller.
//!
//! ```text
//!            start()                 request_cancel()
//!  Stopped ──────────▶ Running ───────────────────────▶ CancelPending
//!     ▲                 │  ▲ success: deliver + reissue        │
//!     │                 └──┘                                   │
//!     └─────────────────────── cancelled ──────────────────────┘
//! ```
//!
//! Every success while `Running` reissues the subscribe exactly once. A
//! cancelled outcome stops the loop without reissuing; only `start()` brings
//! it back.

use loopcast_core::{ChannelSet, Delivery, OperationKind, Outcome};

use crate::errors::RuntimeError;
use crate::session::OpRequest;

/// Subscribe loop state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopState {
    /// No subscribe outstanding.
    #[default]
    Stopped,
    /// A subscribe is outstanding and will be reissued on success.
    Running,
    /// An unsubscribe was requested; waiting for the cancelled outcome.
    CancelPending,
}

impl LoopState {
    /// Stable name for logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::CancelPending => "cancel_pending",
        }
    }
}

/// What the orchestrator should do after a subscribe outcome.
#[derive(Debug)]
pub enum LoopStep {
    /// Hand `deliveries` to the observer, then issue `request`.
    Reissue {
        /// Messages of the finished cycle, in order.
        deliveries: Vec<Delivery>,
        /// The next subscribe.
        request: OpRequest,
    },
    /// The loop stopped. `deliveries` is non-empty only when a cycle
    /// completed with messages just as the cancel was requested.
    Stop {
        /// Messages of the finished cycle, in order.
        deliveries: Vec<Delivery>,
    },
    /// The subscribe failed.
    Fatal(RuntimeError),
}

/// Subscribe loop state machine.
#[derive(Clone, Debug)]
pub struct SubscribeLoop {
    state: LoopState,
    channels: ChannelSet,
    cycles: u64,
}

impl SubscribeLoop {
    /// Create a stopped loop over `channels`.
    pub fn new(channels: ChannelSet) -> Self {
        Self {
            state: LoopState::Stopped,
            channels,
            cycles: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Subscribe outcomes handled so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Channels the loop listens on.
    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    /// Start listening. Only valid while `Stopped`.
    pub fn start(&mut self) -> Result<OpRequest, RuntimeError> {
        if self.state != LoopState::Stopped {
            return Err(RuntimeError::LoopAlreadyActive(self.state.as_str()));
        }
        self.state = LoopState::Running;
        Ok(self.request())
    }

    /// Mark the outstanding subscribe as being cancelled.
    ///
    /// Returns `false` (and changes nothing) unless the loop is `Running`.
    pub fn request_cancel(&mut self) -> bool {
        if self.state == LoopState::Running {
            self.state = LoopState::CancelPending;
            true
        } else {
            false
        }
    }

    /// Handle one subscribe outcome.
    pub fn on_outcome(&mut self, outcome: Outcome<Vec<Delivery>>) -> LoopStep {
        let state = self.state;
        if state == LoopState::Stopped {
            return LoopStep::Fatal(RuntimeError::UnexpectedOutcome {
                op: OperationKind::Subscribe,
                outcome: outcome.label(),
                state: state.as_str(),
            });
        }
        self.cycles += 1;

        match outcome {
            Outcome::Success(deliveries) if state == LoopState::Running => LoopStep::Reissue {
                deliveries,
                request: self.request(),
            },
            Outcome::Success(deliveries) => {
                self.state = LoopState::Stopped;
                LoopStep::Stop { deliveries }
            }
            Outcome::Cancelled => {
                self.state = LoopState::Stopped;
                LoopStep::Stop {
                    deliveries: Vec::new(),
                }
            }
            Outcome::Fatal(source) => {
                self.state = LoopState::Stopped;
                LoopStep::Fatal(RuntimeError::fatal(OperationKind::Subscribe, source))
            }
        }
    }

    fn request(&self) -> OpRequest {
        OpRequest::Subscribe {
            channels: self.channels.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
