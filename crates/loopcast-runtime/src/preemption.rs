//! Periodic priority publish that interrupts the subscribe loop.
//!
//! One cycle: unsubscribe (cancelling the outstanding subscribe) → publish
//! the priority message → resume the loop. A trigger that arrives while the
//! session is busy with something other than the loop's subscribe is
//! deferred; deferred triggers coalesce into one.

use loopcast_core::{ChannelSet, Message, OperationKind, Outcome};
use tracing::debug;

use crate::errors::RuntimeError;
use crate::session::OpRequest;

/// Preemption cycle progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PreemptionState {
    /// No cycle running.
    #[default]
    Idle,
    /// Waiting for the unsubscribe outcome.
    Unsubscribing,
    /// Waiting for the priority publish outcome.
    Publishing,
}

impl PreemptionState {
    /// Stable name for logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Unsubscribing => "unsubscribing",
            Self::Publishing => "publishing",
        }
    }
}

/// What the orchestrator should do next.
#[derive(Debug)]
pub enum PreemptionStep {
    /// Issue this request on the session.
    Issue(OpRequest),
    /// The trigger was recorded for later.
    Deferred,
    /// The priority publish succeeded; restart the subscribe loop.
    Resume,
    /// The cycle failed.
    Fatal(RuntimeError),
}

/// Preemption state machine.
#[derive(Clone, Debug)]
pub struct Preemption {
    state: PreemptionState,
    deferred: bool,
    channels: ChannelSet,
    primary: String,
    message: Message,
    cycles: u64,
}

impl Preemption {
    /// Create an idle controller.
    pub fn new(channels: ChannelSet, primary: impl Into<String>, message: Message) -> Self {
        Self {
            state: PreemptionState::Idle,
            deferred: false,
            channels,
            primary: primary.into(),
            message,
            cycles: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> PreemptionState {
        self.state
    }

    /// Whether a trigger is waiting.
    pub fn has_deferred(&self) -> bool {
        self.deferred
    }

    /// Cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Handle a timer trigger. `ready` tells whether the session can take
    /// an unsubscribe right now.
    pub fn on_trigger(&mut self, ready: bool) -> PreemptionStep {
        if self.state != PreemptionState::Idle || !ready {
            if !self.deferred {
                debug!(state = self.state.as_str(), "preemption deferred");
            }
            self.deferred = true;
            return PreemptionStep::Deferred;
        }
        self.begin()
    }

    /// Start a deferred cycle if one is waiting and the session is ready.
    pub fn take_deferred(&mut self, ready: bool) -> Option<OpRequest> {
        if !self.deferred || !ready || self.state != PreemptionState::Idle {
            return None;
        }
        match self.begin() {
            PreemptionStep::Issue(request) => Some(request),
            _ => None,
        }
    }

    /// Handle the unsubscribe outcome.
    pub fn on_unsubscribed(&mut self, outcome: Outcome<()>) -> PreemptionStep {
        if self.state != PreemptionState::Unsubscribing {
            return self.unexpected(OperationKind::Unsubscribe, outcome.label());
        }
        match outcome {
            Outcome::Success(()) => {
                self.state = PreemptionState::Publishing;
                PreemptionStep::Issue(OpRequest::Publish {
                    channel: self.primary.clone(),
                    message: self.message.clone(),
                })
            }
            other => self.fail(OperationKind::Unsubscribe, other),
        }
    }

    /// Handle the priority publish outcome.
    pub fn on_published(&mut self, outcome: Outcome<()>) -> PreemptionStep {
        if self.state != PreemptionState::Publishing {
            return self.unexpected(OperationKind::Publish, outcome.label());
        }
        match outcome {
            Outcome::Success(()) => {
                self.state = PreemptionState::Idle;
                PreemptionStep::Resume
            }
            other => self.fail(OperationKind::Publish, other),
        }
    }

    fn begin(&mut self) -> PreemptionStep {
        self.deferred = false;
        self.state = PreemptionState::Unsubscribing;
        self.cycles += 1;
        PreemptionStep::Issue(OpRequest::Unsubscribe {
            channels: self.channels.clone(),
        })
    }

    fn fail<T>(&mut self, op: OperationKind, outcome: Outcome<T>) -> PreemptionStep {
        let state = self.state.as_str();
        self.state = PreemptionState::Idle;
        self.deferred = false;
        PreemptionStep::Fatal(match outcome {
            Outcome::Fatal(source) => RuntimeError::fatal(op, source),
            other => RuntimeError::UnexpectedOutcome {
                op,
                outcome: other.label(),
                state,
            },
        })
    }

    fn unexpected(&mut self, op: OperationKind, outcome: &'static str) -> PreemptionStep {
        PreemptionStep::Fatal(RuntimeError::UnexpectedOutcome {
            op,
            outcome,
            state: self.state.as_str(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use loopcast_core::ClientError;

    fn controller() -> Preemption {
        Preemption::new(
            ChannelSet::new(["my_channel", "demo_channel"]).unwrap(),
            "my_channel",
            Message::new(37, "priority"),
        )
    }

    #[test]
    fn full_cycle() {
        let mut p = controller();
        assert_matches!(p.on_trigger(true), PreemptionStep::Issue(OpRequest::Unsubscribe { .. }));
        assert_eq!(p.state(), PreemptionState::Unsubscribing);

        assert_matches!(
            p.on_unsubscribed(Outcome::Success(())),
            PreemptionStep::Issue(OpRequest::Publish { message, .. }) if message.num == 37
        );
        assert_eq!(p.state(), PreemptionState::Publishing);

        assert_matches!(p.on_published(Outcome::Success(())), PreemptionStep::Resume);
        assert_eq!(p.state(), PreemptionState::Idle);
        assert_eq!(p.cycles(), 1);
    }

    #[test]
    fn trigger_while_busy_is_deferred_and_coalesced() {
        let mut p = controller();
        assert_matches!(p.on_trigger(false), PreemptionStep::Deferred);
        assert_matches!(p.on_trigger(false), PreemptionStep::Deferred);
        assert!(p.has_deferred());

        assert!(p.take_deferred(false).is_none());
        assert_matches!(p.take_deferred(true), Some(OpRequest::Unsubscribe { .. }));
        assert!(!p.has_deferred());
        assert!(p.take_deferred(true).is_none());
        assert_eq!(p.cycles(), 1);
    }

    #[test]
    fn trigger_during_cycle_is_deferred() {
        let mut p = controller();
        let _ = p.on_trigger(true);
        assert_matches!(p.on_trigger(true), PreemptionStep::Deferred);
        assert!(p.take_deferred(true).is_none());

        let _ = p.on_unsubscribed(Outcome::Success(()));
        let _ = p.on_published(Outcome::Success(()));
        assert_matches!(p.take_deferred(true), Some(_));
        assert_eq!(p.cycles(), 2);
    }

    #[test]
    fn unsubscribe_failure_is_fatal() {
        let mut p = controller();
        let _ = p.on_trigger(true);
        assert_matches!(
            p.on_unsubscribed(Outcome::Fatal(ClientError::Timeout)),
            PreemptionStep::Fatal(RuntimeError::Fatal { op: OperationKind::Unsubscribe, .. })
        );
    }

    #[test]
    fn cancelled_unsubscribe_is_not_success() {
        let mut p = controller();
        let _ = p.on_trigger(true);
        assert_matches!(
            p.on_unsubscribed(Outcome::Cancelled),
            PreemptionStep::Fatal(RuntimeError::UnexpectedOutcome { outcome: "cancelled", .. })
        );
    }

    #[test]
    fn publish_failure_is_fatal() {
        let mut p = controller();
        let _ = p.on_trigger(true);
        let _ = p.on_unsubscribed(Outcome::Success(()));
        assert_matches!(
            p.on_published(Outcome::Fatal(ClientError::Rejected("no".into()))),
            PreemptionStep::Fatal(RuntimeError::Fatal { op: OperationKind::Publish, .. })
        );
    }

    #[test]
    fn stray_outcomes_are_unexpected() {
        let mut p = controller();
        assert_matches!(p.on_published(Outcome::Success(())), PreemptionStep::Fatal(_));
        assert_matches!(p.on_unsubscribed(Outcome::Success(())), PreemptionStep::Fatal(_));
    }
}
