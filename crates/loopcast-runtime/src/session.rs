//! Single-flight session handle.
//!
//! The session wraps a [`MessagingClient`] and allows at most one outstanding
//! operation. Each issued operation runs as a spawned task and posts a
//! [`Completion`] to the orchestrator's event queue; the orchestrator hands
//! it back through [`Session::settle`], which frees the slot.
//!
//! Unsubscribing while a subscribe is outstanding is the one sanctioned way
//! to "interrupt" the slot: the subscribe's cancellation token fires and the
//! leave request is recorded as pending. It is only sent once the subscribe's
//! `Cancelled` completion has been settled, so the two operations are never
//! outstanding together and the cancellation is always observed first.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use loopcast_core::{
    ChannelSet, ClientError, Delivery, History, Message, MessagingClient, OperationKind, Outcome,
};
use loopcast_settings::IdleUnsubscribe;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::errors::SessionError;

/// A request to issue against the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpRequest {
    /// Publish `message` on `channel`.
    Publish {
        /// Target channel.
        channel: String,
        /// Message to publish.
        message: Message,
    },
    /// Fetch up to `count` prior messages of `channel`.
    FetchHistory {
        /// Source channel.
        channel: String,
        /// Maximum number of entries.
        count: usize,
    },
    /// Long-poll `channels` for new messages.
    Subscribe {
        /// Channels to listen on.
        channels: ChannelSet,
    },
    /// Leave `channels`, cancelling an outstanding subscribe on them.
    Unsubscribe {
        /// Channels to leave.
        channels: ChannelSet,
    },
}

impl OpRequest {
    /// Operation kind of this request.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Publish { .. } => OperationKind::Publish,
            Self::FetchHistory { .. } => OperationKind::FetchHistory,
            Self::Subscribe { .. } => OperationKind::Subscribe,
            Self::Unsubscribe { .. } => OperationKind::Unsubscribe,
        }
    }
}

/// Typed outcome of one settled operation.
#[derive(Debug)]
pub enum OpOutcome {
    /// Result of a publish.
    Published(Outcome<()>),
    /// Result of a history fetch.
    History(Outcome<History>),
    /// Result of one subscribe cycle.
    Subscribed(Outcome<Vec<Delivery>>),
    /// Result of an unsubscribe.
    Unsubscribed(Outcome<()>),
}

impl OpOutcome {
    fn cancelled(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Publish => Self::Published(Outcome::Cancelled),
            OperationKind::FetchHistory => Self::History(Outcome::Cancelled),
            OperationKind::Subscribe => Self::Subscribed(Outcome::Cancelled),
            OperationKind::Unsubscribe => Self::Unsubscribed(Outcome::Cancelled),
        }
    }

    fn failed(kind: OperationKind, error: ClientError) -> Self {
        match kind {
            OperationKind::Publish => Self::Published(Outcome::Fatal(error)),
            OperationKind::FetchHistory => Self::History(Outcome::Fatal(error)),
            OperationKind::Subscribe => Self::Subscribed(Outcome::Fatal(error)),
            OperationKind::Unsubscribe => Self::Unsubscribed(Outcome::Fatal(error)),
        }
    }

    /// Operation kind this outcome belongs to.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Published(_) => OperationKind::Publish,
            Self::History(_) => OperationKind::FetchHistory,
            Self::Subscribed(_) => OperationKind::Subscribe,
            Self::Unsubscribed(_) => OperationKind::Unsubscribe,
        }
    }

    /// Outcome label (`success`, `cancelled`, `fatal`).
    pub fn label(&self) -> &'static str {
        match self {
            Self::Published(o) | Self::Unsubscribed(o) => o.label(),
            Self::History(o) => o.label(),
            Self::Subscribed(o) => o.label(),
        }
    }
}

/// Controller that issued an operation; echoed back on its completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Issuer {
    /// The startup sequencer.
    Bootstrap,
    /// The subscribe loop.
    Loop,
    /// The preemption controller.
    Preemption,
}

impl Issuer {
    /// Stable name for logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Loop => "loop",
            Self::Preemption => "preemption",
        }
    }
}

/// Completion event posted to the orchestrator's queue.
#[derive(Debug)]
pub struct Completion {
    seq: u64,
    issuer: Issuer,
    outcome: OpOutcome,
}

impl Completion {
    /// Operation kind this completion belongs to.
    pub fn kind(&self) -> OperationKind {
        self.outcome.kind()
    }
}

/// A completion accepted by [`Session::settle`].
#[derive(Debug)]
pub struct Settled {
    /// Controller that issued the operation.
    pub issuer: Issuer,
    /// Its outcome.
    pub outcome: OpOutcome,
}

struct InFlight {
    seq: u64,
    kind: OperationKind,
    channels: Option<ChannelSet>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Single-flight handle over a messaging client.
pub struct Session {
    client: Arc<dyn MessagingClient>,
    completions: mpsc::UnboundedSender<Completion>,
    idle_unsubscribe: IdleUnsubscribe,
    in_flight: Option<InFlight>,
    pending_unsubscribe: Option<(Issuer, ChannelSet)>,
    next_seq: u64,
    closed: bool,
}

impl Session {
    /// Create a session posting completions to `completions`.
    pub fn new(
        client: Arc<dyn MessagingClient>,
        completions: mpsc::UnboundedSender<Completion>,
        idle_unsubscribe: IdleUnsubscribe,
    ) -> Self {
        Self {
            client,
            completions,
            idle_unsubscribe,
            in_flight: None,
            pending_unsubscribe: None,
            next_seq: 0,
            closed: false,
        }
    }

    /// Issue `request`. Returns immediately; the outcome arrives as a
    /// [`Completion`] on the event queue.
    pub fn issue(&mut self, issuer: Issuer, request: OpRequest) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }

        if let OpRequest::Unsubscribe { channels } = &request {
            match &self.in_flight {
                Some(flight)
                    if flight.kind == OperationKind::Subscribe
                        && self.pending_unsubscribe.is_none() =>
                {
                    if let Some(subscribed) = flight.channels.as_ref().filter(|s| *s != channels) {
                        return Err(SessionError::ChannelMismatch {
                            subscribed: subscribed.joined(),
                            requested: channels.joined(),
                        });
                    }
                    debug!(channels = %channels, "cancelling outstanding subscribe");
                    flight.cancel.cancel();
                    self.pending_unsubscribe = Some((issuer, channels.clone()));
                    return Ok(());
                }
                None if self.idle_unsubscribe == IdleUnsubscribe::Skip => {
                    debug!(channels = %channels, "no subscribe outstanding, skipping leave");
                    self.complete_now(issuer, OpOutcome::Unsubscribed(Outcome::Success(())));
                    return Ok(());
                }
                _ => {}
            }
        }

        if let Some(flight) = &self.in_flight {
            let outstanding = if self.pending_unsubscribe.is_some() {
                OperationKind::Unsubscribe
            } else {
                flight.kind
            };
            return Err(SessionError::Occupied {
                outstanding,
                requested: request.kind(),
            });
        }

        self.spawn(issuer, request);
        Ok(())
    }

    /// Accept a completion from the event queue and free the slot.
    ///
    /// Returns `None` for completions that no longer belong to the in-flight
    /// operation (e.g. after [`close`](Self::close)). Settling a cancelled
    /// subscribe starts the pending unsubscribe.
    pub fn settle(&mut self, completion: Completion) -> Option<Settled> {
        let Some(flight) = self.in_flight.take_if(|f| f.seq == completion.seq) else {
            debug!(
                seq = completion.seq,
                op = %completion.kind(),
                "ignoring stale completion"
            );
            return None;
        };
        trace!(
            seq = flight.seq,
            op = %flight.kind,
            outcome = completion.outcome.label(),
            "operation settled"
        );

        if flight.kind == OperationKind::Subscribe {
            if let Some((issuer, channels)) = self.pending_unsubscribe.take() {
                self.spawn(issuer, OpRequest::Unsubscribe { channels });
            }
        }

        Some(Settled {
            issuer: completion.issuer,
            outcome: completion.outcome,
        })
    }

    /// Operation currently outstanding, if any.
    ///
    /// A subscribe being cancelled on behalf of an unsubscribe reports as
    /// `Unsubscribe`.
    pub fn in_flight(&self) -> Option<OperationKind> {
        self.in_flight.as_ref().map(|flight| {
            if self.pending_unsubscribe.is_some() {
                OperationKind::Unsubscribe
            } else {
                flight.kind
            }
        })
    }

    /// Whether no operation is outstanding.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }

    /// Whether a subscribe is outstanding and not being cancelled.
    pub fn is_listening(&self) -> bool {
        self.in_flight() == Some(OperationKind::Subscribe)
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Cancel any outstanding operation and refuse further requests.
    ///
    /// Returns the cancelled operation's task so the caller can wait for it.
    pub fn close(&mut self) -> Option<JoinHandle<()>> {
        self.closed = true;
        self.pending_unsubscribe = None;
        let flight = self.in_flight.take()?;
        debug!(op = %flight.kind, "closing session with operation in flight");
        flight.cancel.cancel();
        flight.handle
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn complete_now(&mut self, issuer: Issuer, outcome: OpOutcome) {
        let seq = self.take_seq();
        self.in_flight = Some(InFlight {
            seq,
            kind: outcome.kind(),
            channels: None,
            cancel: CancellationToken::new(),
            handle: None,
        });
        let _ = self.completions.send(Completion {
            seq,
            issuer,
            outcome,
        });
    }

    fn spawn(&mut self, issuer: Issuer, request: OpRequest) {
        let seq = self.take_seq();
        let kind = request.kind();
        let channels = match &request {
            OpRequest::Subscribe { channels } => Some(channels.clone()),
            _ => None,
        };
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let client = Arc::clone(&self.client);
        let completions = self.completions.clone();

        debug!(seq, op = %kind, "issuing operation");
        let handle = tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => OpOutcome::cancelled(kind),
                result = AssertUnwindSafe(perform(client.as_ref(), request)).catch_unwind() => {
                    result.unwrap_or_else(|panic| {
                        let reason = panic_message(panic.as_ref());
                        error!(seq, op = %kind, reason = %reason, "operation panicked");
                        OpOutcome::failed(kind, ClientError::Internal(reason))
                    })
                }
            };
            let _ = completions.send(Completion {
                seq,
                issuer,
                outcome,
            });
        });

        self.in_flight = Some(InFlight {
            seq,
            kind,
            channels,
            cancel,
            handle: Some(handle),
        });
    }
}

async fn perform(client: &dyn MessagingClient, request: OpRequest) -> OpOutcome {
    match request {
        OpRequest::Publish { channel, message } => {
            OpOutcome::Published(outcome(client.publish(&channel, &message).await))
        }
        OpRequest::FetchHistory { channel, count } => {
            OpOutcome::History(outcome(client.history(&channel, count).await))
        }
        OpRequest::Subscribe { channels } => {
            OpOutcome::Subscribed(outcome(client.subscribe(&channels).await))
        }
        OpRequest::Unsubscribe { channels } => {
            OpOutcome::Unsubscribed(outcome(client.unsubscribe(&channels).await))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "operation panicked".to_string())
}

fn outcome<T>(result: Result<T, ClientError>) -> Outcome<T> {
    Outcome::from_result(result)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
