//! Event dispatcher.
//!
//! The orchestrator owns the session and the three controllers. A single
//! `select!` loop waits on the completion queue, the preemption timer and
//! the shutdown token; each event runs one pure transition and issues at
//! most one operation before control returns to the loop.

use std::sync::Arc;
use std::time::Duration;

use loopcast_core::{ChannelSet, Delivery, Message, MessagingClient, OperationKind};
use loopcast_settings::{IdleUnsubscribe, LoopcastSettings};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::RuntimeError;
use crate::observer::{Notice, Observer};
use crate::preemption::{Preemption, PreemptionState, PreemptionStep};
use crate::sequencer::{Sequencer, SequencerState, SequencerStep};
use crate::session::{Completion, Issuer, OpOutcome, OpRequest, Session, Settled};
use crate::subscribe_loop::{LoopState, LoopStep, SubscribeLoop};

/// Orchestrator configuration.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Channels the subscribe loop listens on.
    pub channels: ChannelSet,
    /// Channel receiving the bootstrap and priority publishes.
    pub primary: String,
    /// Message published at startup.
    pub bootstrap_message: Message,
    /// History entries fetched after the bootstrap publish.
    pub history_count: usize,
    /// Message published by every preemption cycle.
    pub priority_message: Message,
    /// Preemption trigger period.
    pub preempt_period: Duration,
    /// Unsubscribe behaviour with no subscribe outstanding.
    pub idle_unsubscribe: IdleUnsubscribe,
}

impl OrchestratorConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &LoopcastSettings) -> loopcast_settings::Result<Self> {
        Ok(Self {
            channels: settings.channel_set()?,
            primary: settings.channels.primary.clone(),
            bootstrap_message: settings.bootstrap.message.clone(),
            history_count: settings.bootstrap.history_count,
            priority_message: settings.preemption.message.clone(),
            preempt_period: Duration::from_millis(settings.preemption.period_ms),
            idle_unsubscribe: settings.preemption.idle_unsubscribe,
        })
    }
}

/// Owns the session and drives every controller from one event queue.
pub struct Orchestrator {
    session: Session,
    completions: mpsc::UnboundedReceiver<Completion>,
    sequencer: Sequencer,
    subscribe_loop: SubscribeLoop,
    preemption: Preemption,
    observer: Arc<dyn Observer>,
    preempt_period: Duration,
}

impl Orchestrator {
    /// Create an orchestrator over `client`.
    pub fn new(
        config: OrchestratorConfig,
        client: Arc<dyn MessagingClient>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            session: Session::new(client, tx, config.idle_unsubscribe),
            completions: rx,
            sequencer: Sequencer::new(
                config.primary.clone(),
                config.bootstrap_message,
                config.history_count,
            ),
            subscribe_loop: SubscribeLoop::new(config.channels.clone()),
            preemption: Preemption::new(config.channels, config.primary, config.priority_message),
            observer,
            preempt_period: config.preempt_period,
        }
    }

    /// Bootstrap progress.
    pub fn sequencer_state(&self) -> SequencerState {
        self.sequencer.state()
    }

    /// Subscribe loop state.
    pub fn loop_state(&self) -> LoopState {
        self.subscribe_loop.state()
    }

    /// Preemption cycle progress.
    pub fn preemption_state(&self) -> PreemptionState {
        self.preemption.state()
    }

    /// Preemption cycles started so far.
    pub fn preemption_cycles(&self) -> u64 {
        self.preemption.cycles()
    }

    /// Operation outstanding on the session.
    pub fn in_flight(&self) -> Option<OperationKind> {
        self.session.in_flight()
    }

    /// Run until `shutdown` fires (`Ok`) or an operation fails (`Err`).
    ///
    /// The first preemption trigger fires one full period after start.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), RuntimeError> {
        self.bootstrap()?;

        let period = self.preempt_period;
        let mut trigger = time::interval_at(Instant::now() + period, period);
        trigger.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!("shutdown requested, leaving event loop");
                    return Ok(());
                }
                Some(completion) = self.completions.recv() => self.dispatch(completion)?,
                _ = trigger.tick() => self.on_trigger()?,
            }
        }
    }

    /// Close the session. Returns the cancelled operation's task, if any.
    pub fn close(&mut self) -> Option<JoinHandle<()>> {
        self.session.close()
    }

    fn bootstrap(&mut self) -> Result<(), RuntimeError> {
        info!(channel = %self.subscribe_loop.channels(), "starting bootstrap");
        let step = self.sequencer.start();
        self.apply_sequencer(step)
    }

    fn dispatch(&mut self, completion: Completion) -> Result<(), RuntimeError> {
        let Some(Settled { issuer, outcome }) = self.session.settle(completion) else {
            return Ok(());
        };

        match (issuer, outcome) {
            (Issuer::Bootstrap, OpOutcome::Published(outcome)) => {
                if outcome.is_success() {
                    self.observer.on_notice(&Notice::Published);
                }
                let step = self.sequencer.on_published(outcome);
                self.apply_sequencer(step)?;
            }
            (Issuer::Bootstrap, OpOutcome::History(outcome)) => {
                let step = self.sequencer.on_history(outcome);
                self.apply_sequencer(step)?;
            }
            (Issuer::Loop, OpOutcome::Subscribed(outcome)) => {
                if outcome.is_cancelled() {
                    debug!("subscribe cancelled");
                }
                let step = self.subscribe_loop.on_outcome(outcome);
                self.apply_loop(step)?;
            }
            (Issuer::Preemption, OpOutcome::Unsubscribed(outcome)) => {
                if outcome.is_success() {
                    self.observer.on_notice(&Notice::UnsubscribeOk);
                }
                let step = self.preemption.on_unsubscribed(outcome);
                self.apply_preemption(step)?;
            }
            (Issuer::Preemption, OpOutcome::Published(outcome)) => {
                if outcome.is_success() {
                    self.observer.on_notice(&Notice::PriorityPublished);
                }
                let step = self.preemption.on_published(outcome);
                self.apply_preemption(step)?;
            }
            (issuer, outcome) => {
                return Err(RuntimeError::UnexpectedOutcome {
                    op: outcome.kind(),
                    outcome: outcome.label(),
                    state: issuer.as_str(),
                });
            }
        }

        if let Some(request) = self.preemption.take_deferred(self.preemption_ready()) {
            self.start_preemption(request)?;
        }
        Ok(())
    }

    fn on_trigger(&mut self) -> Result<(), RuntimeError> {
        match self.preemption.on_trigger(self.preemption_ready()) {
            PreemptionStep::Issue(request) => self.start_preemption(request),
            step => self.apply_preemption(step),
        }
    }

    /// The session can take a preemption unsubscribe: bootstrap is over and
    /// nothing but the loop's own subscribe is outstanding.
    fn preemption_ready(&self) -> bool {
        self.sequencer.is_done()
            && self.preemption.state() == PreemptionState::Idle
            && (self.session.is_idle()
                || (self.session.is_listening()
                    && self.subscribe_loop.state() == LoopState::Running))
    }

    fn start_preemption(&mut self, request: OpRequest) -> Result<(), RuntimeError> {
        info!(
            cycle = self.preemption.cycles(),
            loop_state = self.subscribe_loop.state().as_str(),
            "preempting subscribe loop"
        );
        self.observer.on_notice(&Notice::PreemptionStarted);
        let _ = self.subscribe_loop.request_cancel();
        self.session.issue(Issuer::Preemption, request)?;
        Ok(())
    }

    fn start_loop(&mut self) -> Result<(), RuntimeError> {
        let request = self.subscribe_loop.start()?;
        self.session.issue(Issuer::Loop, request)?;
        Ok(())
    }

    fn apply_sequencer(&mut self, step: SequencerStep) -> Result<(), RuntimeError> {
        match step {
            SequencerStep::Issue(request) => {
                self.session.issue(Issuer::Bootstrap, request)?;
                Ok(())
            }
            SequencerStep::HandOff(history) => {
                info!(entries = history.len(), "bootstrap complete, starting subscribe loop");
                self.observer
                    .on_notice(&Notice::HistoryReceived { entries: history });
                self.start_loop()
            }
            SequencerStep::Fatal(e) => Err(e),
        }
    }

    fn apply_loop(&mut self, step: LoopStep) -> Result<(), RuntimeError> {
        match step {
            LoopStep::Reissue {
                deliveries,
                request,
            } => {
                if deliveries.is_empty() {
                    self.observer.on_notice(&Notice::SubscribeNoNews);
                } else {
                    self.deliver(&deliveries);
                }
                self.session.issue(Issuer::Loop, request)?;
                Ok(())
            }
            LoopStep::Stop { deliveries } => {
                self.deliver(&deliveries);
                debug!(cycles = self.subscribe_loop.cycles(), "subscribe loop stopped");
                Ok(())
            }
            LoopStep::Fatal(e) => Err(e),
        }
    }

    fn apply_preemption(&mut self, step: PreemptionStep) -> Result<(), RuntimeError> {
        match step {
            PreemptionStep::Issue(request) => {
                self.session.issue(Issuer::Preemption, request)?;
                Ok(())
            }
            PreemptionStep::Deferred => Ok(()),
            PreemptionStep::Resume => {
                debug!("priority publish done, resuming subscribe loop");
                self.start_loop()
            }
            PreemptionStep::Fatal(e) => Err(e),
        }
    }

    fn deliver(&self, deliveries: &[Delivery]) {
        for delivery in deliveries {
            debug!(channel = %delivery.channel, "message received");
            self.observer.on_delivery(delivery);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
