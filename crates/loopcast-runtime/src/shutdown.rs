//! Orderly shutdown via `CancellationToken`.
//!
//! A fatal outcome does not exit the process from inside a completion
//! handler. The orchestrator returns it from `run()`, and
//! [`ShutdownCoordinator::supervise`] then stops the side tasks, closes the
//! session, drains what is still running and hands the error back to `main`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::errors::RuntimeError;
use crate::orchestrator::Orchestrator;

/// How long to wait for side tasks and the cancelled operation.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the stop token shared by the orchestrator and its side tasks (the
/// clock, the interrupt watch), and the handles of those tasks.
pub struct ShutdownCoordinator {
    stop: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    /// Coordinator with a fresh token and the default drain timeout.
    pub fn new() -> Self {
        Self {
            stop: CancellationToken::new(),
            tasks: Vec::new(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Override the drain timeout.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Token that side tasks stop on. Cancelling it also ends the run.
    pub fn token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Track a side task so shutdown waits for it.
    pub fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    /// Whether the token has fired.
    pub fn is_shutting_down(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Run `orchestrator` until the token fires or an outcome is fatal.
    ///
    /// Afterwards, in this order: the token is cancelled so side tasks stop,
    /// the session is closed (cancelling its in-flight operation), and all
    /// tracked tasks plus that operation are awaited for up to the drain
    /// timeout. A fatal result is logged at `error` and returned.
    pub async fn supervise(
        &mut self,
        orchestrator: &mut Orchestrator,
    ) -> Result<(), RuntimeError> {
        let result = orchestrator.run(self.stop.clone()).await;

        self.stop.cancel();
        self.tasks.extend(orchestrator.close());
        self.drain().await;

        if let Err(e) = &result {
            error!(
                op = e.operation().map(|op| op.as_str()),
                category = e.category(),
                error = %e,
                "fatal outcome, shutting down"
            );
        }
        result
    }

    async fn drain(&mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        if tasks.is_empty() {
            return;
        }
        info!(
            tasks = tasks.len(),
            timeout_ms = u64::try_from(self.drain_timeout.as_millis()).unwrap_or(u64::MAX),
            "draining tasks"
        );
        if tokio::time::timeout(self.drain_timeout, futures::future::join_all(tasks))
            .await
            .is_err()
        {
            warn!(
                timeout = ?self.drain_timeout,
                "drain timed out, leaving remaining tasks to runtime teardown"
            );
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use loopcast_core::logging::capture_logs;
    use loopcast_core::{
        ChannelSet, ClientError, Delivery, History, Message, MessagingClient, OperationKind,
    };
    use loopcast_settings::LoopcastSettings;
    use tracing::Level;

    use crate::clock::spawn_clock;
    use crate::observer::RecordingObserver;
    use crate::orchestrator::OrchestratorConfig;

    /// Fails the history fetch; everything else blocks or succeeds.
    struct BrokenHistory;

    #[async_trait]
    impl MessagingClient for BrokenHistory {
        async fn publish(&self, _channel: &str, _message: &Message) -> Result<(), ClientError> {
            Ok(())
        }

        async fn history(&self, _channel: &str, _count: usize) -> Result<History, ClientError> {
            Err(ClientError::Status {
                status: 403,
                message: "Forbidden".into(),
            })
        }

        async fn subscribe(&self, _channels: &ChannelSet) -> Result<Vec<Delivery>, ClientError> {
            std::future::pending().await
        }

        async fn unsubscribe(&self, _channels: &ChannelSet) -> Result<(), ClientError> {
            Ok(())
        }
    }

    fn orchestrator(
        client: Arc<dyn MessagingClient>,
        observer: Arc<RecordingObserver>,
    ) -> Orchestrator {
        let config = OrchestratorConfig::from_settings(&LoopcastSettings::default()).unwrap();
        Orchestrator::new(config, client, observer)
    }

    #[test]
    fn fresh_coordinator_is_not_stopping() {
        let coord = ShutdownCoordinator::default();
        assert!(!coord.is_shutting_down());
        assert!(!coord.token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_outcome_stops_clock_and_reports() {
        let (logs, _guard) = capture_logs();
        let observer = Arc::new(RecordingObserver::new());
        let mut orch = orchestrator(Arc::new(BrokenHistory), observer.clone());

        let mut coord = ShutdownCoordinator::new();
        coord.track(spawn_clock(observer.clone(), Duration::from_secs(1), coord.token()));

        let err = coord.supervise(&mut orch).await.unwrap_err();

        assert_matches!(err, RuntimeError::Fatal { op: OperationKind::FetchHistory, .. });
        assert!(coord.is_shutting_down());
        assert!(logs.has_event(Level::ERROR, "fatal outcome"));
        let error_event = logs
            .events()
            .into_iter()
            .find(|e| e.level == Level::ERROR)
            .unwrap();
        assert_eq!(error_event.field("category"), Some("auth"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_ends_run_cleanly() {
        let observer = Arc::new(RecordingObserver::new());
        let mut orch = orchestrator(Arc::new(BrokenHistory), observer);
        let mut coord = ShutdownCoordinator::new();
        coord.token().cancel();

        coord.supervise(&mut orch).await.unwrap();
        assert!(orch.in_flight().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_task_does_not_block_past_drain_timeout() {
        let (logs, _guard) = capture_logs();
        let observer = Arc::new(RecordingObserver::new());
        let mut orch = orchestrator(Arc::new(BrokenHistory), observer);

        let mut coord = ShutdownCoordinator::new().with_drain_timeout(Duration::from_millis(100));
        coord.track(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        }));

        let started = tokio::time::Instant::now();
        let _ = coord.supervise(&mut orch).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(300));
        assert!(logs.has_event(Level::WARN, "drain timed out"));
    }
}
