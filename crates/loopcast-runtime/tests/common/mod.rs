//! Scripted messaging client shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use loopcast_core::{
    ChannelSet, ClientError, Delivery, History, Message, MessagingClient, OperationKind,
};
use loopcast_runtime::{Orchestrator, OrchestratorConfig, RecordingObserver, RuntimeError};
use loopcast_settings::LoopcastSettings;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// One call seen by the client.
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub op: OperationKind,
    /// Channel, or the joined channel set.
    pub target: String,
    pub message: Option<Message>,
    pub count: Option<usize>,
}

/// Scripted reply to one subscribe call.
#[derive(Debug)]
pub enum Reply {
    /// Return these messages after the delay.
    After(Duration, Vec<Delivery>),
    /// Never return; only cancellation ends the call.
    Block,
    /// Fail with this error.
    Fail(ClientError),
}

impl Reply {
    pub fn now(deliveries: Vec<Delivery>) -> Self {
        Self::After(Duration::ZERO, deliveries)
    }
}

/// Fake broker. Subscribe replies come from a script and block once it is
/// exhausted; every other call succeeds unless listed in `fail_on` or
/// `panic_on`.
#[derive(Default)]
pub struct ScriptedClient {
    calls: Mutex<Vec<Call>>,
    script: Mutex<VecDeque<Reply>>,
    history: Vec<Value>,
    latency: Duration,
    fail_on: Option<OperationKind>,
    panic_on: Option<OperationKind>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

struct Active<'a>(&'a AtomicUsize);

impl Drop for Active<'_> {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(mut self, entries: Vec<Value>) -> Self {
        self.history = entries;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing_on(mut self, op: OperationKind) -> Self {
        self.fail_on = Some(op);
        self
    }

    pub fn panicking_on(mut self, op: OperationKind) -> Self {
        self.panic_on = Some(op);
        self
    }

    pub fn with_script(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.script.lock().extend(replies);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn ops(&self) -> Vec<OperationKind> {
        self.calls.lock().iter().map(|c| c.op).collect()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: Call) -> Result<Active<'_>, ClientError> {
        let op = call.op;
        self.calls.lock().push(call);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.max_active.fetch_max(now, Ordering::SeqCst);
        let guard = Active(&self.active);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.panic_on == Some(op) {
            panic!("scripted {op} panic");
        }
        if self.fail_on == Some(op) {
            return Err(ClientError::Status {
                status: 500,
                message: format!("scripted {op} failure"),
            });
        }
        Ok(guard)
    }
}

#[async_trait]
impl MessagingClient for ScriptedClient {
    async fn publish(&self, channel: &str, message: &Message) -> Result<(), ClientError> {
        let _active = self
            .enter(Call {
                op: OperationKind::Publish,
                target: channel.to_string(),
                message: Some(message.clone()),
                count: None,
            })
            .await?;
        Ok(())
    }

    async fn history(&self, channel: &str, count: usize) -> Result<History, ClientError> {
        let _active = self
            .enter(Call {
                op: OperationKind::FetchHistory,
                target: channel.to_string(),
                message: None,
                count: Some(count),
            })
            .await?;
        let skip = self.history.len().saturating_sub(count);
        Ok(History::new(self.history[skip..].to_vec()))
    }

    async fn subscribe(&self, channels: &ChannelSet) -> Result<Vec<Delivery>, ClientError> {
        let _active = self
            .enter(Call {
                op: OperationKind::Subscribe,
                target: channels.joined(),
                message: None,
                count: None,
            })
            .await?;
        let reply = self.script.lock().pop_front().unwrap_or(Reply::Block);
        match reply {
            Reply::After(delay, deliveries) => {
                tokio::time::sleep(delay).await;
                Ok(deliveries)
            }
            Reply::Block => std::future::pending().await,
            Reply::Fail(e) => Err(e),
        }
    }

    async fn unsubscribe(&self, channels: &ChannelSet) -> Result<(), ClientError> {
        let _active = self
            .enter(Call {
                op: OperationKind::Unsubscribe,
                target: channels.joined(),
                message: None,
                count: None,
            })
            .await?;
        Ok(())
    }
}

pub fn default_config() -> OrchestratorConfig {
    OrchestratorConfig::from_settings(&LoopcastSettings::default()).unwrap()
}

pub fn build(
    client: &Arc<ScriptedClient>,
    config: OrchestratorConfig,
) -> (Orchestrator, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::new());
    let orch = Orchestrator::new(config, client.clone(), observer.clone());
    (orch, observer)
}

/// Run for `duration` of (paused) time. `None` means still running.
pub async fn run_for(
    orch: &mut Orchestrator,
    duration: Duration,
) -> Option<Result<(), RuntimeError>> {
    tokio::time::timeout(duration, orch.run(CancellationToken::new()))
        .await
        .ok()
}
