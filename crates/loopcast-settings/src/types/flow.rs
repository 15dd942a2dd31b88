//! Settings for the operation flow: bootstrap chain, preemption and clock.

use loopcast_core::Message;
use serde::{Deserialize, Serialize};

/// The one-shot bootstrap chain (publish, then history).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BootstrapSettings {
    /// Message published to the primary channel at startup.
    pub message: Message,
    /// How many prior messages to fetch after the bootstrap publish.
    pub history_count: usize,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            message: Message::new(42, "Hello, world!"),
            history_count: 10,
        }
    }
}

/// What an unsubscribe does when no subscribe is outstanding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleUnsubscribe {
    /// Send the leave request to the broker anyway.
    #[default]
    Issue,
    /// Complete successfully without touching the network.
    Skip,
}

/// The periodic priority publish that interrupts the subscribe loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreemptionSettings {
    /// Trigger period in milliseconds.
    pub period_ms: u64,
    /// Message published on every trigger.
    pub message: Message,
    /// Unsubscribe behaviour when the loop is already stopped.
    pub idle_unsubscribe: IdleUnsubscribe,
}

impl Default for PreemptionSettings {
    fn default() -> Self {
        Self {
            period_ms: 5_000,
            message: Message::new(37, "\"What a world, what a world!\" she said."),
            idle_unsubscribe: IdleUnsubscribe::Issue,
        }
    }
}

/// The independent clock display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClockSettings {
    /// Whether the clock runs at all.
    pub enabled: bool,
    /// Tick period in milliseconds.
    pub period_ms: u64,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            period_ms: 1_000,
        }
    }
}
