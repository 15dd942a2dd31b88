//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file only needs the keys it changes.

mod broker;
mod flow;

pub use broker::*;
pub use flow::*;

use loopcast_core::retry::RetryPolicy;
use loopcast_core::{ChannelSet, ChannelSetError};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Upper bound on `bootstrap.historyCount` (the broker caps history at 100).
pub const MAX_HISTORY_COUNT: usize = 100;

/// Root settings type.
///
/// ```json
/// {
///   "channels": { "primary": "my_channel", "subscribe": ["my_channel", "demo_channel"] },
///   "preemption": { "periodMs": 5000 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoopcastSettings {
    /// Broker connection.
    pub broker: BrokerSettings,
    /// Channel names.
    pub channels: ChannelSettings,
    /// Startup publish + history chain.
    pub bootstrap: BootstrapSettings,
    /// Periodic priority publish.
    pub preemption: PreemptionSettings,
    /// Clock display.
    pub clock: ClockSettings,
    /// Client-side retry of transient failures.
    pub retry: RetrySettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl LoopcastSettings {
    /// Check cross-field constraints the type system cannot express.
    pub fn validate(&self) -> Result<()> {
        let _ = self.channel_set()?;
        if self.channels.primary.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "channels.primary must not be empty".into(),
            ));
        }
        if self.preemption.period_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "preemption.periodMs must be > 0".into(),
            ));
        }
        if self.clock.period_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "clock.periodMs must be > 0".into(),
            ));
        }
        if self.bootstrap.history_count == 0 || self.bootstrap.history_count > MAX_HISTORY_COUNT {
            return Err(SettingsError::InvalidValue(format!(
                "bootstrap.historyCount must be in 1..={MAX_HISTORY_COUNT}, got {}",
                self.bootstrap.history_count
            )));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(SettingsError::InvalidValue(
                "retry.jitterFactor must be in 0.0..=1.0".into(),
            ));
        }
        Ok(())
    }

    /// The subscribe channel set.
    pub fn channel_set(&self) -> Result<ChannelSet> {
        ChannelSet::new(self.channels.subscribe.iter().cloned()).map_err(|e: ChannelSetError| {
            SettingsError::InvalidValue(format!("channels.subscribe: {e}"))
        })
    }
}

/// Channel names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSettings {
    /// Channel receiving the bootstrap and priority publishes.
    pub primary: String,
    /// Channels the subscribe loop listens on, in order.
    pub subscribe: Vec<String>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            primary: "my_channel".to_string(),
            subscribe: vec!["my_channel".to_string(), "demo_channel".to_string()],
        }
    }
}

/// Retry configuration for transient client failures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter factor (0.0–1.0) applied to retry delays.
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay_ms: policy.base_delay_ms,
            max_delay_ms: policy.max_delay_ms,
            jitter_factor: policy.jitter_factor,
        }
    }
}

impl RetrySettings {
    /// Convert into the client's retry policy.
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            jitter_factor: self.jitter_factor,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable compact lines.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (`RUST_LOG` wins when set).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
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
    fn defaults_are_valid() {
        let settings = LoopcastSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.channels.primary, "my_channel");
        assert_eq!(settings.preemption.period_ms, 5_000);
        assert_eq!(settings.clock.period_ms, 1_000);
        assert_eq!(settings.bootstrap.history_count, 10);
        assert_eq!(settings.logging.level, "warn");
    }

    #[test]
    fn channel_set_keeps_order() {
        let set = LoopcastSettings::default().channel_set().unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), ["my_channel", "demo_channel"]);
    }

    #[test]
    fn empty_channel_list_rejected() {
        let mut settings = LoopcastSettings::default();
        settings.channels.subscribe.clear();
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("empty"));
    }

    #[test]
    fn zero_periods_rejected() {
        let mut settings = LoopcastSettings::default();
        settings.preemption.period_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = LoopcastSettings::default();
        settings.clock.period_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn history_count_bounds() {
        let mut settings = LoopcastSettings::default();
        settings.bootstrap.history_count = 0;
        assert!(settings.validate().is_err());
        settings.bootstrap.history_count = MAX_HISTORY_COUNT;
        assert!(settings.validate().is_ok());
        settings.bootstrap.history_count = MAX_HISTORY_COUNT + 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn retry_settings_convert_to_policy() {
        let retry = RetrySettings {
            max_retries: 7,
            base_delay_ms: 10,
            max_delay_ms: 20,
            jitter_factor: 0.0,
        };
        let policy = retry.to_policy();
        assert_eq!(policy.max_retries, 7);
        assert_eq!(policy.max_delay_ms, 20);
    }

    #[test]
    fn serialized_sections_are_camel_case() {
        let json = serde_json::to_value(LoopcastSettings::default()).unwrap();
        assert_eq!(json["bootstrap"]["historyCount"], 10);
        assert_eq!(json["preemption"]["idleUnsubscribe"], "issue");
        assert_eq!(json["bootstrap"]["message"]["str"], "Hello, world!");
    }
}
