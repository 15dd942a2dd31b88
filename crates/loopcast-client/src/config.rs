//! Client configuration.

use std::time::Duration;

use loopcast_core::retry::RetryPolicy;
use loopcast_settings::LoopcastSettings;

/// Connection and retry parameters for [`PubNubClient`](crate::PubNubClient).
#[derive(Clone, Debug)]
pub struct PubNubConfig {
    /// REST origin, e.g. `https://ps.pndsn.com`.
    pub origin: String,
    /// Publish key.
    pub publish_key: String,
    /// Subscribe key.
    pub subscribe_key: String,
    /// Timeout for publish, history and leave.
    pub request_timeout: Duration,
    /// Timeout for one subscribe long poll.
    pub subscribe_timeout: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

impl PubNubConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &LoopcastSettings) -> Self {
        Self {
            origin: settings.broker.origin.clone(),
            publish_key: settings.broker.publish_key.clone(),
            subscribe_key: settings.broker.subscribe_key.clone(),
            request_timeout: Duration::from_millis(settings.broker.request_timeout_ms),
            subscribe_timeout: Duration::from_millis(settings.broker.subscribe_timeout_ms),
            retry: settings.retry.to_policy(),
        }
    }
}

impl Default for PubNubConfig {
    fn default() -> Self {
        Self::from_settings(&LoopcastSettings::default())
    }
}
