//! Broker connection settings.

use serde::{Deserialize, Serialize};

/// Where and how to reach the pub/sub broker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrokerSettings {
    /// Base URL of the broker's REST origin.
    pub origin: String,
    /// Publish key.
    pub publish_key: String,
    /// Subscribe key.
    pub subscribe_key: String,
    /// Timeout for publish, history and leave requests in milliseconds.
    pub request_timeout_ms: u64,
    /// Timeout for one subscribe long poll in milliseconds.
    ///
    /// Must exceed the broker's own long-poll window (about 280 s), otherwise
    /// every quiet cycle ends as a timeout instead of "no news".
    pub subscribe_timeout_ms: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            origin: "https://ps.pndsn.com".to_string(),
            publish_key: "demo".to_string(),
            subscribe_key: "demo".to_string(),
            request_timeout_ms: 10_000,
            subscribe_timeout_ms: 310_000,
        }
    }
}
