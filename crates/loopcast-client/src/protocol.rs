//! PubNub REST request paths and response bodies.
//!
//! Everything here is pure: paths are built as segment lists (the client
//! percent-encodes them) and response bodies are parsed from
//! [`serde_json::Value`].
//!
//! | Operation | Path | Success body |
//! |---|---|---|
//! | publish | `/publish/{pub}/{sub}/0/{channel}/0/{json}` | `[1, "Sent", "tt"]` |
//! | history | `/history/{sub}/{channel}/0/{count}` | `[msg, ...]` |
//! | subscribe | `/subscribe/{sub}/{a,b}/0/{tt}` | `[[msg, ...], "tt"(, "chA,chB")]` |
//! | leave | `/v2/presence/sub_key/{sub}/channel/{a,b}/leave` | `{"status": 200, ...}` |

use loopcast_core::{ChannelSet, ClientError, Delivery, History, Message};
use serde_json::Value;

/// Timetoken that starts a fresh subscription.
pub const INITIAL_TIMETOKEN: &str = "0";

// ─────────────────────────────────────────────────────────────────────────────
// Paths
// ─────────────────────────────────────────────────────────────────────────────

/// Path segments for a publish.
pub fn publish_path(
    publish_key: &str,
    subscribe_key: &str,
    channel: &str,
    message: &Message,
) -> Result<Vec<String>, ClientError> {
    let body = serde_json::to_string(message)?;
    Ok(vec![
        "publish".into(),
        publish_key.into(),
        subscribe_key.into(),
        "0".into(),
        channel.into(),
        "0".into(),
        body,
    ])
}

/// Path segments for a history fetch.
pub fn history_path(subscribe_key: &str, channel: &str, count: usize) -> Vec<String> {
    vec![
        "history".into(),
        subscribe_key.into(),
        channel.into(),
        "0".into(),
        count.to_string(),
    ]
}

/// Path segments for one subscribe long poll.
pub fn subscribe_path(subscribe_key: &str, channels: &ChannelSet, timetoken: &str) -> Vec<String> {
    vec![
        "subscribe".into(),
        subscribe_key.into(),
        channels.joined(),
        "0".into(),
        timetoken.into(),
    ]
}

/// Path segments for a presence leave.
pub fn leave_path(subscribe_key: &str, channels: &ChannelSet) -> Vec<String> {
    vec![
        "v2".into(),
        "presence".into(),
        "sub_key".into(),
        subscribe_key.into(),
        "channel".into(),
        channels.joined(),
        "leave".into(),
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// Bodies
// ─────────────────────────────────────────────────────────────────────────────

/// One parsed subscribe response.
#[derive(Clone, Debug, PartialEq)]
pub struct SubscribeBatch {
    /// Timetoken for the next long poll.
    pub timetoken: String,
    /// Messages in arrival order; empty means no news.
    pub deliveries: Vec<Delivery>,
}

/// Check a publish response (`[1, "Sent", "tt"]`).
pub fn parse_publish(body: &Value) -> Result<(), ClientError> {
    let arr = body
        .as_array()
        .ok_or_else(|| ClientError::Protocol(format!("publish: expected array, got {body}")))?;
    match arr.first().and_then(Value::as_i64) {
        Some(1) => Ok(()),
        Some(_) => Err(ClientError::Rejected(
            arr.get(1)
                .and_then(Value::as_str)
                .unwrap_or("publish failed")
                .to_string(),
        )),
        None => Err(ClientError::Protocol(format!(
            "publish: missing status flag in {body}"
        ))),
    }
}

/// Parse a history response, keeping at most the last `count` entries.
pub fn parse_history(body: Value, count: usize) -> Result<History, ClientError> {
    let Value::Array(mut entries) = body else {
        return Err(ClientError::Protocol(format!(
            "history: expected array, got {body}"
        )));
    };
    if entries.len() > count {
        let _ = entries.drain(..entries.len() - count);
    }
    Ok(History::new(entries))
}

/// Parse a subscribe response.
///
/// The optional third element names the channel of each message. It is
/// omitted by the broker when a single channel is subscribed; every message
/// then belongs to that channel.
pub fn parse_subscribe(body: Value, channels: &ChannelSet) -> Result<SubscribeBatch, ClientError> {
    let Value::Array(parts) = body else {
        return Err(ClientError::Protocol(format!(
            "subscribe: expected array, got {body}"
        )));
    };
    let mut parts = parts.into_iter();

    let messages = match parts.next() {
        Some(Value::Array(messages)) => messages,
        other => {
            return Err(ClientError::Protocol(format!(
                "subscribe: expected message array, got {other:?}"
            )));
        }
    };
    let timetoken = match parts.next() {
        Some(Value::String(tt)) => tt,
        Some(Value::Number(tt)) => tt.to_string(),
        other => {
            return Err(ClientError::Protocol(format!(
                "subscribe: expected timetoken, got {other:?}"
            )));
        }
    };

    let names: Vec<String> = match parts.next() {
        Some(Value::String(list)) if !messages.is_empty() => {
            list.split(',').map(str::to_string).collect()
        }
        _ if channels.len() == 1 || messages.is_empty() => {
            vec![channels.first().to_string(); messages.len()]
        }
        _ => {
            return Err(ClientError::Protocol(
                "subscribe: multi-channel response without channel list".into(),
            ));
        }
    };
    if names.len() != messages.len() {
        return Err(ClientError::Protocol(format!(
            "subscribe: {} messages but {} channel names",
            messages.len(),
            names.len()
        )));
    }

    let deliveries = names
        .into_iter()
        .zip(messages)
        .map(|(channel, payload)| Delivery::new(channel, payload))
        .collect();
    Ok(SubscribeBatch {
        timetoken,
        deliveries,
    })
}

/// Check a presence leave response.
pub fn parse_leave(body: &Value) -> Result<(), ClientError> {
    let obj = body
        .as_object()
        .ok_or_else(|| ClientError::Protocol(format!("leave: expected object, got {body}")))?;
    match obj.get("status").and_then(Value::as_u64) {
        None | Some(200) => Ok(()),
        Some(status) => Err(ClientError::Rejected(format!(
            "leave status {status}: {}",
            obj.get("message").and_then(Value::as_str).unwrap_or("")
        ))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
