//! Message, channel and delivery types.
//!
//! A [`ChannelSet`] is fixed for the lifetime of the process and shared by
//! every subscribe and unsubscribe call, so it is backed by an `Arc<[String]>`
//! and cloning it never copies the channel names.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Message
// ─────────────────────────────────────────────────────────────────────────────

/// A structured record published to a channel.
///
/// Serialized as `{"num": 42, "str": "Hello, world!"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Numeric field.
    pub num: i64,
    /// Text field.
    #[serde(rename = "str")]
    pub text: String,
}

impl Message {
    /// Create a message.
    pub fn new(num: i64, text: impl Into<String>) -> Self {
        Self {
            num,
            text: text.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ChannelSet
// ─────────────────────────────────────────────────────────────────────────────

/// Reasons a channel set can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelSetError {
    /// No channels were given.
    #[error("channel set is empty")]
    Empty,
    /// A channel name was empty or contained a comma.
    #[error("invalid channel name at position {index}: {name:?}")]
    InvalidName {
        /// Position in the input.
        index: usize,
        /// The offending name.
        name: String,
    },
    /// The same channel appeared twice.
    #[error("duplicate channel: {0}")]
    Duplicate(String),
}

/// Ordered, immutable, non-empty sequence of channel names.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ChannelSet(Arc<[String]>);

impl ChannelSet {
    /// Build a channel set, preserving order.
    ///
    /// Names must be non-empty, unique, and free of commas (the broker joins
    /// them with commas on the wire).
    pub fn new<I, S>(channels: I) -> Result<Self, ChannelSetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = Vec::new();
        for (index, name) in channels.into_iter().map(Into::into).enumerate() {
            if name.trim().is_empty() || name.contains(',') {
                return Err(ChannelSetError::InvalidName { index, name });
            }
            if names.contains(&name) {
                return Err(ChannelSetError::Duplicate(name));
            }
            names.push(name);
        }
        if names.is_empty() {
            return Err(ChannelSetError::Empty);
        }
        Ok(Self(names.into()))
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate channel names in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Whether the set contains `channel`.
    pub fn contains(&self, channel: &str) -> bool {
        self.0.iter().any(|c| c == channel)
    }

    /// First channel in the set.
    pub fn first(&self) -> &str {
        &self.0[0]
    }

    /// Comma-joined form used on the wire (`"a,b"`).
    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

impl fmt::Debug for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

impl Serialize for ChannelSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de> Deserialize<'de> for ChannelSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        Self::new(names).map_err(serde::de::Error::custom)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Delivery / History
// ─────────────────────────────────────────────────────────────────────────────

/// One message received by a subscribe cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    /// Channel the payload arrived on.
    pub channel: String,
    /// Opaque payload as received from the broker.
    pub payload: serde_json::Value,
}

impl Delivery {
    /// Create a delivery.
    pub fn new(channel: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            channel: channel.into(),
            payload,
        }
    }
}

/// Ordered prior messages of one channel, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<serde_json::Value>);

impl History {
    /// Wrap history entries.
    pub fn new(entries: Vec<serde_json::Value>) -> Self {
        Self(entries)
    }

    /// Entries in broker order.
    pub fn entries(&self) -> &[serde_json::Value] {
        &self.0
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::Value::Array(self.0.clone());
        write!(f, "{rendered}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
