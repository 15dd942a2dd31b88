//! The messaging client contract consumed by the session.
//!
//! The session never sees transport details: it calls these four methods on
//! spawned tasks and turns the results into [`Outcome`](crate::Outcome)s. A
//! concrete client owns its retry policy; an `Err` returned here is final.

use async_trait::async_trait;

use crate::errors::ClientError;
use crate::messages::{ChannelSet, Delivery, History, Message};

/// Asynchronous pub/sub client.
///
/// Implementors must be `Send + Sync`; each call runs on its own task.
/// A `subscribe` future may be dropped mid-flight when the session cancels
/// it, so implementations must tolerate cancellation at any await point.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Publish `message` to `channel`.
    async fn publish(&self, channel: &str, message: &Message) -> Result<(), ClientError>;

    /// Fetch up to `count` prior messages of `channel`, oldest first.
    async fn history(&self, channel: &str, count: usize) -> Result<History, ClientError>;

    /// Wait for new messages on `channels`.
    ///
    /// Returns an empty vector when the long poll ends with no news.
    async fn subscribe(&self, channels: &ChannelSet) -> Result<Vec<Delivery>, ClientError>;

    /// Leave `channels`.
    async fn unsubscribe(&self, channels: &ChannelSet) -> Result<(), ClientError>;
}
