//! # loopcast-core
//!
//! Foundation types shared by every loopcast crate:
//!
//! - **Messages**: [`Message`](messages::Message), [`ChannelSet`](messages::ChannelSet),
//!   [`Delivery`](messages::Delivery) and [`History`](messages::History)
//! - **Outcomes**: the three-kind [`Outcome`](outcome::Outcome) taxonomy and
//!   [`OperationKind`](outcome::OperationKind)
//! - **Client contract**: the [`MessagingClient`](client::MessagingClient) trait
//!   the session drives
//! - **Errors**: [`ClientError`](errors::ClientError)
//! - **Retry**: backoff math used by concrete clients
//! - **Logging**: subscriber setup and an in-memory capture layer for tests

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod logging;
pub mod messages;
pub mod outcome;
pub mod retry;

pub use client::MessagingClient;
pub use errors::ClientError;
pub use messages::{ChannelSet, ChannelSetError, Delivery, History, Message};
pub use outcome::{OperationKind, Outcome};
