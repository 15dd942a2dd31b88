//! # loopcast-client
//!
//! A [`MessagingClient`](loopcast_core::MessagingClient) over the PubNub REST
//! API. The orchestration core never depends on this crate directly; the
//! binary wires it in.
//!
//! - [`config`]: connection and retry parameters
//! - [`protocol`]: pure request-path and response-body handling
//! - [`pubnub`]: the HTTP client with retry and timetoken tracking

#![deny(unsafe_code)]

pub mod config;
pub mod protocol;
pub mod pubnub;

pub use config::PubNubConfig;
pub use pubnub::PubNubClient;
