//! # loopcast-runtime
//!
//! The orchestration core. One [`Session`](session::Session) allows a single
//! outstanding operation; three controllers take turns driving it:
//!
//! - [`Sequencer`](sequencer::Sequencer): one-shot publish + history bootstrap
//! - [`SubscribeLoop`](subscribe_loop::SubscribeLoop): long-poll subscribe, reissued on every success
//! - [`Preemption`](preemption::Preemption): periodic cancel → priority publish → resume
//!
//! The [`Orchestrator`](orchestrator::Orchestrator) owns all of them and
//! dispatches completions from a single event queue. The clock ticker runs
//! beside it and never touches the session.

#![deny(unsafe_code)]

pub mod clock;
pub mod errors;
pub mod observer;
pub mod orchestrator;
pub mod preemption;
pub mod sequencer;
pub mod session;
pub mod shutdown;
pub mod subscribe_loop;

pub use errors::{RuntimeError, SessionError};
pub use observer::{ConsoleObserver, Notice, Observer, RecordingObserver};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use shutdown::ShutdownCoordinator;
