//! Wall-clock ticker.
//!
//! Runs beside the orchestrator on the same runtime and only talks to the
//! observer; it holds no session reference.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::observer::Observer;

/// Hours, minutes and seconds of a UTC instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockTime {
    /// Hour (0-23).
    pub hour: u32,
    /// Minute (0-59).
    pub minute: u32,
    /// Second (0-59).
    pub second: u32,
}

impl ClockTime {
    /// Current UTC time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Time-of-day part of `at`.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            hour: at.hour(),
            minute: at.minute(),
            second: at.second(),
        }
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// Tick `observer` every `period` until `shutdown` fires.
///
/// The first tick is immediate.
pub async fn run_clock(observer: Arc<dyn Observer>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => observer.on_tick(ClockTime::now()),
            () = shutdown.cancelled() => {
                debug!("clock stopped");
                return;
            }
        }
    }
}

/// Spawn [`run_clock`] on the current runtime.
pub fn spawn_clock(
    observer: Arc<dyn Observer>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_clock(observer, period, shutdown))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
