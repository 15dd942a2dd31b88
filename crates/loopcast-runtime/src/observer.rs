//! Output collaborator: clock ticks, message deliveries and lifecycle notices.

use std::fmt;
use std::io::Write;

use loopcast_core::{Delivery, History};
use parking_lot::Mutex;

use crate::clock::ClockTime;

/// Lifecycle notice.
#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
    /// The bootstrap publish succeeded.
    Published,
    /// The bootstrap history fetch succeeded.
    HistoryReceived {
        /// Prior messages, oldest first.
        entries: History,
    },
    /// A subscribe cycle ended without messages.
    SubscribeNoNews,
    /// A preemption cycle began.
    PreemptionStarted,
    /// The preemption unsubscribe succeeded.
    UnsubscribeOk,
    /// The priority publish succeeded.
    PriorityPublished,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Published => f.write_str("publish ok"),
            Self::HistoryReceived { entries } => write!(f, "history ok: {entries}"),
            Self::SubscribeNoNews => f.write_str("subscribe ok, no news"),
            Self::PreemptionStarted => f.write_str("priority publish"),
            Self::UnsubscribeOk => f.write_str("unsubscribe ok"),
            Self::PriorityPublished => f.write_str("priority publish ok"),
        }
    }
}

/// Receives everything the user gets to see.
///
/// Called from the event loop thread; implementations must not block.
pub trait Observer: Send + Sync {
    /// A clock tick.
    fn on_tick(&self, time: ClockTime);

    /// One message delivered by the subscribe loop.
    fn on_delivery(&self, delivery: &Delivery);

    /// A lifecycle notice.
    fn on_notice(&self, notice: &Notice);
}

/// Prints to stdout. The clock line ends in `\r` so it overwrites itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleObserver;

impl Observer for ConsoleObserver {
    fn on_tick(&self, time: ClockTime) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "{time}\r");
        let _ = out.flush();
    }

    fn on_delivery(&self, delivery: &Delivery) {
        let _ = writeln!(
            std::io::stdout().lock(),
            "subscribe [{}]: {}",
            delivery.channel,
            delivery.payload
        );
    }

    fn on_notice(&self, notice: &Notice) {
        let _ = writeln!(std::io::stdout().lock(), "{notice}");
    }
}

/// One observed event.
#[derive(Clone, Debug, PartialEq)]
pub enum Observed {
    /// From [`Observer::on_tick`].
    Tick(ClockTime),
    /// From [`Observer::on_delivery`].
    Delivery(Delivery),
    /// From [`Observer::on_notice`].
    Notice(Notice),
}

/// Keeps every event in memory, for tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Observed>>,
}

impl RecordingObserver {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events in arrival order.
    pub fn events(&self) -> Vec<Observed> {
        self.events.lock().clone()
    }

    /// Recorded ticks.
    pub fn ticks(&self) -> Vec<ClockTime> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Observed::Tick(t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    /// Recorded deliveries.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Observed::Delivery(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    /// Recorded notices.
    pub fn notices(&self) -> Vec<Notice> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Observed::Notice(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Observer for RecordingObserver {
    fn on_tick(&self, time: ClockTime) {
        self.events.lock().push(Observed::Tick(time));
    }

    fn on_delivery(&self, delivery: &Delivery) {
        self.events.lock().push(Observed::Delivery(delivery.clone()));
    }

    fn on_notice(&self, notice: &Notice) {
        self.events.lock().push(Observed::Notice(notice.clone()));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
