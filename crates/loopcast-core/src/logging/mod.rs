//! Structured logging setup.
//!
//! Log output goes to **stderr**. Stdout belongs to the observer (clock line,
//! deliveries, status notices), and mixing the two would tear the clock's
//! carriage-return line.
//!
//! - [`init_subscriber`] installs the global `fmt` subscriber
//! - [`capture_logs`] installs a thread-local capture layer for tests

pub mod capture;

pub use capture::{CapturedEvent, CapturedLogs, capture_logs};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG`, when set, takes precedence over `level`. Subsequent calls are
/// no-ops.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails only when a global subscriber already exists
    let _ = subscriber.try_init();
}

/// Initialize the global subscriber with JSON lines on stderr.
pub fn init_json_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .try_init();
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_is_idempotent() {
        init_subscriber("warn");
        init_subscriber("debug");
        init_json_subscriber("info");
    }
}
