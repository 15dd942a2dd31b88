//! Retry policy and backoff calculation for messaging clients.
//!
//! The orchestration layer never retries: a fatal outcome is final. Retrying
//! transient transport failures is the client's job, and this module holds
//! the portable building blocks for it. Randomness is passed in by the caller
//! so the math stays deterministic under test.

use std::time::Duration;

use crate::errors::ClientError;

/// Default maximum retries.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Retry parameters for one client.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 disables retrying).
    pub max_retries: u32,
    /// Base delay for exponential backoff in ms.
    pub base_delay_ms: u64,
    /// Cap on a single delay in ms.
    pub max_delay_ms: u64,
    /// Symmetric jitter range, 0.0–1.0.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Whether a failed attempt (zero-based) should be retried.
    pub fn should_retry(&self, attempt: u32, error: &ClientError) -> bool {
        attempt < self.max_retries && error.is_retryable()
    }

    /// Delay before retry number `attempt` (zero-based).
    ///
    /// `random` must be in `[0.0, 1.0]`.
    pub fn delay(&self, attempt: u32, random: f64) -> Duration {
        Duration::from_millis(backoff_delay_ms(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            random,
        ))
    }
}

/// Exponential backoff with jitter.
///
/// `min(max_delay, base_delay * 2^attempt) * (1 + (2 * random - 1) * jitter)`,
/// so a jitter factor of 0.2 spreads delays across ±20%.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn backoff_delay_ms(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);

    let jitter = 1.0 + (random.clamp(0.0, 1.0) * 2.0 - 1.0) * jitter_factor.clamp(0.0, 1.0);
    ((capped as f64) * jitter).round().max(0.0) as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
