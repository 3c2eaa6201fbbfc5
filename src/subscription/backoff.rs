//! Jittered exponential backoff for the reconnect loop (spec.md §4.3).

use std::time::Duration;

use rand::Rng;

use crate::core::constants::{BACKOFF_JITTER_FRACTION, BACKOFF_MAX_SECS, BACKOFF_MIN_SECS, RATE_LIMIT_MIN_RETRY_SECS};

/// Tracks the current backoff exponent across reconnect attempts. Reset on
/// every successful subscribe.
#[derive(Debug, Default, Clone, Copy)]
pub struct BackoffState {
    attempt: u32,
}

impl BackoffState {
    pub fn new() -> Self {
        Self { attempt: 0 }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Compute the next delay and advance the attempt counter. `retry_after`
    /// overrides the computed delay with the server-provided rate-limit
    /// hint, floored to `RATE_LIMIT_MIN_RETRY_SECS`.
    pub fn next_delay(&mut self, retry_after: Option<u64>) -> Duration {
        if let Some(secs) = retry_after {
            self.attempt = self.attempt.saturating_add(1);
            return Duration::from_secs(secs.max(RATE_LIMIT_MIN_RETRY_SECS));
        }

        let base = (BACKOFF_MIN_SECS.saturating_mul(1u64 << self.attempt.min(20))).min(BACKOFF_MAX_SECS);
        self.attempt = self.attempt.saturating_add(1);

        let jitter_span = (base as f64 * BACKOFF_JITTER_FRACTION) as i64;
        let jitter = if jitter_span > 0 {
            rand::thread_rng().gen_range(-jitter_span..=jitter_span)
        } else {
            0
        };
        let jittered = (base as i64 + jitter).max(BACKOFF_MIN_SECS as i64) as u64;
        Duration::from_secs(jittered.min(BACKOFF_MAX_SECS))
    }
}
