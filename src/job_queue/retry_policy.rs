//! Retry policy for failed queue jobs.
//!
//! Exponential backoff: `initial * 2^(attempts_made - 1)` milliseconds,
//! doubling with every attempt a job has burned.

/// Per-queue retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts a job may consume (first run included).
    pub max_attempts: i32,
    /// Backoff after the first failed attempt, in milliseconds.
    pub initial_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: i32, initial_backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms,
        }
    }

    /// Backoff duration in milliseconds after `attempts_made` attempts.
    ///
    /// `attempts_made` counts the attempt that just failed, so the first
    /// retry waits the initial backoff.
    pub fn backoff_ms(&self, attempts_made: i32) -> u64 {
        let exponent = (attempts_made - 1).max(0) as u32;
        self.initial_backoff_ms.saturating_mul(1u64 << exponent.min(32))
    }

    /// Timestamp (Unix millis) before which the next attempt must not run.
    pub fn next_attempt_at(&self, attempts_made: i32) -> i64 {
        chrono::Utc::now().timestamp_millis() + self.backoff_ms(attempts_made) as i64
    }

    /// Whether a job with `attempts_made` attempts has budget left.
    pub fn has_attempts_left(&self, attempts_made: i32) -> bool {
        attempts_made < self.max_attempts
    }
}
