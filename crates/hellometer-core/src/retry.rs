//! Export retry schedule (pure, clock-free).
//!
//! Delays start at `initial_interval` and double on every failed attempt,
//! capped at `max_interval`. A delay is only handed out when the caller's
//! elapsed time plus that delay still fits inside `max_elapsed_time`, so a
//! whole retry sequence never outlives its budget.

use std::time::Duration;

/// Growth factor between consecutive delays.
const MULTIPLIER: u32 = 2;

/// Retry settings for one exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed_time: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(10),
            max_elapsed_time: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Fresh delay schedule for one batch.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: *self,
            next: self.initial_interval.min(self.max_interval),
        }
    }
}

/// Per-batch delay schedule. Create one per retry sequence.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    next: Duration,
}

impl Backoff {
    /// Delay before the next attempt, or `None` when the sequence must stop.
    ///
    /// `elapsed` is the time already spent on this batch, attempts included.
    pub fn next_delay(&mut self, elapsed: Duration) -> Option<Duration> {
        if !self.policy.enabled {
            return None;
        }
        let delay = self.next;
        if elapsed.checked_add(delay)? > self.policy.max_elapsed_time {
            return None;
        }
        self.next = delay
            .checked_mul(MULTIPLIER)
            .unwrap_or(self.policy.max_interval)
            .min(self.policy.max_interval);
        Some(delay)
    }

    /// Time left in the budget after `elapsed`.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.policy.max_elapsed_time.saturating_sub(elapsed)
    }
}
