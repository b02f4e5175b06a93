//! Capped exponential backoff between delivery attempts.

use std::time::Duration;

/// Delay schedule for retrying a single obligation.
///
/// Starts at `initial`, doubles after every delay handed out, and never
/// exceeds `max`. The sequence is infinite: retries only stop on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    /// Create a schedule. An `initial` above `max` is clamped to `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            max,
        }
    }

    /// The delay the next call to [`next_delay`](Self::next_delay) will return.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Return the current delay and advance the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}
