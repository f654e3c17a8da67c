//! Single-shot reply deadline.

use std::time::{Duration, Instant};

/// Countdown armed while the Router owes a reply.
///
/// Holds at most one deadline. Re-arming replaces it; expiry is observed by
/// polling [`Watchdog::expired`] from the worker loop.
#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Start (or restart) the countdown from `now`.
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.timeout);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// True once the armed deadline has passed.
    pub fn expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}
