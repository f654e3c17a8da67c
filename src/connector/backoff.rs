//! Exponential backoff for scheduled reconnect attempts.

use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::config::BackoffPolicy;

const MIN_SLEEP_MS: u64 = 10;

/// Tracks consecutive failures and produces jittered retry delays.
pub struct BackoffState {
    policy: BackoffPolicy,
    current: Duration,
    failure_since: Option<Instant>,
    rng: StdRng,
}

impl BackoffState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            current: policy.base,
            failure_since: None,
            rng: StdRng::from_entropy(),
            policy,
        }
    }

    /// Forget past failures after a successful handshake.
    pub fn reset(&mut self) {
        self.current = self.policy.base;
        self.failure_since = None;
    }

    /// Delay before the next retry, or `None` once failures have persisted
    /// past the policy deadline.
    pub fn next_delay(&mut self, now: Instant) -> Option<Duration> {
        let start = *self.failure_since.get_or_insert(now);
        if now.duration_since(start) >= self.policy.deadline {
            return None;
        }
        if now != start {
            self.current = self.current.saturating_mul(2).min(self.policy.cap);
        }

        let max_ms = self.current.as_millis().min(u128::from(u64::MAX)) as u64;
        let sleep_ms = match max_ms {
            0 => MIN_SLEEP_MS,
            1..=MIN_SLEEP_MS => max_ms,
            _ => self.rng.gen_range(MIN_SLEEP_MS..=max_ms),
        };
        Some(Duration::from_millis(sleep_ms))
    }
}

impl std::fmt::Debug for BackoffState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackoffState")
            .field("current", &self.current)
            .field("failure_since", &self.failure_since)
            .finish_non_exhaustive()
    }
}
