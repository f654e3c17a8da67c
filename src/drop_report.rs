//! Aggregated reporting of transactions rejected at admission.

use std::{
    collections::BTreeMap,
    fmt, mem,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

/// Default interval between drop summaries.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Drops counted since the previous report, by category.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DropSummary {
    by_category: BTreeMap<String, u64>,
}

impl DropSummary {
    pub fn total(&self) -> u64 {
        self.by_category.values().sum()
    }

    pub fn count(&self, category: &str) -> u64 {
        self.by_category.get(category).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty()
    }
}

impl fmt::Display for DropSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (category, count)) in self.by_category.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{count} {category}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ReporterState {
    last_report: Option<Instant>,
    pending: DropSummary,
}

/// Counts rejected transactions and releases a summary at most once per
/// interval. The first summary is never held back.
#[derive(Debug)]
pub struct DropReporter {
    interval: Duration,
    state: Mutex<ReporterState>,
}

impl DropReporter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(ReporterState::default()),
        }
    }

    pub fn record(&self, category: &str) {
        let mut state = self.state.lock();
        *state
            .pending
            .by_category
            .entry(category.to_owned())
            .or_default() += 1;
    }

    /// Drops since the last report, if the interval has elapsed.
    pub fn due(&self, now: Instant) -> Option<DropSummary> {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            return None;
        }
        if state
            .last_report
            .is_some_and(|last| now.saturating_duration_since(last) < self.interval)
        {
            return None;
        }
        state.last_report = Some(now);
        Some(mem::take(&mut state.pending))
    }

    /// Everything accumulated so far, ignoring the interval.
    pub fn take(&self) -> Option<DropSummary> {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            None
        } else {
            Some(mem::take(&mut state.pending))
        }
    }
}

impl Default for DropReporter {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}
