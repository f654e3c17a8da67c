//! Timestamps attached to transactions and their textual wire encoding.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Encodes microsecond timestamps into the compact text used on the wire.
pub trait TimestampCodec: Send + Sync {
    /// Encode a microsecond value.
    fn encode(&self, micros: u64) -> String;
}

/// Base-36 codec using the digits `0-9a-z`, most significant digit first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Base36;

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

impl Base36 {
    /// Decode a value produced by [`TimestampCodec::encode`].
    ///
    /// Returns `None` for empty input, characters outside the alphabet, or
    /// values that overflow `u64`.
    pub fn decode(&self, text: &str) -> Option<u64> {
        if text.is_empty() {
            return None;
        }
        text.chars().try_fold(0u64, |acc, ch| {
            let digit = u64::from(ch.to_digit(36)?);
            if ch.is_ascii_uppercase() {
                return None;
            }
            acc.checked_mul(36)?.checked_add(digit)
        })
    }
}

impl TimestampCodec for Base36 {
    fn encode(&self, micros: u64) -> String {
        if micros == 0 {
            return "0".to_owned();
        }
        let mut digits = Vec::with_capacity(13);
        let mut rest = micros;
        while rest > 0 {
            digits.push(DIGITS[(rest % 36) as usize]);
            rest /= 36;
        }
        digits.reverse();
        digits.into_iter().map(char::from).collect()
    }
}

/// Wall-clock microsecond source that never goes backwards.
///
/// Readings follow the system clock but are clamped to be at least the
/// previous reading, so transactions created in sequence carry
/// non-decreasing timestamps even across clock adjustments.
#[derive(Debug, Default)]
pub struct MicrosClock {
    last: AtomicU64,
}

impl MicrosClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time in microseconds since the Unix epoch.
    pub fn now_micros(&self) -> u64 {
        let wall = u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default();
        let prev = self.last.fetch_max(wall, Ordering::AcqRel);
        wall.max(prev)
    }
}
