use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Half-open instant range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Build a range, ordering the endpoints if they arrive reversed.
    #[must_use]
    pub fn new(a: DateTime<Utc>, b: DateTime<Utc>) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// True when the two half-open ranges share at least one instant.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Length of the range in fractional days.
    #[must_use]
    pub fn span_days(&self) -> f64 {
        days_between(self.start, self.end)
    }

    /// Widen both ends by `margin`, saturating at the representable bounds.
    #[must_use]
    pub fn widened(&self, margin: Duration) -> Self {
        Self {
            start: self.start.checked_sub_signed(margin).unwrap_or(self.start),
            end: self.end.checked_add_signed(margin).unwrap_or(self.end),
        }
    }

    /// Snap both ends outward onto a grid of `bucket` sized cells anchored at
    /// the Unix epoch. A non-positive bucket leaves the range unchanged.
    #[must_use]
    pub fn snapped(&self, bucket: Duration) -> Self {
        let step = bucket.num_milliseconds();
        if step <= 0 {
            return *self;
        }
        let start = self.start.timestamp_millis().div_euclid(step) * step;
        let end_ms = self.end.timestamp_millis();
        let end = if end_ms.rem_euclid(step) == 0 {
            end_ms
        } else {
            (end_ms.div_euclid(step) + 1) * step
        };
        Self {
            start: millis_to_instant(start).unwrap_or(self.start),
            end: millis_to_instant(end).unwrap_or(self.end),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M")
        )
    }
}

/// Fractional days from `from` to `to` (negative when `to` precedes `from`).
#[must_use]
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to.timestamp_millis() - from.timestamp_millis()) as f64 / MILLIS_PER_DAY
}

/// Convert epoch milliseconds back into an instant.
#[must_use]
pub fn millis_to_instant(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Monotonically increasing version of the event snapshot.
///
/// The external repository bumps it on every mutation; cluster trees and
/// memoized render lists are keyed by it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DataVersion(pub u64);

impl DataVersion {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The version following this one.
    #[must_use]
    pub const fn bump(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for DataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}
