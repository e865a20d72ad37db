//! Gap-based temporal runs over a sorted event slice.

use chrono::Duration;
use std::ops::Range;

use lifeline_core::NormalizedEvent;

use crate::cluster::BurstRule;

/// Contiguous run of events with no internal gap above the threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalRun {
    /// Positions in the input slice, end exclusive.
    pub range: Range<usize>,
    /// Run is at least the burst size and fits inside the burst window.
    pub burst: bool,
}

impl TemporalRun {
    #[must_use]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Split `events` wherever consecutive approximate instants are more than
/// `gap` apart.
///
/// `events` must already be sorted by `(approx, id)`, which makes the run
/// boundaries independent of the order events were originally supplied in.
/// A gap exactly equal to the threshold does not split.
#[must_use]
pub fn temporal_runs(events: &[NormalizedEvent], gap: Duration, burst: &BurstRule) -> Vec<TemporalRun> {
    let mut runs = Vec::new();
    let mut start = 0;

    for i in 1..=events.len() {
        let boundary = i == events.len() || events[i].approx - events[i - 1].approx > gap;
        if boundary && i > start {
            let spread = events[i - 1].approx - events[start].approx;
            runs.push(TemporalRun {
                range: start..i,
                burst: burst.matches(i - start, spread),
            });
            start = i;
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use lifeline_core::{DataVersion, Dataset, Event, Normalizer};

    fn rule() -> BurstRule {
        BurstRule {
            min_size: 2,
            window: Duration::hours(1),
        }
    }

    fn dataset(offsets_min: &[i64]) -> Dataset {
        let base = Utc
            .with_ymd_and_hms(2020, 1, 1, 9, 0, 0)
            .single()
            .expect("valid instant");
        let events = offsets_min
            .iter()
            .enumerate()
            .map(|(i, m)| Event::new(format!("e{}", i + 1), base + Duration::minutes(*m)));
        Dataset::ingest(events, DataVersion::new(1), &Normalizer::default()).0
    }

    #[test]
    fn burst_then_isolated_event() {
        // T, T+1min, T+~6 months under a 30 day gap.
        let data = dataset(&[0, 1, 60 * 24 * 182]);
        let runs = temporal_runs(data.events(), Duration::days(30), &rule());
        assert_eq!(
            runs,
            vec![
                TemporalRun {
                    range: 0..2,
                    burst: true
                },
                TemporalRun {
                    range: 2..3,
                    burst: false
                },
            ]
        );
    }

    #[test]
    fn gap_equal_to_threshold_does_not_split() {
        let data = dataset(&[0, 60, 120]);
        let runs = temporal_runs(data.events(), Duration::hours(1), &rule());
        assert_eq!(runs.len(), 1);
        // Spread is two hours, wider than the burst window.
        assert!(!runs[0].burst);
    }

    #[test]
    fn empty_input_yields_no_runs() {
        assert!(temporal_runs(&[], Duration::days(1), &rule()).is_empty());
    }

    #[test]
    fn runs_cover_every_position_once() {
        let data = dataset(&[0, 5, 500, 501, 502, 5_000, 9_000, 9_001]);
        let runs = temporal_runs(data.events(), Duration::minutes(30), &rule());
        let covered: Vec<usize> = runs.iter().flat_map(|r| r.range.clone()).collect();
        assert_eq!(covered, (0..data.len()).collect::<Vec<_>>());
        assert_eq!(runs.len(), 4);
    }
}
