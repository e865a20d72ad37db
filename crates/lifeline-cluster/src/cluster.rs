//! Cluster values and the summary statistics computed over their members.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use lifeline_core::spatial::spherical_centroid;
use lifeline_core::{EventId, GeoPoint, NormalizedEvent, TimeRange, ZoomTier};

/// Content-derived cluster identifier: `<tier>-<blake3 prefix>`.
///
/// Derived from the tier and the sorted member ids, so an unchanged cluster
/// keeps its id across rebuilds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(String);

impl ClusterId {
    /// Hash `tier` and `members`. Member order does not matter.
    #[must_use]
    pub fn derive<'a>(tier: ZoomTier, members: impl IntoIterator<Item = &'a EventId>) -> Self {
        let mut ids: Vec<&EventId> = members.into_iter().collect();
        ids.sort_unstable();

        let mut hasher = blake3::Hasher::new();
        hasher.update(tier.as_str().as_bytes());
        hasher.update(b"\x00");
        for id in ids {
            hasher.update(id.as_str().as_bytes());
            hasher.update(b"\x00");
        }
        let hex = hasher.finalize().to_hex();
        Self(format!("{tier}-{}", &hex[..12]))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClusterId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Which thresholds shaped a cluster's boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterType {
    /// The time gap alone; the spatial pass kept the run whole.
    Temporal,
    /// Distance alone; the tier had a single temporal run.
    Spatial,
    /// Both the gap and the distance threshold split the data.
    Hybrid,
}

impl ClusterType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Temporal => "temporal",
            Self::Spatial => "spatial",
            Self::Hybrid => "hybrid",
        }
    }

    /// Classify a group from whether its run was split spatially and whether
    /// the tier as a whole was split temporally.
    #[must_use]
    pub const fn classify(spatially_split: bool, temporally_split: bool) -> Self {
        match (spatially_split, temporally_split) {
            (false, _) => Self::Temporal,
            (true, false) => Self::Spatial,
            (true, true) => Self::Hybrid,
        }
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of events treated as one unit at a tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub tier: ZoomTier,
    /// Member ids in `(approx, id)` order.
    pub members: Vec<EventId>,
    /// Dataset positions of the members, ascending.
    #[serde(skip)]
    pub positions: Vec<usize>,
    /// Certainty-weighted mean of member approximate instants.
    pub centroid_instant: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub centroid_location: Option<GeoPoint>,
    /// First to last member approximate instant, end exclusive.
    pub span: TimeRange,
    pub cluster_type: ClusterType,
    /// Mean member certainty, in `[0, 1]`.
    pub confidence: f64,
    pub burst: bool,
    /// Index of the enclosing cluster one tier coarser.
    #[serde(skip)]
    pub parent: Option<usize>,
    /// Indices of the clusters one tier finer that partition this one.
    #[serde(skip)]
    pub children: Vec<usize>,
}

impl Cluster {
    /// Summarize `positions` (ascending dataset indices, non-empty).
    pub(crate) fn from_members(
        tier: ZoomTier,
        events: &[NormalizedEvent],
        positions: Vec<usize>,
        cluster_type: ClusterType,
        burst: &BurstRule,
    ) -> Option<Self> {
        let first = events.get(*positions.first()?)?;
        let last = events.get(*positions.last()?)?;
        let members: Vec<&NormalizedEvent> = positions.iter().filter_map(|&p| events.get(p)).collect();

        let certainty_total: f64 = members.iter().map(|e| e.certainty).sum();
        let centroid_instant = weighted_mean_instant(members.iter().map(|e| (e.approx, e.certainty)))
            .unwrap_or(first.approx);
        let centroid_location = spherical_centroid(
            members
                .iter()
                .filter_map(|e| e.location().map(|loc| (loc.point, e.certainty))),
        );
        let span = span_of(first.approx, last.approx);
        let confidence = (certainty_total / members.len() as f64).clamp(0.0, 1.0);
        let is_burst = burst.matches(members.len(), last.approx - first.approx);
        let ids: Vec<EventId> = members.iter().map(|e| e.id().clone()).collect();

        Some(Self {
            id: ClusterId::derive(tier, &ids),
            tier,
            members: ids,
            positions,
            centroid_instant,
            centroid_location,
            span,
            cluster_type,
            confidence,
            burst: is_burst,
            parent: None,
            children: Vec::new(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }

    #[must_use]
    pub fn contains(&self, id: &EventId) -> bool {
        self.members.contains(id)
    }
}

/// Burst tagging parameters resolved from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstRule {
    pub min_size: usize,
    pub window: Duration,
}

impl BurstRule {
    #[must_use]
    pub fn from_config(config: &lifeline_core::config::BurstConfig) -> Self {
        Self {
            min_size: config.min_size,
            window: minutes(config.window_minutes),
        }
    }

    /// A run of at least `min_size` events whose first-to-last spread fits in
    /// `window`.
    #[must_use]
    pub fn matches(&self, len: usize, spread: Duration) -> bool {
        len >= self.min_size && spread <= self.window
    }
}

/// Fractional days as a millisecond-resolution duration.
#[must_use]
pub fn days(value: f64) -> Duration {
    Duration::milliseconds((value * 86_400_000.0).round() as i64)
}

fn minutes(value: f64) -> Duration {
    Duration::milliseconds((value * 60_000.0).round() as i64)
}

pub(crate) fn span_of(first: DateTime<Utc>, last: DateTime<Utc>) -> TimeRange {
    let end = last
        .checked_add_signed(Duration::milliseconds(1))
        .unwrap_or(last);
    TimeRange::new(first, end)
}

/// Weighted mean instant, computed as offsets from the earliest sample.
pub(crate) fn weighted_mean_instant(
    samples: impl IntoIterator<Item = (DateTime<Utc>, f64)>,
) -> Option<DateTime<Utc>> {
    let samples: Vec<(DateTime<Utc>, f64)> = samples.into_iter().collect();
    let origin = samples.iter().map(|(at, _)| *at).min()?;
    let (mut weighted, mut total) = (0.0_f64, 0.0_f64);
    for (at, weight) in &samples {
        weighted += (*at - origin).num_milliseconds() as f64 * weight;
        total += weight;
    }
    if total <= 0.0 {
        return Some(origin);
    }
    origin.checked_add_signed(Duration::milliseconds((weighted / total).round() as i64))
}
