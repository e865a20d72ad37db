//! Agglomerative spatial splitting of one temporal run.
//!
//! Each located event starts as its own group. The globally nearest pair of
//! group centroids is merged repeatedly while their great-circle distance is
//! below the tier threshold. Nearest pairs come from a [`SpatialIndex`] over
//! the live centroids plus a min-heap of candidate pairs; a candidate is
//! stale once either endpoint has merged since it was pushed, and is then
//! refreshed instead of applied.
//!
//! Unlocated events join the group whose centroid instant is nearest theirs.
//! A run with no located event at all stays a single group.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::Range;

use lifeline_core::spatial::{SpatialIndex, spherical_centroid};
use lifeline_core::{GeoPoint, NormalizedEvent};

use crate::cluster::weighted_mean_instant;

/// Result of splitting one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpatialSplit {
    /// Member positions per group, each ascending; groups ordered by their
    /// first member.
    pub groups: Vec<Vec<usize>>,
}

impl SpatialSplit {
    /// More than one group came out of the run.
    #[must_use]
    pub fn is_split(&self) -> bool {
        self.groups.len() > 1
    }
}

#[derive(Debug)]
struct Group {
    centroid: GeoPoint,
    weight: f64,
    members: Vec<usize>,
    version: u32,
    alive: bool,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    km: f64,
    a: usize,
    b: usize,
    version_a: u32,
    version_b: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Reversed so `BinaryHeap` pops the closest pair, lowest slots first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .km
            .total_cmp(&self.km)
            .then_with(|| other.a.cmp(&self.a))
            .then_with(|| other.b.cmp(&self.b))
    }
}

/// Split `events[run]` into spatially coherent groups.
///
/// `events` must be sorted by `(approx, id)`; returned positions index into
/// it.
#[must_use]
pub fn spatial_split(events: &[NormalizedEvent], run: Range<usize>, distance_km: f64) -> SpatialSplit {
    let mut groups: Vec<Group> = run
        .clone()
        .filter_map(|pos| {
            events[pos].location().map(|loc| Group {
                centroid: loc.point,
                weight: events[pos].certainty.max(f64::EPSILON),
                members: vec![pos],
                version: 0,
                alive: true,
            })
        })
        .collect();

    if groups.is_empty() {
        return SpatialSplit {
            groups: vec![run.collect()],
        };
    }

    merge_groups(&mut groups, distance_km);

    let mut live: Vec<Vec<usize>> = groups
        .into_iter()
        .filter(|g| g.alive)
        .map(|g| g.members)
        .collect();
    for members in &mut live {
        members.sort_unstable();
    }
    live.sort_by_key(|members| members[0]);

    attach_unlocated(events, run, &mut live);
    SpatialSplit { groups: live }
}

fn merge_groups(groups: &mut [Group], distance_km: f64) {
    let mut index = SpatialIndex::from_points(groups.iter().enumerate().map(|(i, g)| (i, g.centroid)));
    let mut heap = BinaryHeap::new();
    for slot in 0..groups.len() {
        push_nearest(&index, groups, slot, distance_km, &mut heap);
    }

    while let Some(candidate) = heap.pop() {
        let (a, b) = (candidate.a, candidate.b);
        let a_current = groups[a].alive && groups[a].version == candidate.version_a;
        let b_current = groups[b].alive && groups[b].version == candidate.version_b;
        if !(a_current && b_current) {
            if a_current {
                push_nearest(&index, groups, a, distance_km, &mut heap);
            }
            if b_current {
                push_nearest(&index, groups, b, distance_km, &mut heap);
            }
            continue;
        }

        let (keep, gone) = (a.min(b), a.max(b));
        let absorbed = std::mem::take(&mut groups[gone].members);
        let (gone_centroid, gone_weight) = (groups[gone].centroid, groups[gone].weight);
        groups[gone].alive = false;
        index.remove(gone);

        let target = &mut groups[keep];
        target.centroid = spherical_centroid([(target.centroid, target.weight), (gone_centroid, gone_weight)])
            .unwrap_or(target.centroid);
        target.weight += gone_weight;
        target.members.extend(absorbed);
        target.version += 1;
        index.insert(keep, target.centroid);

        push_nearest(&index, groups, keep, distance_km, &mut heap);
    }
}

fn push_nearest(
    index: &SpatialIndex,
    groups: &[Group],
    slot: usize,
    distance_km: f64,
    heap: &mut BinaryHeap<Candidate>,
) {
    if let Some((other, km)) = index.nearest_excluding(groups[slot].centroid, slot) {
        if km < distance_km {
            let (a, b) = (slot.min(other), slot.max(other));
            heap.push(Candidate {
                km,
                a,
                b,
                version_a: groups[a].version,
                version_b: groups[b].version,
            });
        }
    }
}

/// Give every unlocated position in `run` to the group with the nearest
/// centroid instant; ties go to the earlier group.
fn attach_unlocated(events: &[NormalizedEvent], run: Range<usize>, groups: &mut [Vec<usize>]) {
    let mut centroids: Vec<(DateTime<Utc>, usize)> = groups
        .iter()
        .enumerate()
        .filter_map(|(i, members)| {
            weighted_mean_instant(members.iter().map(|&p| (events[p].approx, events[p].certainty)))
                .map(|at| (at, i))
        })
        .collect();
    centroids.sort();
    if centroids.is_empty() {
        return;
    }

    let mut touched = false;
    for pos in run.filter(|&p| events[p].location().is_none()) {
        let at = events[pos].approx;
        let idx = centroids.partition_point(|(c, _)| *c < at);
        let before = idx.checked_sub(1).map(|i| centroids[i]);
        let after = centroids.get(idx).copied();
        let chosen = match (before, after) {
            (Some((b_at, b)), Some((a_at, a))) => {
                let (db, da) = (at - b_at, a_at - at);
                if da < db || (da == db && a < b) { a } else { b }
            }
            (Some((_, b)), None) => b,
            (None, Some((_, a))) => a,
            (None, None) => continue,
        };
        groups[chosen].push(pos);
        touched = true;
    }

    if touched {
        for members in groups.iter_mut() {
            members.sort_unstable();
        }
    }
}
