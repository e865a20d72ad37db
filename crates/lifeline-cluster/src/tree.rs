//! Multi-tier cluster tree construction.
//!
//! # Overview
//!
//! Tiers are built coarsest first (year, month, week, day, focus). Every
//! tier clusters the whole dataset: temporal runs under the tier's gap
//! threshold, each run split spatially under the tier's distance threshold.
//! The focus tier is one singleton per event.
//!
//! ## Nesting repair
//!
//! `EngineConfig::validate` rejects gap thresholds that grow toward finer
//! tiers, so under a validated config temporal runs always nest.
//! [`TreeBuilder::new`] does not validate; with an inverted config temporal
//! runs can straddle too and go through the same repair. Spatial splits can
//! straddle under any config: a fine group can span two coarse clusters. Such
//! a group keeps the members lying in its primary parent (the one holding the
//! most of them; ties go to the parent whose span is nearer the group's
//! centroid instant) and the remaining members become new groups under their
//! actual parents. Each reassignment is kept as a [`NestingRepair`].
//!
//! ## Reuse
//!
//! A tree carries a BLAKE3 fingerprint of everything clustering reads (event
//! ids, instants, certainties, locations and the configuration). A rebuild
//! whose fingerprint matches the previous tree shares its tiers and only
//! takes the new version and dataset.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use lifeline_core::config::{EngineConfig, TierConfig};
use lifeline_core::error::ErrorCode;
use lifeline_core::timing::timed;
use lifeline_core::{DataVersion, Dataset, EventId, NormalizedEvent, TimeRange, ZoomTier};

use crate::cluster::{BurstRule, Cluster, ClusterId, ClusterType, days};
use crate::spatial::spatial_split;
use crate::temporal::temporal_runs;

// ---------------------------------------------------------------------------
// Errors and diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("rebuild for {version} cancelled before tier {tier}")]
    Cancelled { version: DataVersion, tier: ZoomTier },
}

impl BuildError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Cancelled { .. } => ErrorCode::RebuildCancelled,
        }
    }
}

/// Audit record for events moved to keep a finer cluster inside one parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestingRepair {
    pub tier: ZoomTier,
    /// Parent that kept the bulk of the straddling group.
    pub kept_parent: ClusterId,
    /// Parent the moved events belong to.
    pub moved_to: ClusterId,
    pub moved: Vec<EventId>,
}

impl NestingRepair {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::NestingViolation
    }
}

/// Polled between tiers; a `true` aborts the build.
pub trait Cancellation {
    fn is_cancelled(&self) -> bool;
}

impl<F: Fn() -> bool> Cancellation for F {
    fn is_cancelled(&self) -> bool {
        self()
    }
}

/// Never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uncancellable;

impl Cancellation for Uncancellable {
    fn is_cancelled(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Clusters of one tier, ordered by `(span.start, id)`.
#[derive(Debug, Clone)]
pub struct TierLevel {
    pub tier: ZoomTier,
    clusters: Vec<Cluster>,
    /// Cluster index per dataset position.
    owner: Vec<usize>,
    /// Widest span at this tier; bounds the overlap search.
    max_span: Duration,
}

impl TierLevel {
    const fn empty(tier: ZoomTier) -> Self {
        Self {
            tier,
            clusters: Vec::new(),
            owner: Vec::new(),
            max_span: Duration::zero(),
        }
    }

    #[must_use]
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Index of the cluster holding dataset position `pos`.
    #[must_use]
    pub fn owner_of(&self, pos: usize) -> Option<usize> {
        self.owner.get(pos).copied()
    }

    /// Clusters whose span overlaps `range`, in tier order.
    #[must_use]
    pub fn overlapping(&self, range: &TimeRange) -> Vec<&Cluster> {
        let earliest = range
            .start
            .checked_sub_signed(self.max_span)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let from = self.clusters.partition_point(|c| c.span.start < earliest);
        let to = self.clusters.partition_point(|c| c.span.start < range.end);
        self.clusters[from..to.max(from)]
            .iter()
            .filter(|c| c.span.overlaps(range))
            .collect()
    }
}

/// Clusters for every tier over one dataset version.
#[derive(Debug, Clone)]
pub struct ClusterTree {
    version: DataVersion,
    fingerprint: String,
    dataset: Arc<Dataset>,
    levels: Arc<Vec<TierLevel>>,
    lookup: Arc<HashMap<ClusterId, (ZoomTier, usize)>>,
    repairs: Arc<Vec<NestingRepair>>,
}

impl ClusterTree {
    /// Tree with no events at every tier.
    #[must_use]
    pub fn empty(version: DataVersion) -> Self {
        Self {
            version,
            fingerprint: String::new(),
            dataset: Arc::new(Dataset::default().with_version(version)),
            levels: Arc::new(ZoomTier::ALL.into_iter().map(TierLevel::empty).collect()),
            lookup: Arc::default(),
            repairs: Arc::default(),
        }
    }

    #[must_use]
    pub const fn version(&self) -> DataVersion {
        self.version
    }

    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    #[must_use]
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    #[must_use]
    pub fn level(&self, tier: ZoomTier) -> &TierLevel {
        &self.levels[tier.index()]
    }

    #[must_use]
    pub fn clusters(&self, tier: ZoomTier) -> &[Cluster] {
        self.level(tier).clusters()
    }

    /// Look a cluster up by id at any tier.
    #[must_use]
    pub fn cluster(&self, id: &ClusterId) -> Option<&Cluster> {
        let (tier, idx) = self.lookup.get(id)?;
        self.level(*tier).clusters.get(*idx)
    }

    /// Clusters one tier finer that partition `cluster`.
    pub fn children<'a>(&'a self, cluster: &'a Cluster) -> impl Iterator<Item = &'a Cluster> + 'a {
        let finer = cluster.tier.finer().map(|tier| self.level(tier));
        cluster
            .children
            .iter()
            .filter_map(move |&idx| finer.and_then(|level| level.clusters.get(idx)))
    }

    /// Enclosing cluster one tier coarser.
    #[must_use]
    pub fn parent(&self, cluster: &Cluster) -> Option<&Cluster> {
        let tier = cluster.tier.coarser()?;
        self.level(tier).clusters.get(cluster.parent?)
    }

    #[must_use]
    pub fn repairs(&self) -> &[NestingRepair] {
        &self.repairs
    }

    #[must_use]
    pub fn event_count(&self) -> usize {
        self.dataset.len()
    }

    /// Per-tier summary for reports.
    #[must_use]
    pub fn stats(&self) -> Vec<TierStats> {
        ZoomTier::ALL
            .into_iter()
            .map(|tier| {
                let clusters = self.clusters(tier);
                let mut by_type = BTreeMap::new();
                for cluster in clusters {
                    *by_type.entry(cluster.cluster_type.as_str()).or_insert(0) += 1;
                }
                TierStats {
                    tier,
                    clusters: clusters.len(),
                    bursts: clusters.iter().filter(|c| c.burst).count(),
                    singletons: clusters.iter().filter(|c| c.is_singleton()).count(),
                    largest: clusters.iter().map(Cluster::len).max().unwrap_or(0),
                    by_type,
                    repairs: self.repairs.iter().filter(|r| r.tier == tier).count(),
                }
            })
            .collect()
    }

    fn reversioned(&self, dataset: Arc<Dataset>) -> Self {
        Self {
            version: dataset.version(),
            dataset,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierStats {
    pub tier: ZoomTier,
    pub clusters: usize,
    pub bursts: usize,
    pub singletons: usize,
    pub largest: usize,
    pub by_type: BTreeMap<&'static str, usize>,
    pub repairs: usize,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TreeBuilder {
    config: EngineConfig,
    burst: BurstRule,
}

impl TreeBuilder {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.clone(),
            burst: BurstRule::from_config(&config.burst),
        }
    }

    /// Build every tier without cancellation.
    #[must_use]
    pub fn build(&self, dataset: Arc<Dataset>) -> ClusterTree {
        let version = dataset.version();
        self.rebuild(dataset, None, &Uncancellable)
            .unwrap_or_else(|_| ClusterTree::empty(version))
    }

    /// Build every tier, reusing `previous` when its fingerprint matches and
    /// polling `cancel` before each tier.
    ///
    /// # Errors
    ///
    /// [`BuildError::Cancelled`] when `cancel` fires before the last tier.
    pub fn rebuild(
        &self,
        dataset: Arc<Dataset>,
        previous: Option<&ClusterTree>,
        cancel: &dyn Cancellation,
    ) -> Result<ClusterTree, BuildError> {
        let fingerprint = self.fingerprint(&dataset);
        if let Some(previous) = previous.filter(|p| p.fingerprint == fingerprint) {
            debug!(
                from = %previous.version,
                to = %dataset.version(),
                "clustering inputs unchanged, reusing tiers"
            );
            return Ok(previous.reversioned(dataset));
        }

        timed("tree.build", || self.build_levels(dataset, fingerprint, cancel))
    }

    fn build_levels(
        &self,
        dataset: Arc<Dataset>,
        fingerprint: String,
        cancel: &dyn Cancellation,
    ) -> Result<ClusterTree, BuildError> {
        let version = dataset.version();
        let events = dataset.events();
        let mut levels: Vec<TierLevel> = Vec::with_capacity(ZoomTier::ALL.len());
        let mut repairs = Vec::new();

        for tier in ZoomTier::ALL {
            if cancel.is_cancelled() {
                debug!(%version, %tier, "tree build cancelled");
                return Err(BuildError::Cancelled { version, tier });
            }

            let mut level = timed(tier_timer(tier), || {
                let groups = self.tier_groups(tier, events);
                let groups = match levels.last() {
                    Some(parent) => repair_nesting(tier, groups, parent, events, &mut repairs),
                    None => groups,
                };
                self.materialize(tier, events, groups)
            });

            if let Some(parent) = levels.last_mut() {
                link(parent, &mut level);
            }
            debug!(
                %version,
                %tier,
                clusters = level.len(),
                bursts = level.clusters.iter().filter(|c| c.burst).count(),
                "tier built"
            );
            levels.push(level);
        }

        if !repairs.is_empty() {
            warn!(
                %version,
                repairs = repairs.len(),
                code = %ErrorCode::NestingViolation,
                "finer clusters straddled coarser ones and were repaired"
            );
        }
        info!(%version, events = events.len(), "cluster tree built");

        let lookup: HashMap<ClusterId, (ZoomTier, usize)> = levels
            .iter()
            .flat_map(|level| {
                level
                    .clusters
                    .iter()
                    .enumerate()
                    .map(|(idx, c)| (c.id.clone(), (c.tier, idx)))
            })
            .collect();

        Ok(ClusterTree {
            version,
            fingerprint,
            dataset,
            levels: Arc::new(levels),
            lookup: Arc::new(lookup),
            repairs: Arc::new(repairs),
        })
    }

    /// Groups of dataset positions for one tier before nesting repair.
    fn tier_groups(&self, tier: ZoomTier, events: &[NormalizedEvent]) -> Vec<Group> {
        if tier == ZoomTier::Focus {
            return (0..events.len())
                .map(|pos| Group {
                    positions: vec![pos],
                    cluster_type: ClusterType::Temporal,
                })
                .collect();
        }

        let thresholds: &TierConfig = self.config.tiers.get(tier);
        let runs = temporal_runs(events, days(thresholds.gap_days), &self.burst);
        let temporally_split = runs.len() > 1;

        runs.into_iter()
            .flat_map(|run| {
                let split = spatial_split(events, run.range, thresholds.distance_km);
                let cluster_type = ClusterType::classify(split.is_split(), temporally_split);
                split.groups.into_iter().map(move |positions| Group {
                    positions,
                    cluster_type,
                })
            })
            .collect()
    }

    fn materialize(&self, tier: ZoomTier, events: &[NormalizedEvent], groups: Vec<Group>) -> TierLevel {
        let mut clusters: Vec<Cluster> = groups
            .into_iter()
            .filter_map(|g| Cluster::from_members(tier, events, g.positions, g.cluster_type, &self.burst))
            .collect();
        clusters.sort_by(|a, b| a.span.start.cmp(&b.span.start).then_with(|| a.id.cmp(&b.id)));

        let mut owner = vec![0; events.len()];
        for (idx, cluster) in clusters.iter().enumerate() {
            for &pos in &cluster.positions {
                owner[pos] = idx;
            }
        }
        let max_span = clusters
            .iter()
            .map(|c| c.span.duration())
            .max()
            .unwrap_or_else(Duration::zero);

        TierLevel {
            tier,
            clusters,
            owner,
            max_span,
        }
    }

    /// BLAKE3 over the configuration and every clustering input.
    fn fingerprint(&self, dataset: &Dataset) -> String {
        let mut hasher = blake3::Hasher::new();
        if let Ok(config) = serde_json::to_vec(&self.config) {
            hasher.update(&config);
        }
        for event in dataset.events() {
            hasher.update(event.id().as_str().as_bytes());
            hasher.update(b"\x00");
            hasher.update(&event.approx.timestamp_millis().to_le_bytes());
            hasher.update(&event.certainty.to_bits().to_le_bytes());
            match event.location() {
                Some(loc) => {
                    hasher.update(&loc.point.lat.to_bits().to_le_bytes());
                    hasher.update(&loc.point.lon.to_bits().to_le_bytes());
                }
                None => {
                    hasher.update(b"-");
                }
            }
        }
        format!("blake3:{}", hasher.finalize())
    }
}

const fn tier_timer(tier: ZoomTier) -> &'static str {
    match tier {
        ZoomTier::Year => "tier.year",
        ZoomTier::Month => "tier.month",
        ZoomTier::Week => "tier.week",
        ZoomTier::Day => "tier.day",
        ZoomTier::Focus => "tier.focus",
    }
}

#[derive(Debug)]
struct Group {
    positions: Vec<usize>,
    cluster_type: ClusterType,
}

/// Split groups that straddle parent clusters so each lies in exactly one.
fn repair_nesting(
    tier: ZoomTier,
    groups: Vec<Group>,
    parent: &TierLevel,
    events: &[NormalizedEvent],
    repairs: &mut Vec<NestingRepair>,
) -> Vec<Group> {
    let mut out = Vec::with_capacity(groups.len());
    for group in groups {
        let mut by_parent: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for &pos in &group.positions {
            by_parent.entry(parent.owner[pos]).or_default().push(pos);
        }
        if by_parent.len() <= 1 {
            out.push(group);
            continue;
        }

        let centroid = crate::cluster::weighted_mean_instant(
            group
                .positions
                .iter()
                .map(|&p| (events[p].approx, events[p].certainty)),
        )
        .unwrap_or(events[group.positions[0]].approx);

        let primary = by_parent
            .iter()
            .max_by(|(a_idx, a), (b_idx, b)| {
                a.len()
                    .cmp(&b.len())
                    .then_with(|| {
                        let da = boundary_distance(&parent.clusters[**a_idx].span, centroid);
                        let db = boundary_distance(&parent.clusters[**b_idx].span, centroid);
                        db.cmp(&da)
                    })
                    .then_with(|| b_idx.cmp(a_idx))
            })
            .map(|(idx, _)| *idx);
        let Some(primary) = primary else {
            out.push(group);
            continue;
        };

        for (parent_idx, positions) in by_parent {
            if parent_idx != primary {
                repairs.push(NestingRepair {
                    tier,
                    kept_parent: parent.clusters[primary].id.clone(),
                    moved_to: parent.clusters[parent_idx].id.clone(),
                    moved: positions.iter().map(|&p| events[p].id().clone()).collect(),
                });
            }
            out.push(Group {
                positions,
                cluster_type: group.cluster_type,
            });
        }
    }
    out
}

/// Zero inside the span, otherwise the gap to its nearer end.
fn boundary_distance(span: &TimeRange, at: DateTime<Utc>) -> Duration {
    if span.contains(at) {
        Duration::zero()
    } else if at < span.start {
        span.start - at
    } else {
        at - span.end
    }
}

fn link(parent: &mut TierLevel, child: &mut TierLevel) {
    for cluster in &mut parent.clusters {
        cluster.children.clear();
    }
    for (idx, cluster) in child.clusters.iter_mut().enumerate() {
        if let Some(&pos) = cluster.positions.first() {
            let owner = parent.owner[pos];
            cluster.parent = Some(owner);
            parent.clusters[owner].children.push(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lifeline_core::{Event, GeoLocation, Normalizer};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 4, 1, 9, 0, 0)
            .single()
            .expect("valid instant")
    }

    fn dataset(events: Vec<Event>, version: u64) -> Arc<Dataset> {
        Arc::new(Dataset::ingest(events, DataVersion::new(version), &Normalizer::default()).0)
    }

    fn sample_events() -> Vec<Event> {
        let london = GeoLocation::new(51.5, -0.12, 20.0);
        let rome = GeoLocation::new(41.9, 12.5, 20.0);
        vec![
            Event::new("a", base()).with_location(london),
            Event::new("b", base() + Duration::hours(2)).with_location(london),
            Event::new("c", base() + Duration::days(3)).with_location(rome),
            Event::new("d", base() + Duration::days(3) + Duration::hours(1)).with_location(rome),
            Event::new("e", base() + Duration::days(200)),
        ]
    }

    #[test]
    fn parent_child_links_are_consistent() {
        let tree = TreeBuilder::new(&EngineConfig::default()).build(dataset(sample_events(), 1));
        for tier in ZoomTier::ALL {
            let clusters = tree.clusters(tier);
            let total: usize = clusters.iter().map(Cluster::len).sum();
            assert_eq!(total, 5, "tier {tier}");
            for cluster in clusters {
                let child_total: usize = tree.children(cluster).map(Cluster::len).sum();
                if tier == ZoomTier::Focus {
                    assert_eq!(child_total, 0);
                } else {
                    assert_eq!(child_total, cluster.len(), "{}", cluster.id);
                }
                if let Some(parent) = tree.parent(cluster) {
                    assert!(cluster.members.iter().all(|m| parent.contains(m)));
                }
            }
        }
        assert_eq!(tree.clusters(ZoomTier::Focus).len(), 5);
    }

    #[test]
    fn london_and_rome_split_into_hybrid_clusters_at_month_tier() {
        let tree = TreeBuilder::new(&EngineConfig::default()).build(dataset(sample_events(), 1));
        let month = tree.clusters(ZoomTier::Month);
        let members: Vec<Vec<&str>> = month
            .iter()
            .map(|c| c.members.iter().map(EventId::as_str).collect())
            .collect();
        assert_eq!(members, vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]]);
        assert_eq!(month[0].cluster_type, ClusterType::Hybrid);
        assert_eq!(month[2].cluster_type, ClusterType::Temporal);
        assert!(month[0].centroid_location.is_some());
        assert!(month[2].centroid_location.is_none());
    }

    #[test]
    fn equal_thresholds_need_no_repair() {
        let mut config = EngineConfig::default();
        config.tiers.year.gap_days = 5.0;
        config.tiers.month.gap_days = 5.0;
        config.tiers.year.distance_km = 10.0;
        config.tiers.month.distance_km = 10.0;
        let spot = GeoLocation::new(10.0, 10.0, 1.0);
        let far = GeoLocation::new(-10.0, -10.0, 1.0);
        let events = vec![
            Event::new("x1", base()).with_location(spot),
            Event::new("x2", base() + Duration::days(1)).with_location(far),
            Event::new("y1", base() + Duration::days(2)).with_location(spot),
        ];
        let tree = TreeBuilder::new(&config).build(dataset(events, 1));
        assert!(tree.repairs().is_empty());
        for cluster in tree.clusters(ZoomTier::Month) {
            let parent = tree.parent(cluster).expect("parent");
            assert!(cluster.members.iter().all(|m| parent.contains(m)));
        }
    }

    #[test]
    fn unvalidated_inverted_gaps_are_repaired() {
        let mut config = EngineConfig::default();
        config.tiers.year.gap_days = 1.0;
        config.tiers.month.gap_days = 10.0;
        assert!(config.validate().is_err());

        let events = (0..3)
            .map(|i| Event::new(format!("g{i}"), base() + Duration::days(i * 5)))
            .collect();
        let tree = TreeBuilder::new(&config).build(dataset(events, 1));

        assert_eq!(tree.clusters(ZoomTier::Year).len(), 3);
        assert_eq!(tree.clusters(ZoomTier::Month).len(), 3);
        assert!(!tree.repairs().is_empty());
        assert!(crate::verify::verify_tree(&tree).is_empty());
    }

    #[test]
    fn repair_keeps_majority_and_records_moves() {
        let events: Vec<NormalizedEvent> = {
            let raw = (0..4).map(|i| Event::new(format!("p{i}"), base() + Duration::hours(i)));
            Dataset::ingest(raw, DataVersion::new(1), &Normalizer::default())
                .0
                .events()
                .to_vec()
        };
        let burst = BurstRule {
            min_size: 2,
            window: Duration::hours(1),
        };
        let parent_clusters = vec![
            Cluster::from_members(ZoomTier::Year, &events, vec![0, 1, 2], ClusterType::Temporal, &burst)
                .expect("cluster"),
            Cluster::from_members(ZoomTier::Year, &events, vec![3], ClusterType::Temporal, &burst)
                .expect("cluster"),
        ];
        let parent = TierLevel {
            tier: ZoomTier::Year,
            clusters: parent_clusters,
            owner: vec![0, 0, 0, 1],
            max_span: Duration::hours(2),
        };
        let straddler = Group {
            positions: vec![1, 2, 3],
            cluster_type: ClusterType::Spatial,
        };
        let mut repairs = Vec::new();
        let out = repair_nesting(ZoomTier::Month, vec![straddler], &parent, &events, &mut repairs);

        let groups: Vec<Vec<usize>> = out.into_iter().map(|g| g.positions).collect();
        assert_eq!(groups, vec![vec![1, 2], vec![3]]);
        assert_eq!(repairs.len(), 1);
        assert_eq!(repairs[0].moved, vec![EventId::from("p3")]);
        assert_eq!(repairs[0].kept_parent, parent.clusters[0].id);
        assert_eq!(repairs[0].moved_to, parent.clusters[1].id);
        assert_eq!(repairs[0].code(), ErrorCode::NestingViolation);
    }

    #[test]
    fn cancelled_build_reports_tier() {
        let builder = TreeBuilder::new(&EngineConfig::default());
        let polls = std::cell::Cell::new(0);
        let cancel = || {
            polls.set(polls.get() + 1);
            polls.get() > 2
        };
        let err = builder
            .rebuild(dataset(sample_events(), 4), None, &cancel)
            .expect_err("cancelled");
        assert_eq!(
            err,
            BuildError::Cancelled {
                version: DataVersion::new(4),
                tier: ZoomTier::Week
            }
        );
        assert_eq!(err.code(), ErrorCode::RebuildCancelled);
    }

    #[test]
    fn unchanged_inputs_reuse_previous_tiers() {
        let builder = TreeBuilder::new(&EngineConfig::default());
        let first = builder.build(dataset(sample_events(), 1));

        let mut edited = sample_events();
        edited[0].payload = "blob://new-caption".into();
        let second = builder
            .rebuild(dataset(edited, 2), Some(&first), &Uncancellable)
            .expect("rebuild");
        assert_eq!(second.version(), DataVersion::new(2));
        assert!(Arc::ptr_eq(&first.levels, &second.levels));
        assert_eq!(second.dataset().events()[0].event.payload, "blob://new-caption");

        let mut moved = sample_events();
        moved[4].instant = (base() + Duration::days(300)).into();
        let third = builder
            .rebuild(dataset(moved, 3), Some(&second), &Uncancellable)
            .expect("rebuild");
        assert!(!Arc::ptr_eq(&second.levels, &third.levels));
        assert_ne!(second.fingerprint(), third.fingerprint());
    }

    #[test]
    fn empty_dataset_builds_empty_tiers() {
        let tree = TreeBuilder::new(&EngineConfig::default()).build(dataset(Vec::new(), 1));
        for tier in ZoomTier::ALL {
            assert!(tree.clusters(tier).is_empty());
        }
        let empty = ClusterTree::empty(DataVersion::new(0));
        assert!(empty.level(ZoomTier::Day).is_empty());
    }

    #[test]
    fn overlap_query_respects_span_bounds() {
        let tree = TreeBuilder::new(&EngineConfig::default()).build(dataset(sample_events(), 1));
        let window = TimeRange::new(base() + Duration::days(2), base() + Duration::days(4));
        let hits: Vec<&str> = tree
            .level(ZoomTier::Month)
            .overlapping(&window)
            .into_iter()
            .flat_map(|c| c.members.iter().map(EventId::as_str))
            .collect();
        assert_eq!(hits, vec!["c", "d"]);
    }
}
