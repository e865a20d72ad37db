//! Visible render-node selection with memoization.
//!
//! # Selection
//!
//! 1. The tier comes from the viewport.
//! 2. The visible range is widened by `lookahead_fraction` of its span on
//!    each side, then snapped outward to the tier's bucket so small pans map
//!    to the same range.
//! 3. Every cluster of that tier overlapping the range is emitted. A cluster
//!    the user expanded is replaced by its children one tier finer, and so on
//!    recursively. Singleton clusters are emitted as event nodes.
//! 4. Nodes are ordered by `(display_instant, id)`.
//!
//! # Memoization
//!
//! Results are memoized in a `moka` LRU cache keyed by tier, bucketed range,
//! the expanded set, the tree's data version and the exact density and
//! origin (geometry depends on both).
//!
//! # Staleness
//!
//! A tree older than the requested data version is still served. The result
//! is flagged stale, a `StaleTree` warning is logged and a rebuild is
//! requested once per version through [`RebuildTrigger`].

use chrono::DateTime;
use chrono::Utc;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::sync::Arc;
use tracing::{debug, warn};

use lifeline_cluster::{Cluster, ClusterId, ClusterTree};
use lifeline_core::config::{EngineConfig, RenderConfig, TierThresholds};
use lifeline_core::error::ErrorCode;
use lifeline_core::timing::timed;
use lifeline_core::{DataVersion, TimeRange, ZoomTier};

use crate::node::{ClusterNode, EventNode, Geometry, RenderNode};
use crate::viewport::ViewportState;

/// Seam through which the aggregator asks for a fresh tree.
pub trait RebuildTrigger: Send + Sync {
    fn request_rebuild(&self, version: DataVersion);
}

/// Trigger that ignores requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRebuild;

impl RebuildTrigger for NoRebuild {
    fn request_rebuild(&self, _version: DataVersion) {}
}

/// Output of one [`Aggregator::compute_visible_nodes`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleNodes {
    pub nodes: Arc<Vec<RenderNode>>,
    pub tier: ZoomTier,
    /// Bucketed selection range, lookahead included.
    pub range: TimeRange,
    /// Version of the tree the nodes came from.
    pub served_version: DataVersion,
    /// The tree was older than the requested version.
    pub stale: bool,
    pub cache_hit: bool,
}

impl VisibleNodes {
    /// Total events represented by the nodes.
    #[must_use]
    pub fn represented_events(&self) -> usize {
        self.nodes.iter().map(RenderNode::weight).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    tier: ZoomTier,
    start_ms: i64,
    end_ms: i64,
    expanded: Vec<ClusterId>,
    version: DataVersion,
    ppd_bits: u64,
    origin_ms: i64,
}

pub struct Aggregator {
    render: RenderConfig,
    tiers: TierThresholds,
    cache: Cache<MemoKey, Arc<Vec<RenderNode>>>,
    trigger: Arc<dyn RebuildTrigger>,
    requested: Option<DataVersion>,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("render", &self.render)
            .field("cached", &self.cache.entry_count())
            .field("requested", &self.requested)
            .finish_non_exhaustive()
    }
}

impl Aggregator {
    #[must_use]
    pub fn new(config: &EngineConfig, trigger: Arc<dyn RebuildTrigger>) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.render.cache_entries.max(1))
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self {
            render: config.render,
            tiers: config.tiers,
            cache,
            trigger,
            requested: None,
        }
    }

    /// Render nodes for `viewport` over `tree`, as of `data_version`.
    ///
    /// Never blocks on a rebuild and never fails: an empty tree yields an
    /// empty list, a stale tree yields its own nodes flagged stale.
    pub fn compute_visible_nodes(
        &mut self,
        viewport: &ViewportState,
        tree: &ClusterTree,
        data_version: DataVersion,
    ) -> VisibleNodes {
        let stale = tree.version() < data_version;
        if stale {
            self.note_stale(tree.version(), data_version);
        }

        let tier = viewport.zoom_tier();
        let range = self.selection_range(viewport, tier);
        let key = MemoKey {
            tier,
            start_ms: range.start.timestamp_millis(),
            end_ms: range.end.timestamp_millis(),
            expanded: viewport.expanded().iter().cloned().collect(),
            version: tree.version(),
            ppd_bits: viewport.pixels_per_day().to_bits(),
            origin_ms: viewport.origin().timestamp_millis(),
        };

        if let Some(nodes) = self.cache.get(&key) {
            debug!(%tier, version = %tree.version(), nodes = nodes.len(), "visible nodes cache hit");
            return VisibleNodes {
                nodes,
                tier,
                range,
                served_version: tree.version(),
                stale,
                cache_hit: true,
            };
        }

        let nodes = timed("nodes.compute", || Arc::new(self.select(viewport, tree, tier, &range)));
        debug!(%tier, version = %tree.version(), nodes = nodes.len(), "visible nodes computed");
        self.cache.insert(key, Arc::clone(&nodes));

        VisibleNodes {
            nodes,
            tier,
            range,
            served_version: tree.version(),
            stale,
            cache_hit: false,
        }
    }

    /// Drop every memoized list.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    fn note_stale(&mut self, have: DataVersion, want: DataVersion) {
        warn!(
            code = %ErrorCode::StaleTree,
            tree_version = %have,
            requested = %want,
            "serving nodes from an older cluster tree"
        );
        if self.requested.is_none_or(|v| v < want) {
            self.requested = Some(want);
            self.trigger.request_rebuild(want);
        }
    }

    fn selection_range(&self, viewport: &ViewportState, tier: ZoomTier) -> TimeRange {
        let visible = viewport.visible_range();
        let margin_ms = (visible.duration().num_milliseconds() as f64 * self.render.lookahead_fraction).round();
        let margin = chrono::Duration::milliseconds(margin_ms as i64);
        let bucket = lifeline_cluster::cluster::days(self.tiers.get(tier).bucket_days);
        visible.widened(margin).snapped(bucket)
    }

    fn select(
        &self,
        viewport: &ViewportState,
        tree: &ClusterTree,
        tier: ZoomTier,
        range: &TimeRange,
    ) -> Vec<RenderNode> {
        let mut nodes = Vec::new();
        for cluster in tree.level(tier).overlapping(range) {
            self.emit(viewport, tree, cluster, false, &mut nodes);
        }
        nodes.sort_by(|a, b| {
            a.display_instant()
                .cmp(&b.display_instant())
                .then_with(|| a.id().cmp(b.id()))
        });
        nodes
    }

    fn emit(
        &self,
        viewport: &ViewportState,
        tree: &ClusterTree,
        cluster: &Cluster,
        inside_expanded: bool,
        out: &mut Vec<RenderNode>,
    ) {
        if viewport.is_expanded(&cluster.id) && !cluster.children.is_empty() {
            for child in tree.children(cluster) {
                self.emit(viewport, tree, child, true, out);
            }
            return;
        }

        if cluster.is_singleton() {
            if let Some(event) = cluster.positions.first().and_then(|&p| tree.dataset().events().get(p)) {
                out.push(RenderNode::Event(EventNode {
                    id: event.id().clone(),
                    display_instant: event.approx,
                    display_location: event.location().map(|loc| loc.point),
                    kind: event.event.kind.clone(),
                    private: event.event.private,
                    geometry: self.geometry(viewport, event.approx, 0.0),
                    expanded: inside_expanded,
                }));
                return;
            }
        }

        out.push(RenderNode::Cluster(ClusterNode {
            id: cluster.id.clone(),
            tier: cluster.tier,
            display_instant: cluster.centroid_instant,
            display_location: cluster.centroid_location,
            weight: cluster.len(),
            span: cluster.span,
            cluster_type: cluster.cluster_type,
            confidence: cluster.confidence,
            burst: cluster.burst,
            geometry: self.geometry(viewport, cluster.span.start, cluster.span.span_days()),
            expanded: inside_expanded,
        }));
    }

    fn geometry(&self, viewport: &ViewportState, start: DateTime<Utc>, span_days: f64) -> Geometry {
        let ppd = viewport.pixels_per_day();
        Geometry {
            x_px: viewport.x_of(start),
            width_px: (span_days * ppd).max(self.render.min_node_px),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::ViewportController;
    use chrono::{Duration, TimeZone};
    use lifeline_cluster::TreeBuilder;
    use lifeline_core::{Dataset, Event, GeoLocation, Normalizer};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<DataVersion>>);

    impl RebuildTrigger for Recorder {
        fn request_rebuild(&self, version: DataVersion) {
            if let Ok(mut seen) = self.0.lock() {
                seen.push(version);
            }
        }
    }

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
            .single()
            .expect("valid instant")
    }

    fn tree(version: u64) -> ClusterTree {
        let paris = GeoLocation::new(48.85, 2.35, 10.0);
        let events = vec![
            Event::new("a", origin() + Duration::days(10)).with_location(paris),
            Event::new("b", origin() + Duration::days(10) + Duration::minutes(5)).with_location(paris),
            Event::new("c", origin() + Duration::days(12)).with_location(paris),
            Event::new("d", origin() + Duration::days(90)),
        ];
        let dataset = Dataset::ingest(events, DataVersion::new(version), &Normalizer::default()).0;
        TreeBuilder::new(&EngineConfig::default()).build(Arc::new(dataset))
    }

    fn viewport(level: f64) -> ViewportController {
        let mut vc = ViewportController::new(EngineConfig::default().zoom, origin(), 1_200.0);
        vc.set_zoom_level(level);
        vc.center_on(origin() + Duration::days(30));
        vc
    }

    #[test]
    fn second_call_is_a_cache_hit_with_identical_output() {
        let tree = tree(1);
        let vc = viewport(0.3);
        let mut agg = Aggregator::new(&EngineConfig::default(), Arc::new(NoRebuild));

        let first = agg.compute_visible_nodes(vc.state(), &tree, DataVersion::new(1));
        let second = agg.compute_visible_nodes(vc.state(), &tree, DataVersion::new(1));
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.nodes, second.nodes);
        assert_eq!(first.represented_events(), 4);
    }

    #[test]
    fn nodes_are_sorted_and_singletons_render_as_events() {
        let tree = tree(1);
        let vc = viewport(0.5);
        let mut agg = Aggregator::new(&EngineConfig::default(), Arc::new(NoRebuild));
        let out = agg.compute_visible_nodes(vc.state(), &tree, DataVersion::new(1));

        let instants: Vec<_> = out.nodes.iter().map(RenderNode::display_instant).collect();
        assert!(instants.windows(2).all(|w| w[0] <= w[1]));
        assert!(out.nodes.iter().any(|n| matches!(n, RenderNode::Event(e) if e.id.as_str() == "d")));
    }

    #[test]
    fn stale_tree_is_served_and_rebuild_requested_once() {
        let tree = tree(1);
        let vc = viewport(0.3);
        let recorder = Arc::new(Recorder::default());
        let mut agg = Aggregator::new(&EngineConfig::default(), recorder.clone());

        let out = agg.compute_visible_nodes(vc.state(), &tree, DataVersion::new(2));
        assert!(out.stale);
        assert_eq!(out.served_version, DataVersion::new(1));
        assert!(!out.nodes.is_empty());

        let _ = agg.compute_visible_nodes(vc.state(), &tree, DataVersion::new(2));
        let _ = agg.compute_visible_nodes(vc.state(), &tree, DataVersion::new(3));
        let seen = recorder.0.lock().expect("lock").clone();
        assert_eq!(seen, vec![DataVersion::new(2), DataVersion::new(3)]);
    }

    #[test]
    fn empty_tree_yields_empty_list() {
        let tree = ClusterTree::empty(DataVersion::new(0));
        let vc = viewport(0.5);
        let mut agg = Aggregator::new(&EngineConfig::default(), Arc::new(NoRebuild));
        let out = agg.compute_visible_nodes(vc.state(), &tree, DataVersion::new(0));
        assert!(out.nodes.is_empty());
        assert!(!out.stale);
    }

    #[test]
    fn selection_range_is_bucketed_and_covers_lookahead() {
        let tree = tree(1);
        let mut vc = viewport(0.5);
        vc.pan(400.0);
        let mut agg = Aggregator::new(&EngineConfig::default(), Arc::new(NoRebuild));
        let out = agg.compute_visible_nodes(vc.state(), &tree, DataVersion::new(1));

        let visible = vc.state().visible_range();
        let margin = visible.duration() / 2;
        assert!(out.range.start <= visible.start - margin);
        assert!(out.range.end >= visible.end + margin);
        // Week tier buckets by whole days.
        assert_eq!(out.range.start.timestamp_millis() % 86_400_000, 0);
        assert_eq!(out.range.end.timestamp_millis() % 86_400_000, 0);
    }

    #[test]
    fn geometry_width_has_a_floor() {
        let tree = tree(1);
        let vc = viewport(0.9);
        let mut agg = Aggregator::new(&EngineConfig::default(), Arc::new(NoRebuild));
        let out = agg.compute_visible_nodes(vc.state(), &tree, DataVersion::new(1));
        assert!(out.nodes.iter().all(|n| n.geometry().width_px >= 4.0));
    }
}
