use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use lifeline_cluster::{ClusterTree, TreeBuilder};
use lifeline_core::{DataVersion, Dataset, EngineConfig, Normalizer, ZoomTier};
use lifeline_sim::{CorpusConfig, generate};
use lifeline_view::{Aggregator, NoRebuild, RenderNode, Timeline, ViewportController};

fn corpus_tree(config: &EngineConfig, count: usize, years: u32, seed: u64) -> ClusterTree {
    let events = generate(&CorpusConfig::sized(count, years, seed));
    let dataset = Dataset::ingest(events, DataVersion::new(1), &Normalizer::new(config.seasons)).0;
    TreeBuilder::new(config).build(Arc::new(dataset))
}

fn at(year: i32, month: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .expect("valid instant")
}

/// Viewport at `level` showing `days` around `centre`.
fn window(config: &EngineConfig, level: f64, centre: DateTime<Utc>, days: f64) -> ViewportController {
    let mut vc = ViewportController::new(config.zoom.clone(), at(2004, 1), 1.0);
    vc.set_zoom_level(level);
    vc.set_viewport_width(days * vc.state().pixels_per_day());
    vc.center_on(centre);
    vc
}

#[test]
fn year_tier_two_year_window_over_ten_thousand_events() {
    let config = EngineConfig::default();
    let tree = corpus_tree(&config, 10_000, 20, 2024);
    assert_eq!(tree.event_count(), 10_000);

    let vc = window(&config, 0.1, at(2014, 6), 730.0);
    assert_eq!(vc.state().zoom_tier(), ZoomTier::Year);

    let mut agg = Aggregator::new(&config, Arc::new(NoRebuild));
    let started = Instant::now();
    let out = agg.compute_visible_nodes(vc.state(), &tree, DataVersion::new(1));
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(250), "took {elapsed:?}");
    assert_eq!(out.tier, ZoomTier::Year);
    assert!(!out.nodes.is_empty());
    let overlapping = tree.level(ZoomTier::Year).overlapping(&out.range).len();
    assert!(out.nodes.len() <= overlapping, "{} > {overlapping}", out.nodes.len());
}

#[test]
fn repeated_call_hits_cache_and_matches() {
    let config = EngineConfig::default();
    let tree = corpus_tree(&config, 2_000, 5, 11);
    let vc = window(&config, 0.5, at(2006, 3), 60.0);
    let mut agg = Aggregator::new(&config, Arc::new(NoRebuild));

    let first = agg.compute_visible_nodes(vc.state(), &tree, DataVersion::new(1));
    let second = agg.compute_visible_nodes(vc.state(), &tree, DataVersion::new(1));
    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.nodes, second.nodes);
    assert!(Arc::ptr_eq(&first.nodes, &second.nodes));
}

#[test]
fn expanding_just_below_a_breakpoint_keeps_the_tier() {
    let config = EngineConfig::default();
    let tree = corpus_tree(&config, 3_000, 6, 3);
    let centre = at(2006, 6);
    let mut vc = window(&config, 0.39, centre, 365.0);
    assert_eq!(vc.state().zoom_tier(), ZoomTier::Month);
    let mut agg = Aggregator::new(&config, Arc::new(NoRebuild));

    let before = agg.compute_visible_nodes(vc.state(), &tree, DataVersion::new(1));
    let target = before
        .nodes
        .iter()
        .filter_map(RenderNode::as_cluster)
        .filter_map(|node| tree.cluster(&node.id))
        .filter(|cluster| cluster.children.len() > 1)
        .min_by_key(|cluster| (cluster.centroid_instant - centre).num_seconds().abs())
        .expect("a visible month cluster with several weeks")
        .clone();

    assert!(vc.toggle_cluster(target.id.clone()));
    assert_eq!(vc.state().zoom_tier(), ZoomTier::Month);
    let expanded = agg.compute_visible_nodes(vc.state(), &tree, DataVersion::new(1));
    assert_eq!(expanded.tier, ZoomTier::Month);

    let ids: HashSet<&str> = expanded.nodes.iter().map(RenderNode::id).collect();
    assert!(!ids.contains(target.id.as_str()));
    for child in tree.children(&target) {
        let expected = if child.is_singleton() {
            child.members[0].as_str()
        } else {
            child.id.as_str()
        };
        assert!(ids.contains(expected), "missing child {expected}");
    }
    let flagged: usize = expanded
        .nodes
        .iter()
        .filter(|n| n.expanded())
        .map(RenderNode::weight)
        .sum();
    assert_eq!(flagged, target.len());

    // Collapsing does not move the zoom, so the same range is selected and
    // the target comes back in place of its children.
    assert!(!vc.toggle_cluster(target.id.clone()));
    let collapsed = agg.compute_visible_nodes(vc.state(), &tree, DataVersion::new(1));
    assert_eq!(collapsed.tier, ZoomTier::Month);
    assert_eq!(collapsed.range, expanded.range);
    assert!(collapsed.nodes.iter().any(|n| n.id() == target.id.as_str()));
    assert!(collapsed.nodes.iter().all(|n| !n.expanded()));
    assert_eq!(collapsed.represented_events(), expanded.represented_events());
}

#[test]
fn timeline_serves_corpus_end_to_end() {
    let config = EngineConfig::default();
    let mut timeline = Timeline::new(&config, 1_200.0).expect("timeline");
    let events = generate(&CorpusConfig::sized(1_500, 4, 77));

    let report = timeline.update_events(events, DataVersion::new(1));
    assert!(report.is_clean(), "{:?}", report.rejected);
    assert!(timeline.wait_until_current(Duration::from_secs(30)));

    let overview = timeline.visible_nodes();
    assert!(!overview.stale);
    assert_eq!(overview.represented_events(), 1_500);

    timeline.set_zoom_level(0.7);
    let close = timeline.visible_nodes();
    assert_eq!(close.tier, ZoomTier::Day);
    assert!(close.represented_events() <= 1_500);

    let json = serde_json::to_value(close.nodes.as_ref()).expect("serialize");
    assert!(json.is_array());
}
