//! `ll nodes`: print the render nodes a viewport would show.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;

use lifeline_cluster::ClusterId;
use lifeline_core::{EngineConfig, EventInstant, Normalizer, TimeRange, ZoomTier, parse_instant};
use lifeline_view::{Aggregator, NoRebuild, RenderNode, ViewportController};

use super::load_tree;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct NodesArgs {
    #[arg(long)]
    pub events: PathBuf,

    /// Zoom level in [0, 1].
    #[arg(long, default_value_t = 0.0)]
    pub zoom: f64,

    /// Left edge of the viewport (RFC 3339 or a fuzzy date such as
    /// `2014-06` or `summer 2019`). Defaults to the earliest event.
    #[arg(long)]
    pub start: Option<String>,

    /// Viewport width in pixels.
    #[arg(long, default_value_t = 1_200.0)]
    pub width: f64,

    /// Cluster ids to expand; repeatable.
    #[arg(long = "expand")]
    pub expand: Vec<String>,
}

#[derive(Debug, Serialize)]
struct NodesReport {
    zoom_level: f64,
    tier: ZoomTier,
    pixels_per_day: f64,
    visible: TimeRange,
    selected: TimeRange,
    represented_events: usize,
    nodes: Vec<RenderNode>,
}

fn resolve_start(raw: &str, normalizer: &Normalizer) -> anyhow::Result<DateTime<Utc>> {
    let instant = parse_instant(raw).with_context(|| format!("Invalid --start value '{raw}'"))?;
    match instant {
        EventInstant::Precise(at) => Ok(at),
        EventInstant::Fuzzy(date) => date
            .comparison_range(normalizer.seasons())
            .map(|range| range.start)
            .with_context(|| format!("Invalid --start value '{raw}'")),
    }
}

/// Execute `ll nodes`.
pub fn run_nodes(args: &NodesArgs, output: OutputMode, config: &EngineConfig) -> anyhow::Result<()> {
    let (tree, _rejected) = load_tree(&args.events, config, output)?;
    let normalizer = Normalizer::new(config.seasons);
    let origin = tree
        .dataset()
        .time_bounds()
        .map_or_else(DateTime::<Utc>::default, |bounds| bounds.start);

    let mut viewport = ViewportController::new(config.zoom.clone(), origin, args.width);
    viewport.set_zoom_level(args.zoom);
    for id in &args.expand {
        viewport.toggle_cluster(ClusterId::from(id.as_str()));
    }
    if let Some(raw) = &args.start {
        let start = resolve_start(raw, &normalizer)?;
        let delta = viewport.state().x_of(start) - viewport.state().viewport_start_px();
        viewport.pan(delta);
    }

    let mut aggregator = Aggregator::new(config, Arc::new(NoRebuild));
    let visible = aggregator.compute_visible_nodes(viewport.state(), &tree, tree.version());
    let state = viewport.state();
    let report = NodesReport {
        zoom_level: state.zoom_level(),
        tier: visible.tier,
        pixels_per_day: state.pixels_per_day(),
        visible: state.visible_range(),
        selected: visible.range,
        represented_events: visible.represented_events(),
        nodes: visible.nodes.to_vec(),
    };

    render_mode(
        output,
        &report,
        |r, w| {
            for node in &r.nodes {
                write_row(node, w)?;
            }
            Ok(())
        },
        |r, w| {
            pretty_section(w, "Viewport")?;
            pretty_kv(w, "Zoom", format!("{:.2} ({})", r.zoom_level, r.tier))?;
            pretty_kv(w, "Px per day", format!("{:.4}", r.pixels_per_day))?;
            pretty_kv(w, "Visible", r.visible.to_string())?;
            pretty_kv(w, "Selected", r.selected.to_string())?;
            pretty_kv(w, "Nodes", format!("{} ({} events)", r.nodes.len(), r.represented_events))?;
            writeln!(w)?;
            for node in &r.nodes {
                write_pretty(node, w)?;
            }
            Ok(())
        },
    )
}

fn write_row(node: &RenderNode, w: &mut dyn Write) -> std::io::Result<()> {
    let kind = match node {
        RenderNode::Event(_) => "event",
        RenderNode::Cluster(_) => "cluster",
    };
    writeln!(
        w,
        "{kind}\t{}\t{}\t{}\t{:.1}\t{:.1}",
        node.id(),
        node.display_instant().format("%Y-%m-%dT%H:%M:%SZ"),
        node.weight(),
        node.geometry().x_px,
        node.geometry().width_px
    )
}

fn write_pretty(node: &RenderNode, w: &mut dyn Write) -> std::io::Result<()> {
    let marker = if node.expanded() { "  " } else { "" };
    match node {
        RenderNode::Event(e) => writeln!(
            w,
            "{marker}{}  {:<20} {}{}",
            e.display_instant.format("%Y-%m-%d %H:%M"),
            e.id,
            e.kind,
            if e.private { " (private)" } else { "" }
        ),
        RenderNode::Cluster(c) => {
            let burst = if c.burst { " burst" } else { "" };
            writeln!(
                w,
                "{marker}{}  {:<20} {} events, {} {}{burst}",
                c.display_instant.format("%Y-%m-%d %H:%M"),
                c.id,
                c.weight,
                c.cluster_type.as_str(),
                c.span
            )
        }
    }
}
