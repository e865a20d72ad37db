//! `ll tree`: build the cluster tree for a snapshot and summarize each tier.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use lifeline_cluster::{Cluster, ClusterTree, NestingRepair, TierStats};
use lifeline_core::{EngineConfig, ZoomTier};

use super::{Rejection, load_tree};
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct TreeArgs {
    /// JSON snapshot produced by `ll synth` or an export.
    #[arg(long)]
    pub events: PathBuf,

    /// Also list the largest clusters of this tier.
    #[arg(long)]
    pub tier: Option<ZoomTier>,

    /// How many clusters to list with `--tier`.
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

#[derive(Debug, Serialize)]
struct ClusterSummary {
    id: String,
    size: usize,
    span: String,
    cluster_type: &'static str,
    burst: bool,
    confidence: f64,
}

impl ClusterSummary {
    fn from_cluster(cluster: &Cluster) -> Self {
        Self {
            id: cluster.id.to_string(),
            size: cluster.len(),
            span: cluster.span.to_string(),
            cluster_type: cluster.cluster_type.as_str(),
            burst: cluster.burst,
            confidence: cluster.confidence,
        }
    }
}

#[derive(Debug, Serialize)]
struct TreeReport<'a> {
    events: usize,
    fingerprint: &'a str,
    rejected: Vec<Rejection>,
    tiers: Vec<TierStats>,
    repairs: &'a [NestingRepair],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    largest: Vec<ClusterSummary>,
}

fn largest(tree: &ClusterTree, tier: ZoomTier, top: usize) -> Vec<ClusterSummary> {
    let mut clusters: Vec<&Cluster> = tree.clusters(tier).iter().collect();
    clusters.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.id.cmp(&b.id)));
    clusters
        .into_iter()
        .take(top)
        .map(ClusterSummary::from_cluster)
        .collect()
}

/// Execute `ll tree`.
pub fn run_tree(args: &TreeArgs, output: OutputMode, config: &EngineConfig) -> anyhow::Result<()> {
    let (tree, rejected) = load_tree(&args.events, config, output)?;
    let report = TreeReport {
        events: tree.event_count(),
        fingerprint: tree.fingerprint(),
        rejected,
        tiers: tree.stats(),
        repairs: tree.repairs(),
        largest: args
            .tier
            .map(|tier| largest(&tree, tier, args.top))
            .unwrap_or_default(),
    };

    render_mode(
        output,
        &report,
        |r, w| {
            writeln!(w, "tier\tclusters\tbursts\tsingletons\tlargest\trepairs")?;
            for t in &r.tiers {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    t.tier, t.clusters, t.bursts, t.singletons, t.largest, t.repairs
                )?;
            }
            for c in &r.largest {
                writeln!(w, "{}\t{}\t{}\t{}", c.id, c.size, c.cluster_type, c.span)?;
            }
            Ok(())
        },
        |r, w| {
            pretty_section(w, "Cluster tree")?;
            pretty_kv(w, "Events", r.events.to_string())?;
            pretty_kv(w, "Rejected", r.rejected.len().to_string())?;
            pretty_kv(w, "Fingerprint", r.fingerprint)?;
            writeln!(w)?;
            writeln!(
                w,
                "{:<6} {:>9} {:>7} {:>10} {:>8} {:>8}  types",
                "tier", "clusters", "bursts", "singletons", "largest", "repairs"
            )?;
            for t in &r.tiers {
                let types: Vec<String> = t.by_type.iter().map(|(k, v)| format!("{k}={v}")).collect();
                writeln!(
                    w,
                    "{:<6} {:>9} {:>7} {:>10} {:>8} {:>8}  {}",
                    t.tier.as_str(),
                    t.clusters,
                    t.bursts,
                    t.singletons,
                    t.largest,
                    t.repairs,
                    types.join(" ")
                )?;
            }
            if !r.repairs.is_empty() {
                writeln!(w)?;
                pretty_section(w, "Nesting repairs")?;
                for repair in r.repairs {
                    writeln!(
                        w,
                        "{}: moved {} event(s) from {} into {}",
                        repair.tier,
                        repair.moved.len(),
                        repair.kept_parent,
                        repair.moved_to
                    )?;
                }
            }
            if !r.largest.is_empty() {
                writeln!(w)?;
                pretty_section(w, "Largest clusters")?;
                for c in &r.largest {
                    let burst = if c.burst { " burst" } else { "" };
                    writeln!(
                        w,
                        "{:<22} {:>6}  {:<8} {}{burst}",
                        c.id, c.size, c.cluster_type, c.span
                    )?;
                }
            }
            Ok(())
        },
    )
}
