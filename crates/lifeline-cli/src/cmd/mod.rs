pub mod check;
pub mod nodes;
pub mod synth;
pub mod tree;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use serde::Serialize;
use tracing::{info, warn};

use lifeline_cluster::{ClusterTree, TreeBuilder};
use lifeline_core::{DataVersion, Dataset, EngineConfig, IngestReport, Normalizer, RawEvent};

use crate::output::{CliError, OutputMode, render_error};

/// Ingestion failure as reported by commands.
#[derive(Debug, Serialize)]
pub struct Rejection {
    pub id: String,
    pub code: &'static str,
    pub reason: String,
}

/// Read a JSON snapshot (an array of events) and build its tree.
pub fn load_tree(
    path: &Path,
    config: &EngineConfig,
    output: OutputMode,
) -> anyhow::Result<(ClusterTree, Vec<Rejection>)> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read events from {}", path.display()))?;
    let raw: Vec<RawEvent> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse events in {}", path.display()))?;

    let (dataset, report) = Dataset::ingest_raw(raw, DataVersion::new(1), &Normalizer::new(config.seasons));
    let rejected = rejections(&report);
    for rejection in &rejected {
        warn!(id = %rejection.id, code = rejection.code, reason = %rejection.reason, "event rejected");
    }
    if !rejected.is_empty() && !output.is_json() {
        render_error(
            output,
            &CliError::new(format!("{} event(s) rejected during ingestion", rejected.len())),
        )?;
    }
    info!(accepted = report.accepted, rejected = rejected.len(), "snapshot loaded");

    let tree = TreeBuilder::new(config).build(Arc::new(dataset));
    Ok((tree, rejected))
}

fn rejections(report: &IngestReport) -> Vec<Rejection> {
    report
        .rejected
        .iter()
        .map(|err| Rejection {
            id: err.event_id().to_string(),
            code: err.code().code(),
            reason: err.to_string(),
        })
        .collect()
}
