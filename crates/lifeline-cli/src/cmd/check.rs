//! `ll check`: verify cluster tree invariants for a snapshot.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use lifeline_cluster::{Violation, verify_tree};
use lifeline_core::{EngineConfig, ErrorCode};

use super::{Rejection, load_tree};
use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_error, render_mode};

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[arg(long)]
    pub events: PathBuf,

    /// Treat rejected events as a failure too.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    ok: bool,
    events: usize,
    repairs: usize,
    rejected: Vec<Rejection>,
    violations: Vec<Violation>,
}

/// Execute `ll check`. Fails when any invariant is violated.
pub fn run_check(args: &CheckArgs, output: OutputMode, config: &EngineConfig) -> anyhow::Result<()> {
    let (tree, rejected) = load_tree(&args.events, config, output)?;
    let violations = verify_tree(&tree);
    let failed = !violations.is_empty() || (args.strict && !rejected.is_empty());

    let report = CheckReport {
        ok: !failed,
        events: tree.event_count(),
        repairs: tree.repairs().len(),
        rejected,
        violations,
    };

    render_mode(
        output,
        &report,
        |r, w| {
            for v in &r.violations {
                writeln!(w, "violation\t{v}")?;
            }
            for rej in &r.rejected {
                writeln!(w, "rejected\t{}\t{}\t{}", rej.id, rej.code, rej.reason)?;
            }
            writeln!(w, "{}", if r.ok { "ok" } else { "failed" })
        },
        |r, w| {
            pretty_section(w, "Tree check")?;
            pretty_kv(w, "Events", r.events.to_string())?;
            pretty_kv(w, "Repairs", r.repairs.to_string())?;
            pretty_kv(w, "Rejected", r.rejected.len().to_string())?;
            pretty_kv(w, "Violations", r.violations.len().to_string())?;
            for v in &r.violations {
                writeln!(w, "  - {v}")?;
            }
            writeln!(w)?;
            writeln!(w, "{}", if r.ok { "✓ tree is consistent" } else { "✗ tree check failed" })
        },
    )?;

    if failed {
        if !report.violations.is_empty() {
            render_error(
                output,
                &CliError::coded(
                    ErrorCode::NestingViolation,
                    format!("{} tree invariant violation(s)", report.violations.len()),
                ),
            )?;
        }
        anyhow::bail!("tree check failed");
    }
    Ok(())
}
