//! `ll synth`: write a seeded synthetic event snapshot.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use serde::Serialize;

use lifeline_core::RawEvent;
use lifeline_sim::{CorpusConfig, generate};

use crate::output::{OutputMode, pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Number of events to generate.
    #[arg(long, default_value_t = 1_000)]
    pub count: usize,

    /// Years covered, starting in 2004.
    #[arg(long, default_value_t = 20)]
    pub years: u32,

    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Write the snapshot here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SynthSummary {
    path: String,
    events: usize,
    fuzzy: usize,
    located: usize,
    seed: u64,
}

/// Execute `ll synth`.
pub fn run_synth(args: &SynthArgs, output: OutputMode) -> anyhow::Result<()> {
    let events = generate(&CorpusConfig::sized(args.count, args.years, args.seed));
    let raw: Vec<RawEvent> = events.iter().map(RawEvent::from).collect();

    let Some(path) = &args.output else {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, &raw)?;
        writeln!(out)?;
        return Ok(());
    };

    let json = serde_json::to_string_pretty(&raw)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;

    let summary = SynthSummary {
        path: path.display().to_string(),
        events: raw.len(),
        fuzzy: events.iter().filter(|e| e.instant.is_fuzzy()).count(),
        located: events.iter().filter(|e| e.location.is_some()).count(),
        seed: args.seed,
    };
    render_mode(
        output,
        &summary,
        |s, w| writeln!(w, "{}\t{}\t{}\t{}", s.path, s.events, s.fuzzy, s.located),
        |s, w| {
            pretty_kv(w, "Wrote", &s.path)?;
            pretty_kv(w, "Events", s.events.to_string())?;
            pretty_kv(w, "Fuzzy dates", s.fuzzy.to_string())?;
            pretty_kv(w, "Located", s.located.to_string())?;
            pretty_kv(w, "Seed", s.seed.to_string())
        },
    )
}
