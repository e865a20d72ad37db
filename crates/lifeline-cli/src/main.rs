#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use lifeline_core::EngineConfig;
use lifeline_core::config::{load_config_file, load_engine_config};
use lifeline_core::timing;
use output::{OutputMode, resolve_output_mode};
use std::env;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "ll: multi-resolution timeline clustering",
    long_about = None
)]
struct Cli {
    /// Emit command timing report to stderr.
    #[arg(long, global = true)]
    timing: bool,

    /// Emit JSON output (shorthand for `--format json`).
    #[arg(long, global = true)]
    json: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Engine configuration file; defaults to `.lifeline/config.toml`, then
    /// the user config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }

    fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        match &self.config {
            Some(path) => load_config_file(path),
            None => load_engine_config(&env::current_dir()?),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Generate a synthetic event snapshot",
        after_help = "EXAMPLES:\n    # 10k events over 20 years\n    ll synth --count 10000 --years 20 -o events.json"
    )]
    Synth(cmd::synth::SynthArgs),

    #[command(
        about = "Build the cluster tree and summarize each tier",
        after_help = "EXAMPLES:\n    ll tree --events events.json\n\n    # Largest month clusters\n    ll tree --events events.json --tier month --top 5"
    )]
    Tree(cmd::tree::TreeArgs),

    #[command(
        about = "Print the render nodes for a viewport",
        after_help = "EXAMPLES:\n    ll nodes --events events.json --zoom 0.3 --start 2014-01\n\n    # Expand a cluster in place\n    ll nodes --events events.json --zoom 0.1 --expand year-0123456789ab"
    )]
    Nodes(cmd::nodes::NodesArgs),

    #[command(
        about = "Verify cluster tree invariants",
        after_help = "EXAMPLES:\n    ll check --events events.json\n\n    # Fail on rejected events as well\n    ll check --events events.json --strict --json"
    )]
    Check(cmd::check::CheckArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LIFELINE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "lifeline=debug,info"
        } else {
            "lifeline=info,warn"
        })
    });

    let format = env::var("LIFELINE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let timing_enabled = cli.timing || timing::timing_enabled_from_env();
    timing::set_timing_enabled(timing_enabled);
    timing::clear_timings();

    let output = cli.output_mode();
    let config = cli.engine_config()?;
    debug!(?output, "configuration loaded");

    let command_result = match &cli.command {
        Commands::Synth(args) => timing::timed("cmd.synth", || cmd::synth::run_synth(args, output)),
        Commands::Tree(args) => {
            timing::timed("cmd.tree", || cmd::tree::run_tree(args, output, &config))
        }
        Commands::Nodes(args) => {
            timing::timed("cmd.nodes", || cmd::nodes::run_nodes(args, output, &config))
        }
        Commands::Check(args) => {
            timing::timed("cmd.check", || cmd::check::run_check(args, output, &config))
        }
    };

    if timing_enabled {
        let report = timing::collect_report();
        if report.is_empty() {
            eprintln!("timing report: no samples recorded");
        } else {
            eprintln!("timing report:");
            eprintln!("{}", report.display_table());
            eprintln!("timing report (json):");
            eprintln!("{}", serde_json::to_string_pretty(&report.to_json())?);
        }
    }

    command_result
}
