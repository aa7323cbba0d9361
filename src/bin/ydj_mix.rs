//! ydj-mix - order a playlist for harmonic, tempo-aware mixing.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use ydj_mix_sequencer::{plan_mix, MixConfig, SolverStrategy, Track};

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Auto,
    Exact,
    Annealing,
}

impl From<Strategy> for SolverStrategy {
    fn from(s: Strategy) -> Self {
        match s {
            Strategy::Auto => SolverStrategy::Auto,
            Strategy::Exact => SolverStrategy::Exact,
            Strategy::Annealing => SolverStrategy::Annealing,
        }
    }
}

#[derive(Parser)]
#[command(name = "ydj-mix")]
#[command(version, about = "Order tracks by key compatibility and tempo", long_about = None)]
struct Args {
    /// JSON array of {"id", "bpm", "key"} objects
    tracks: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Annealing time budget in seconds
    #[arg(long, conflicts_with = "minutes")]
    seconds: Option<f64>,

    /// Annealing time budget in minutes
    #[arg(long)]
    minutes: Option<f64>,

    /// Solver selection
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Seed for reproducible annealing runs
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads (0 = all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Print the plan as JSON instead of a table
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MixConfig::load(path)?,
        None => MixConfig::default(),
    };
    if let Some(seconds) = args.seconds {
        config.annealing.time_budget_seconds = seconds;
    }
    if let Some(minutes) = args.minutes {
        config.annealing.time_budget_seconds = minutes * 60.0;
    }
    if let Some(strategy) = args.strategy {
        config.solver.strategy = strategy.into();
    }
    if args.seed.is_some() {
        config.annealing.seed = args.seed;
    }
    if let Some(threads) = args.threads {
        config.annealing.threads = threads;
    }

    let text = std::fs::read_to_string(&args.tracks)
        .with_context(|| format!("failed to read {}", args.tracks.display()))?;
    let tracks: Vec<Track> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", args.tracks.display()))?;
    tracing::info!(tracks = tracks.len(), path = %args.tracks.display(), "loaded playlist");

    let plan = plan_mix(&tracks, &config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", plan.table(&tracks));
    }
    Ok(())
}
