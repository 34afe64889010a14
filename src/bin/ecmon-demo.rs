//! Demo: measure a dummy CPU-bound workload.
//!
//! Runs a spin loop under a measurement session and writes the collected
//! data to CSV files (default) or a SQLite database (`--database`).

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use ecmon::config::LoggerEntry;
use ecmon::{Config, Coordinator, SinkConfig};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Path to a TOML configuration file. Without it, a default set of
    /// loggers is used.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory receiving one CSV file per sampler.
    #[arg(long, default_value = "ecmon-logs")]
    output_dir: PathBuf,

    /// Persist into this SQLite database instead of CSV files.
    #[arg(long)]
    database: Option<PathBuf>,

    /// How long the dummy workload runs, in seconds.
    #[arg(long, default_value_t = 2.5)]
    duration: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => default_config(),
    };
    let sink = match &cli.database {
        Some(path) => SinkConfig::Database { path: path.clone() },
        None => SinkConfig::Files {
            dir: cli.output_dir.clone(),
        },
    };

    let mut session = Coordinator::build(&config, sink)?;
    session.start_all()?;

    log::info!("running dummy workload for {:.1}s...", cli.duration);
    busy_loop(Duration::from_secs_f64(cli.duration));

    session.stop_all()?;

    match &cli.database {
        Some(path) => log::info!("done, data stored in {}", path.display()),
        None => log::info!("done, logs written to {}", cli.output_dir.display()),
    }
    Ok(())
}

/// A workload that keeps one core busy.
fn busy_loop(duration: Duration) {
    let start = Instant::now();
    let mut x = 0u64;
    while start.elapsed() < duration {
        x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        std::hint::black_box(x);
    }
}

/// The default demo setup: wall time over the whole run, energy and CPU
/// usage sampled every second, per-core frequencies as instantaneous reads.
fn default_config() -> Config {
    let mut config = Config {
        interval: 1.0,
        ..Config::default()
    };
    config.loggers.insert(
        "execution_time".to_string(),
        vec![LoggerEntry {
            enabled: true,
            mode: ecmon::config::Mode::Edge,
            ..LoggerEntry::default()
        }],
    );
    for name in ["rapl", "cpu_total", "freq_per_core"] {
        config.loggers.insert(
            name.to_string(),
            vec![LoggerEntry {
                enabled: true,
                ..LoggerEntry::default()
            }],
        );
    }
    config
}
