//! ecmon, a benchmarking telemetry toolkit.
//!
//! Samples energy and CPU-related metrics while a workload runs, derives
//! summary metrics from the raw samples, and persists everything for later
//! analysis.
//!
//! The pieces:
//! - [`sources`]: single-shot readers of raw values (CPU times, per-core
//!   frequencies, RAPL energy counters, wall clock);
//! - [`sampler`]: the generic sampling engine, combining periodic or
//!   edge-triggered collection with a derivation strategy and two
//!   append-only logs;
//! - [`session`]: the coordinator that builds samplers from a [`Config`],
//!   runs them for the duration of one run, and drains them into a sink;
//! - [`sink`]: per-sampler CSV files, or a SQLite store with run, raw-sample
//!   and summary tables.
//!
//! # Example
//! ```no_run
//! use ecmon::{Config, Coordinator, SinkConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::from_file("ecmon.toml")?;
//! let mut session = Coordinator::build(&config, SinkConfig::Database { path: "runs.sqlite".into() })?;
//! session.start_all()?;
//! // ... run the workload under measurement ...
//! session.stop_all()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod measurement;
pub mod sampler;
pub mod session;
pub mod sink;
pub mod sources;

pub use config::Config;
pub use session::Coordinator;
pub use sink::SinkConfig;
