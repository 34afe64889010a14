//! Configuration of a measurement session.
//!
//! The configuration maps metric type names to a list of logger entries.
//! A type name that the toolkit does not know is skipped, not rejected, so
//! that one configuration file can be shared between toolkit versions.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Session configuration.
///
/// # Example (TOML)
/// ```toml
/// interval = 1.0
///
/// [loggers]
/// execution_time = [{ enabled = true, mode = "edge" }]
/// rapl = [{ enabled = true, mode = "interval" }, { enabled = true, mode = "edge" }]
/// cpu_total = [{ enabled = true, mode = "interval" }]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default sampling interval in seconds, for entries that do not set
    /// their own.
    pub interval: f64,

    /// Logger entries, keyed by metric type name.
    pub loggers: IndexMap<String, Vec<LoggerEntry>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: 1.0,
            loggers: IndexMap::new(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Config> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).with_context(|| format!("could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid configuration in {}", path.display()))
    }
}

/// One logger entry: a sampler to create for the enclosing metric type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggerEntry {
    pub enabled: bool,
    pub mode: Mode,
    /// Sampling interval in seconds; falls back to [`Config::interval`].
    /// Ignored in edge mode.
    pub interval: Option<f64>,
    /// What to do when a periodic collection fails.
    pub on_error: TickErrorPolicy,
}

impl Default for LoggerEntry {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: Mode::Interval,
            interval: None,
            on_error: TickErrorPolicy::Skip,
        }
    }
}

/// Collection mode of a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Collect periodically, from start to stop.
    Interval,
    /// Collect exactly at session start and stop.
    Edge,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Interval => f.write_str("interval"),
            Mode::Edge => f.write_str("edge"),
        }
    }
}

/// Policy applied when a periodic collection fails.
///
/// There is deliberately no policy that substitutes a fabricated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickErrorPolicy {
    /// Log the error and keep scheduling ticks.
    Skip,
    /// Record the error and stop the sampler.
    Abort,
}
