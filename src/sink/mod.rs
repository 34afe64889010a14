//! Persistence backends for collected data.

pub mod csv;
pub mod store;

use std::path::PathBuf;

/// Where a session persists its data.
#[derive(Debug, Clone)]
pub enum SinkConfig {
    /// One CSV file per sampler under `dir`, written by each sampler at stop.
    Files { dir: PathBuf },
    /// A SQLite database; all samplers are drained into it at stop, tagged
    /// with the run id.
    Database { path: PathBuf },
}
