//! Relational store for runs, raw samples and summary metrics.
//!
//! One SQLite connection per coordinator; writes are serialized through it.
//! The drain of one sampler (raw + summary rows together) is a single
//! transaction: it either fully lands or is rolled back.

use std::path::Path;

use rusqlite::{Connection, Transaction, params};

use crate::error::PersistenceError;
use crate::measurement::{Sample, Timestamp};

pub type RunId = i64;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        start_time REAL,
        end_time REAL,
        config_json TEXT
    );
    CREATE TABLE IF NOT EXISTS samples (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id INTEGER,
        logger TEXT,
        timestamp REAL,
        key TEXT,
        value REAL,
        FOREIGN KEY(run_id) REFERENCES runs(id)
    );
    CREATE TABLE IF NOT EXISTS summary_metrics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id INTEGER,
        logger TEXT,
        timestamp REAL,
        key TEXT,
        value REAL,
        FOREIGN KEY(run_id) REFERENCES runs(id)
    );
";

/// A run row, as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: RunId,
    pub start_time: f64,
    pub end_time: Option<f64>,
    pub config_json: String,
}

/// One flattened metric row, as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub timestamp: f64,
    pub key: Option<String>,
    pub value: f64,
}

enum Table {
    Samples,
    SummaryMetrics,
}

impl Table {
    fn insert_sql(&self) -> &'static str {
        match self {
            Table::Samples => "INSERT INTO samples (run_id, logger, timestamp, key, value) VALUES (?1, ?2, ?3, ?4, ?5)",
            Table::SummaryMetrics => {
                "INSERT INTO summary_metrics (run_id, logger, timestamp, key, value) VALUES (?1, ?2, ?3, ?4, ?5)"
            }
        }
    }

    fn select_sql(&self) -> &'static str {
        match self {
            Table::Samples => {
                "SELECT timestamp, key, value FROM samples WHERE run_id = ?1 AND logger = ?2 ORDER BY id"
            }
            Table::SummaryMetrics => {
                "SELECT timestamp, key, value FROM summary_metrics WHERE run_id = ?1 AND logger = ?2 ORDER BY id"
            }
        }
    }
}

/// SQLite-backed persistence for measurement sessions.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (and initializes) the database at `path`, creating the parent
    /// directory if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory database. Used by tests.
    pub fn in_memory() -> Result<Self, PersistenceError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, PersistenceError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Inserts a new run row (with no end time yet) and returns its id.
    pub fn create_run(&self, start: Timestamp, config_json: &str) -> Result<RunId, PersistenceError> {
        self.conn.execute(
            "INSERT INTO runs (start_time, config_json) VALUES (?1, ?2)",
            params![start.as_epoch_secs(), config_json],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Sets the run's end time. The predicate guards against setting it
    /// twice; a second call leaves the row untouched.
    pub fn finalize_run(&self, run_id: RunId, end: Timestamp) -> Result<(), PersistenceError> {
        let changed = self.conn.execute(
            "UPDATE runs SET end_time = ?1 WHERE id = ?2 AND end_time IS NULL",
            params![end.as_epoch_secs(), run_id],
        )?;
        if changed == 0 {
            log::warn!("run {run_id} was already finalized");
        }
        Ok(())
    }

    /// Persists one sampler's raw and summary logs, atomically.
    pub fn drain_sampler(
        &mut self,
        run_id: RunId,
        logger: &str,
        raw: &[Sample],
        summary: &[Sample],
    ) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;
        insert_rows(&tx, Table::Samples, run_id, logger, raw)?;
        insert_rows(&tx, Table::SummaryMetrics, run_id, logger, summary)?;
        tx.commit()?;
        Ok(())
    }

    pub fn fetch_run(&self, run_id: RunId) -> Result<RunRecord, PersistenceError> {
        let record = self.conn.query_row(
            "SELECT id, start_time, end_time, config_json FROM runs WHERE id = ?1",
            params![run_id],
            |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    start_time: row.get(1)?,
                    end_time: row.get(2)?,
                    config_json: row.get(3)?,
                })
            },
        )?;
        Ok(record)
    }

    pub fn run_count(&self) -> Result<i64, PersistenceError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Raw rows of one sampler, in original insertion (collection) order.
    pub fn fetch_samples(&self, run_id: RunId, logger: &str) -> Result<Vec<MetricRow>, PersistenceError> {
        self.fetch_rows(Table::Samples, run_id, logger)
    }

    /// Summary rows of one sampler, in original insertion order.
    pub fn fetch_summary_metrics(&self, run_id: RunId, logger: &str) -> Result<Vec<MetricRow>, PersistenceError> {
        self.fetch_rows(Table::SummaryMetrics, run_id, logger)
    }

    fn fetch_rows(&self, table: Table, run_id: RunId, logger: &str) -> Result<Vec<MetricRow>, PersistenceError> {
        let mut stmt = self.conn.prepare(table.select_sql())?;
        let rows = stmt.query_map(params![run_id, logger], |row| {
            Ok(MetricRow {
                timestamp: row.get(0)?,
                key: row.get(1)?,
                value: row.get(2)?,
            })
        })?;
        let rows = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn insert_rows(
    tx: &Transaction<'_>,
    table: Table,
    run_id: RunId,
    logger: &str,
    samples: &[Sample],
) -> Result<(), PersistenceError> {
    if samples.is_empty() {
        return Ok(());
    }
    let mut stmt = tx.prepare(table.insert_sql())?;
    for sample in samples {
        for (key, value) in sample.value.flatten() {
            stmt.execute(params![run_id, logger, sample.timestamp.as_epoch_secs(), key, value])?;
        }
    }
    Ok(())
}
