//! Per-sampler flat-file output.
//!
//! One file per sampler: a `timestamp,metric` header, then one row per
//! summary point (raw samples are not written to files; use the store for
//! full data).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::PersistenceError;
use crate::measurement::{RawValue, Sample};

pub fn write_summary(path: &Path, summary: &[Sample]) -> Result<(), PersistenceError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "timestamp,metric")?;
    for sample in summary {
        let cell = metric_cell(&sample.value)?;
        writeln!(writer, "{},{}", sample.timestamp.as_epoch_secs(), cell)?;
    }
    writer.flush()?;
    Ok(())
}

/// Formats a summary value as one CSV cell.
///
/// Scalars are written as plain numbers; structured values are serialized
/// as compact JSON and quoted, since JSON contains commas.
fn metric_cell(value: &RawValue) -> Result<String, PersistenceError> {
    match value {
        RawValue::Scalar(v) => Ok(v.to_string()),
        other => Ok(quote(&serde_json::to_string(other)?)),
    }
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}
