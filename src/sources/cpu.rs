//! CPU time snapshots from the kernel statistics file.
//!
//! The values are cumulative times spent in each state, in USER_HZ ticks.
//! The unit cancels out in the percentage breakdown, so no conversion is
//! applied.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use indexmap::IndexMap;

use super::MetricSource;
use crate::measurement::RawValue;

pub const PROC_STAT_PATH: &str = "/proc/stat";

/// Time-in-state field names, in `/proc/stat` column order.
///
/// Later columns (guest, guest_nice) are aggregated into user/nice by the
/// kernel already and are ignored.
const CPU_TIME_FIELDS: [&str; 8] = ["user", "nice", "system", "idle", "iowait", "irq", "softirq", "steal"];

/// System-wide CPU times, as one map of named accumulators.
pub struct CpuTotalSource {
    path: PathBuf,
}

impl CpuTotalSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetricSource for CpuTotalSource {
    fn read(&mut self) -> anyhow::Result<RawValue> {
        let snapshot = read_stat(&self.path)?;
        Ok(RawValue::Fields(snapshot.total))
    }
}

/// Per-core CPU times, one map of accumulators per core, in core order.
pub struct CpuPerCoreSource {
    path: PathBuf,
}

impl CpuPerCoreSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetricSource for CpuPerCoreSource {
    fn read(&mut self) -> anyhow::Result<RawValue> {
        let snapshot = read_stat(&self.path)?;
        if snapshot.per_core.is_empty() {
            bail!("no per-core cpu lines in {}", self.path.display());
        }
        Ok(RawValue::Groups(snapshot.per_core))
    }
}

struct StatSnapshot {
    total: IndexMap<String, f64>,
    per_core: Vec<IndexMap<String, f64>>,
}

fn read_stat(path: &Path) -> anyhow::Result<StatSnapshot> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("could not read {}", path.display()))?;
    parse_stat(&content).with_context(|| format!("could not parse {}", path.display()))
}

fn parse_stat(content: &str) -> anyhow::Result<StatSnapshot> {
    let mut total = None;
    let mut per_core = Vec::new();

    for line in content.lines() {
        let mut columns = line.split_ascii_whitespace();
        let Some(label) = columns.next() else { continue };
        if label == "cpu" {
            total = Some(parse_cpu_times(columns)?);
        } else if let Some(id) = label.strip_prefix("cpu") {
            if id.chars().all(|c| c.is_ascii_digit()) {
                // The kernel lists cores in index order; keep that order so
                // groups align positionally between snapshots.
                per_core.push(parse_cpu_times(columns)?);
            }
        }
        // everything after the cpu lines (intr, ctxt, ...) is irrelevant
    }

    match total {
        Some(total) => Ok(StatSnapshot { total, per_core }),
        None => bail!("no aggregated cpu line"),
    }
}

fn parse_cpu_times<'a>(columns: impl Iterator<Item = &'a str>) -> anyhow::Result<IndexMap<String, f64>> {
    let mut times = IndexMap::with_capacity(CPU_TIME_FIELDS.len());
    for (name, column) in CPU_TIME_FIELDS.iter().zip(columns) {
        let ticks: u64 = column.parse().with_context(|| format!("bad value for {name}: '{column}'"))?;
        times.insert(name.to_string(), ticks as f64);
    }
    if times.len() < 4 {
        bail!("expected at least user/nice/system/idle, got {} columns", times.len());
    }
    Ok(times)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const STAT: &str = indoc! {"
        cpu  6334 42 2290 238792 1221 0 131 0 0 0
        cpu0 3045 20 1001 119002 600 0 100 0 0 0
        cpu1 3289 22 1289 119790 621 0 31 0 0 0
        intr 114930 33 10 0 0
        ctxt 1990473
        btime 1696156000
    "};

    fn stat_file(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn total_source_reads_fields() {
        let f = stat_file(STAT);
        let mut source = CpuTotalSource::new(f.path());
        let RawValue::Fields(total) = source.read().unwrap() else {
            panic!("expected fields");
        };
        assert_eq!(total["user"], 6334.0);
        assert_eq!(total["idle"], 238792.0);
        assert_eq!(total["steal"], 0.0);
        assert_eq!(total.len(), 8);
        // insertion order follows the /proc/stat column order
        let keys: Vec<&str> = total.keys().map(String::as_str).collect();
        assert_eq!(keys, CPU_TIME_FIELDS.to_vec());
    }

    #[test]
    fn per_core_source_reads_groups_in_core_order() {
        let f = stat_file(STAT);
        let mut source = CpuPerCoreSource::new(f.path());
        let RawValue::Groups(cores) = source.read().unwrap() else {
            panic!("expected groups");
        };
        assert_eq!(cores.len(), 2);
        assert_eq!(cores[0]["user"], 3045.0);
        assert_eq!(cores[1]["user"], 3289.0);
    }

    #[test]
    fn short_cpu_line_is_rejected() {
        let f = stat_file("cpu 1 2 3\n");
        let mut source = CpuTotalSource::new(f.path());
        assert!(source.read().is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let mut source = CpuTotalSource::new("/proc/does-not-exist/stat");
        assert!(source.read().is_err());
    }

    #[test]
    fn missing_aggregate_line_is_rejected() {
        let f = stat_file("cpu0 1 2 3 4\n");
        let mut source = CpuTotalSource::new(f.path());
        assert!(source.read().is_err());
    }
}
