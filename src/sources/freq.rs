//! Per-core CPU frequency reads from the cpufreq sysfs interface.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};

use super::MetricSource;
use crate::measurement::RawValue;

pub const CPUFREQ_ROOT: &str = "/sys/devices/system/cpu";

/// Reads `scaling_cur_freq` (kHz) for every core, in core index order.
///
/// A core directory without a readable `scaling_cur_freq` (offline core, or
/// a machine without cpufreq support) fails the whole read: a partial list
/// would silently shift the per-core alignment between samples.
pub struct CpuFreqSource {
    root: PathBuf,
}

impl CpuFreqSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl MetricSource for CpuFreqSource {
    fn read(&mut self) -> anyhow::Result<RawValue> {
        let cores = list_cores(&self.root)?;
        if cores.is_empty() {
            bail!("no cpu directories under {}", self.root.display());
        }
        let mut frequencies = Vec::with_capacity(cores.len());
        for (id, path) in cores {
            let freq_path = path.join("cpufreq").join("scaling_cur_freq");
            let khz = read_khz(&freq_path).with_context(|| format!("cpu{id} frequency unavailable"))?;
            frequencies.push(khz);
        }
        Ok(RawValue::Series(frequencies))
    }
}

/// Lists `cpu<N>` directories under `root`, sorted by core index (numeric,
/// so that cpu10 comes after cpu2).
fn list_cores(root: &Path) -> anyhow::Result<Vec<(u32, PathBuf)>> {
    let entries = std::fs::read_dir(root).with_context(|| format!("could not list {}", root.display()))?;
    let mut cores = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(id) = name.to_string_lossy().strip_prefix("cpu").and_then(|s| s.parse::<u32>().ok()) else {
            continue; // cpufreq, cpuidle, possible_cpus, ...
        };
        cores.push((id, entry.path()));
    }
    cores.sort_by_key(|(id, _)| *id);
    Ok(cores)
}

fn read_khz(path: &Path) -> anyhow::Result<f64> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("could not read {}", path.display()))?;
    let khz: u64 = content
        .trim_end()
        .parse()
        .with_context(|| format!("could not parse {}: '{}'", path.display(), content.trim_end()))?;
    Ok(khz as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn add_core(root: &Path, id: u32, khz: Option<&str>) {
        let cpufreq = root.join(format!("cpu{id}")).join("cpufreq");
        std::fs::create_dir_all(&cpufreq).unwrap();
        if let Some(khz) = khz {
            std::fs::write(cpufreq.join("scaling_cur_freq"), khz).unwrap();
        }
    }

    #[test]
    fn reads_all_cores_in_numeric_order() {
        let tmp = tempdir().unwrap();
        // create out of order, with a two-digit core to catch lexical sorting
        add_core(tmp.path(), 10, Some("1000000\n"));
        add_core(tmp.path(), 0, Some("2400000\n"));
        add_core(tmp.path(), 2, Some("1700000\n"));
        std::fs::create_dir(tmp.path().join("cpuidle")).unwrap(); // must be ignored

        let mut source = CpuFreqSource::new(tmp.path());
        let value = source.read().unwrap();
        assert_eq!(value, RawValue::Series(vec![2400000.0, 1700000.0, 1000000.0]));
    }

    #[test]
    fn offline_core_fails_the_read() {
        let tmp = tempdir().unwrap();
        add_core(tmp.path(), 0, Some("2400000\n"));
        add_core(tmp.path(), 1, None); // no scaling_cur_freq

        let mut source = CpuFreqSource::new(tmp.path());
        let err = source.read().unwrap_err();
        assert!(err.to_string().contains("cpu1"), "unexpected error: {err:#}");
    }

    #[test]
    fn empty_root_is_an_error() {
        let tmp = tempdir().unwrap();
        let mut source = CpuFreqSource::new(tmp.path());
        assert!(source.read().is_err());
    }

    #[test]
    fn garbage_content_is_an_error() {
        let tmp = tempdir().unwrap();
        add_core(tmp.path(), 0, Some("fast\n"));
        let mut source = CpuFreqSource::new(tmp.path());
        assert!(source.read().is_err());
    }
}
