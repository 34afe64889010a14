//! Cumulative energy counter reads from the powercap sysfs interface.
//!
//! See https://www.kernel.org/doc/html/latest/power/powercap/powercap.html
//! for an explanation of the Power Capping framework.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::MetricSource;
use crate::measurement::RawValue;

/// Energy counter of the first package power zone.
pub const POWERCAP_ENERGY_PATH: &str = "/sys/class/powercap/intel-rapl:0/energy_uj";

const PERMISSION_ADVICE: &str = "reading RAPL counters usually requires read access to the powercap sysfs";

/// Reads the cumulative energy counter of one power zone, in microjoules.
///
/// The counter wraps around at the zone's `max_energy_range_uj`; downstream
/// deltas do not correct for this.
pub struct RaplEnergySource {
    path: PathBuf,
}

impl RaplEnergySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetricSource for RaplEnergySource {
    fn read(&mut self) -> anyhow::Result<RawValue> {
        let microjoules = read_energy_uj(&self.path)?;
        Ok(RawValue::Scalar(microjoules as f64))
    }
}

fn read_energy_uj(path: &Path) -> anyhow::Result<u64> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("could not read {} ({PERMISSION_ADVICE})", path.display()))?;
    content
        .trim_end()
        .parse()
        .with_context(|| format!("could not parse {}: '{}'", path.display(), content.trim_end()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_the_counter() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"124599532281\n").unwrap();

        let mut source = RaplEnergySource::new(f.path());
        assert_eq!(source.read().unwrap(), RawValue::Scalar(124599532281.0));
    }

    #[test]
    fn missing_zone_is_an_error() {
        let mut source = RaplEnergySource::new("/sys/class/powercap/does-not-exist/energy_uj");
        assert!(source.read().is_err());
    }

    #[test]
    fn garbage_content_is_an_error() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"not-a-counter\n").unwrap();

        let mut source = RaplEnergySource::new(f.path());
        assert!(source.read().is_err());
    }
}
