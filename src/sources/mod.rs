//! Metric sources: single-shot readers of raw measurement values.

pub mod cpu;
pub mod freq;
pub mod rapl;
pub mod wallclock;

use std::path::PathBuf;

use crate::measurement::RawValue;
use crate::sampler::DerivationStrategy;

/// Produces one raw measurement per invocation.
///
/// A failed read carries no partial value: either the whole value is
/// returned, or an error.
pub trait MetricSource: Send {
    fn read(&mut self) -> anyhow::Result<RawValue>;
}

/// Filesystem roots the built-in sources read from.
///
/// Tests point these at mock trees; production uses the defaults.
#[derive(Debug, Clone)]
pub struct SourceRoots {
    /// Path of the kernel CPU time statistics file.
    pub proc_stat: PathBuf,
    /// Directory containing the per-cpu subdirectories (`cpu0`, `cpu1`, ...).
    pub cpufreq_root: PathBuf,
    /// Path of the cumulative energy counter file.
    pub rapl_energy: PathBuf,
}

impl Default for SourceRoots {
    fn default() -> Self {
        Self {
            proc_stat: PathBuf::from(cpu::PROC_STAT_PATH),
            cpufreq_root: PathBuf::from(freq::CPUFREQ_ROOT),
            rapl_energy: PathBuf::from(rapl::POWERCAP_ENERGY_PATH),
        }
    }
}

/// Describes one metric type that the coordinator can build a sampler for.
///
/// The descriptor makes the per-type requirements explicit: whether the
/// type samples on an interval, and which strategy applies in each mode.
pub(crate) struct KindDescriptor {
    pub name: &'static str,
    /// `false` for edge-only types: a configured interval is ignored and
    /// the sampler is forced to edge mode.
    pub needs_interval: bool,
    /// Strategy in interval mode; `None` when the type is edge-only.
    pub interval_strategy: Option<DerivationStrategy>,
    /// Strategy applied once at stop in edge mode.
    pub edge_strategy: DerivationStrategy,
    pub make_source: fn(&SourceRoots) -> Box<dyn MetricSource>,
}

/// The built-in metric types, by configuration name.
pub(crate) static KINDS: &[KindDescriptor] = &[
    KindDescriptor {
        name: "execution_time",
        needs_interval: false,
        interval_strategy: None,
        edge_strategy: DerivationStrategy::EdgeSpan,
        make_source: |_| Box::new(wallclock::WallClockSource),
    },
    KindDescriptor {
        name: "rapl",
        needs_interval: true,
        interval_strategy: Some(DerivationStrategy::Delta),
        edge_strategy: DerivationStrategy::EdgeSpan,
        make_source: |roots| Box::new(rapl::RaplEnergySource::new(&roots.rapl_energy)),
    },
    KindDescriptor {
        name: "cpu_total",
        needs_interval: true,
        interval_strategy: Some(DerivationStrategy::PercentBreakdown),
        // Two edge snapshots give the usage breakdown over the whole run.
        edge_strategy: DerivationStrategy::PercentBreakdown,
        make_source: |roots| Box::new(cpu::CpuTotalSource::new(&roots.proc_stat)),
    },
    KindDescriptor {
        name: "cpu_per_core",
        needs_interval: true,
        interval_strategy: Some(DerivationStrategy::PercentBreakdown),
        edge_strategy: DerivationStrategy::PercentBreakdown,
        make_source: |roots| Box::new(cpu::CpuPerCoreSource::new(&roots.proc_stat)),
    },
    KindDescriptor {
        name: "freq_per_core",
        needs_interval: true,
        interval_strategy: Some(DerivationStrategy::Passthrough),
        edge_strategy: DerivationStrategy::Passthrough,
        make_source: |roots| Box::new(freq::CpuFreqSource::new(&roots.cpufreq_root)),
    },
];

pub(crate) fn kind_by_name(name: &str) -> Option<&'static KindDescriptor> {
    KINDS.iter().find(|k| k.name == name)
}
