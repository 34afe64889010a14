//! End-to-end session scenarios against mock /proc and /sys trees.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ecmon::config::{Config, LoggerEntry, Mode, TickErrorPolicy};
use ecmon::measurement::RawValue;
use ecmon::sources::SourceRoots;
use ecmon::{Coordinator, SinkConfig};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).try_init();
}

/// A mock machine: /proc/stat, a cpufreq tree and a RAPL energy counter,
/// all inside one tempdir.
struct MockMachine {
    _tmp: TempDir,
    roots: SourceRoots,
}

impl MockMachine {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let proc_stat = tmp.path().join("stat");
        let cpufreq_root = tmp.path().join("cpu");
        let rapl_energy = tmp.path().join("energy_uj");

        std::fs::write(
            &proc_stat,
            "cpu  100 0 50 850 0 0 0 0 0 0\ncpu0 50 0 25 425 0 0 0 0 0 0\ncpu1 50 0 25 425 0 0 0 0 0 0\n",
        )
        .unwrap();
        for core in 0..2 {
            let dir = cpufreq_root.join(format!("cpu{core}")).join("cpufreq");
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("scaling_cur_freq"), "2400000\n").unwrap();
        }
        std::fs::write(&rapl_energy, "1000000\n").unwrap();

        Self {
            _tmp: tmp,
            roots: SourceRoots {
                proc_stat,
                cpufreq_root,
                rapl_energy,
            },
        }
    }

    fn set_energy(&self, microjoules: u64) {
        std::fs::write(&self.roots.rapl_energy, format!("{microjoules}\n")).unwrap();
    }
}

fn enabled(mode: Mode, interval: Option<f64>) -> LoggerEntry {
    LoggerEntry {
        enabled: true,
        mode,
        interval,
        on_error: TickErrorPolicy::Skip,
    }
}

fn config_with(loggers: &[(&str, LoggerEntry)]) -> Config {
    let mut config = Config::default();
    for (name, entry) in loggers {
        config.loggers.insert(name.to_string(), vec![entry.clone()]);
    }
    config
}

fn db_sink(dir: &Path) -> SinkConfig {
    SinkConfig::Database {
        path: dir.join("runs.sqlite"),
    }
}

#[test]
fn periodic_and_edge_scenario() {
    init_logger();
    let machine = MockMachine::new();
    let out = TempDir::new().unwrap();
    let config = config_with(&[
        ("cpu_total", enabled(Mode::Interval, Some(0.1))),
        ("execution_time", enabled(Mode::Edge, None)),
    ]);

    let mut session = Coordinator::build_with_roots(&config, db_sink(out.path()), machine.roots.clone()).unwrap();
    let started = std::time::Instant::now();
    session.start_all().unwrap();
    std::thread::sleep(Duration::from_millis(250));
    session.stop_all().unwrap();
    let elapsed = started.elapsed().as_secs_f64();

    let cpu = session
        .samplers()
        .iter()
        .find(|s| s.name() == "cpu_total")
        .unwrap();
    let (raw, summary) = cpu.logs().unwrap();
    assert!(
        (2..=4).contains(&raw.len()),
        "expected 2-4 raw samples in 250ms at 100ms interval, got {}",
        raw.len()
    );
    assert_eq!(summary.len(), raw.len() - 1);
    // the mock snapshots never change, so every breakdown is all-zero
    for point in summary {
        let RawValue::Fields(usage) = &point.value else {
            panic!("expected fields, got {:?}", point.value);
        };
        assert!(usage.values().all(|v| *v == 0.0));
    }

    let timer = session
        .samplers()
        .iter()
        .find(|s| s.name() == "execution_time")
        .unwrap();
    let (raw, summary) = timer.logs().unwrap();
    assert_eq!(raw.len(), 2);
    assert_eq!(summary.len(), 1);
    let span = summary[0].value.as_scalar().unwrap();
    assert!(
        (span - elapsed).abs() < 0.05,
        "edge span {span}s differs from elapsed {elapsed}s"
    );
}

#[test]
fn edge_rapl_measures_the_counter_difference() {
    init_logger();
    let machine = MockMachine::new();
    let out = TempDir::new().unwrap();
    let config = config_with(&[("rapl", enabled(Mode::Edge, None))]);

    let mut session = Coordinator::build_with_roots(&config, db_sink(out.path()), machine.roots.clone()).unwrap();
    session.start_all().unwrap();
    machine.set_energy(1_250_000); // the workload consumed 0.25 J
    session.stop_all().unwrap();

    let rapl = session.samplers().iter().find(|s| s.name() == "rapl").unwrap();
    let (raw, summary) = rapl.logs().unwrap();
    assert_eq!(raw.len(), 2);
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].value, RawValue::Scalar(250_000.0));
}

#[test]
fn store_round_trip_preserves_sequences() {
    init_logger();
    let machine = MockMachine::new();
    let out = TempDir::new().unwrap();
    let config = config_with(&[
        ("rapl", enabled(Mode::Edge, None)),
        ("freq_per_core", enabled(Mode::Interval, Some(0.05))),
    ]);

    let mut session = Coordinator::build_with_roots(&config, db_sink(out.path()), machine.roots.clone()).unwrap();
    session.start_all().unwrap();
    let run_id = session.current_run().unwrap();
    std::thread::sleep(Duration::from_millis(150));
    session.stop_all().unwrap();

    let store = session.store().unwrap();
    let run = store.fetch_run(run_id).unwrap();
    assert!(run.end_time.unwrap() >= run.start_time);
    assert!(run.config_json.contains("freq_per_core"));

    // the persisted rows reconstruct the in-memory logs, in order
    for sampler in session.samplers() {
        let (raw, summary) = sampler.logs().unwrap();
        let raw_rows = store.fetch_samples(run_id, sampler.name()).unwrap();
        let expected: Vec<(f64, Option<String>, f64)> = raw
            .iter()
            .flat_map(|s| {
                s.value
                    .flatten()
                    .into_iter()
                    .map(|(key, value)| (s.timestamp.as_epoch_secs(), key, value))
            })
            .collect();
        let actual: Vec<(f64, Option<String>, f64)> =
            raw_rows.into_iter().map(|r| (r.timestamp, r.key, r.value)).collect();
        assert_eq!(actual, expected, "raw rows of `{}`", sampler.name());

        let summary_rows = store.fetch_summary_metrics(run_id, sampler.name()).unwrap();
        let flattened: usize = summary.iter().map(|s| s.value.flatten().len()).sum();
        assert_eq!(summary_rows.len(), flattened, "summary rows of `{}`", sampler.name());
    }

    // timestamps within one sampler are non-decreasing after the round trip
    let freq_rows = store.fetch_samples(run_id, "freq_per_core").unwrap();
    assert!(freq_rows.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn stop_all_is_idempotent() {
    init_logger();
    let machine = MockMachine::new();
    let out = TempDir::new().unwrap();
    let config = config_with(&[("rapl", enabled(Mode::Edge, None))]);

    let mut session = Coordinator::build_with_roots(&config, db_sink(out.path()), machine.roots.clone()).unwrap();
    session.start_all().unwrap();
    let run_id = session.current_run().unwrap();
    session.stop_all().unwrap();

    let end_time = session.store().unwrap().fetch_run(run_id).unwrap().end_time;
    let rows_before = session.store().unwrap().fetch_samples(run_id, "rapl").unwrap().len();

    // second stop: no new run, no duplicate rows, same end time
    session.stop_all().unwrap();
    let store = session.store().unwrap();
    assert_eq!(store.run_count().unwrap(), 1);
    assert_eq!(store.fetch_run(run_id).unwrap().end_time, end_time);
    assert_eq!(store.fetch_samples(run_id, "rapl").unwrap().len(), rows_before);
}

#[test]
fn finished_session_cannot_open_a_second_run() {
    init_logger();
    let machine = MockMachine::new();
    let out = TempDir::new().unwrap();
    let config = config_with(&[("rapl", enabled(Mode::Edge, None))]);

    let mut session = Coordinator::build_with_roots(&config, db_sink(out.path()), machine.roots.clone()).unwrap();
    session.start_all().unwrap();
    let run_id = session.current_run().unwrap();
    session.stop_all().unwrap();

    // Samplers are spent; restarting must fail instead of opening a second
    // run that would re-drain the first run's retained logs.
    assert!(matches!(session.start_all(), Err(ecmon::error::SessionError::Finished)));
    session.stop_all().unwrap();

    let store = session.store().unwrap();
    assert_eq!(store.run_count().unwrap(), 1);
    let rows = store.fetch_samples(run_id, "rapl").unwrap();
    assert_eq!(rows.len(), 2, "the run holds exactly the two edge samples");
}

#[test]
fn start_all_twice_is_rejected() {
    init_logger();
    let machine = MockMachine::new();
    let out = TempDir::new().unwrap();
    let config = config_with(&[("rapl", enabled(Mode::Edge, None))]);

    let mut session = Coordinator::build_with_roots(&config, db_sink(out.path()), machine.roots.clone()).unwrap();
    session.start_all().unwrap();
    assert!(session.start_all().is_err());
    session.stop_all().unwrap();
}

#[test]
fn unknown_logger_type_is_silently_skipped() {
    init_logger();
    let machine = MockMachine::new();
    let out = TempDir::new().unwrap();
    let config = config_with(&[
        ("gpu_power", enabled(Mode::Interval, None)),
        ("rapl", enabled(Mode::Edge, None)),
    ]);

    let session = Coordinator::build_with_roots(&config, db_sink(out.path()), machine.roots.clone()).unwrap();
    let names: Vec<&str> = session.samplers().iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["rapl"]);
}

#[test]
fn file_sink_writes_one_csv_per_sampler() {
    init_logger();
    let machine = MockMachine::new();
    let out = TempDir::new().unwrap();
    let logs_dir: PathBuf = out.path().join("logs");
    let mut config = config_with(&[("execution_time", enabled(Mode::Edge, None))]);
    // rapl in both modes: display names get the mode suffix
    config.loggers.insert(
        "rapl".to_string(),
        vec![
            enabled(Mode::Interval, Some(0.05)),
            enabled(Mode::Edge, None),
        ],
    );

    let mut session = Coordinator::build_with_roots(
        &config,
        SinkConfig::Files { dir: logs_dir.clone() },
        machine.roots.clone(),
    )
    .unwrap();
    session.start_all().unwrap();
    std::thread::sleep(Duration::from_millis(120));
    session.stop_all().unwrap();

    for file in ["execution_time.csv", "rapl_interval.csv", "rapl_edge.csv"] {
        let path = logs_dir.join(file);
        let content = std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing {file}"));
        assert!(content.starts_with("timestamp,metric\n"), "bad header in {file}");
    }
    let edge = std::fs::read_to_string(logs_dir.join("rapl_edge.csv")).unwrap();
    assert_eq!(edge.lines().count(), 2, "header plus exactly one summary row");
}

#[test]
fn interval_mode_on_an_edge_only_type_is_forced_to_edge() {
    init_logger();
    let machine = MockMachine::new();
    let out = TempDir::new().unwrap();
    let config = config_with(&[("execution_time", enabled(Mode::Interval, None))]);

    let mut session = Coordinator::build_with_roots(&config, db_sink(out.path()), machine.roots.clone()).unwrap();
    session.start_all().unwrap();
    session.stop_all().unwrap();

    let timer = session.samplers().iter().find(|s| s.name() == "execution_time").unwrap();
    let (raw, summary) = timer.logs().unwrap();
    assert_eq!(raw.len(), 2);
    assert_eq!(summary.len(), 1);
}
