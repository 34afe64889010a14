//! The run-scoped coordinator: builds samplers from configuration, starts
//! and stops them together, and routes their logs to the configured sink.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Context;

use crate::config::{Config, Mode};
use crate::error::{PersistenceError, SessionError};
use crate::measurement::Timestamp;
use crate::sampler::{Sampler, SamplerMode};
use crate::sink::SinkConfig;
use crate::sink::store::{RunId, Store};
use crate::sources::{SourceRoots, kind_by_name};

/// Owns a set of samplers for the duration of one measurement session.
///
/// A session covers one run: `start_all()` opens it, `stop_all()` closes it
/// and persists the collected data. The store connection (if any) and the
/// tokio runtime live exactly as long as the coordinator.
pub struct Coordinator {
    runtime: tokio::runtime::Runtime,
    samplers: Vec<Sampler>,
    store: Option<Store>,
    /// Serialized at start into the run's immutable config snapshot.
    config: Config,
    current_run: Option<RunId>,
    active: bool,
    /// Set by `stop_all()`. Samplers are single-use, so a stopped session
    /// cannot collect again; a fresh run needs a fresh coordinator.
    finished: bool,
}

impl Coordinator {
    /// Builds the samplers described by `config`, reading from the default
    /// system paths.
    ///
    /// Unknown logger type names are skipped, so a configuration written
    /// for a newer toolkit still works. Disabled entries are ignored.
    pub fn build(config: &Config, sink: SinkConfig) -> anyhow::Result<Coordinator> {
        Self::build_with_roots(config, sink, SourceRoots::default())
    }

    /// Like [`Coordinator::build`], with explicit filesystem roots for the
    /// built-in sources.
    pub fn build_with_roots(config: &Config, sink: SinkConfig, roots: SourceRoots) -> anyhow::Result<Coordinator> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("sampler-worker")
            .enable_all()
            .build()
            .context("could not start the sampling runtime")?;

        let (store, files_dir) = match sink {
            SinkConfig::Database { path } => {
                let store = Store::open(&path).with_context(|| format!("could not open store {}", path.display()))?;
                (Some(store), None)
            }
            SinkConfig::Files { dir } => {
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("could not create output directory {}", dir.display()))?;
                (None, Some(dir))
            }
        };

        let mut samplers = Vec::new();
        let mut used_names = HashSet::new();

        for (type_name, entries) in &config.loggers {
            let Some(kind) = kind_by_name(type_name) else {
                log::debug!("ignoring unknown logger type `{type_name}`");
                continue;
            };

            let enabled: Vec<_> = entries.iter().filter(|e| e.enabled).collect();
            let ambiguous = enabled.len() > 1;

            for entry in enabled {
                let mode = if kind.needs_interval {
                    entry.mode
                } else {
                    if entry.mode == Mode::Interval {
                        log::warn!("logger type `{type_name}` only supports edge mode, forcing it");
                    }
                    Mode::Edge
                };

                let sampler_mode = match mode {
                    Mode::Interval => {
                        let interval = entry.interval.unwrap_or(config.interval);
                        if !(interval > 0.0) {
                            anyhow::bail!("invalid interval {interval} for logger type `{type_name}`");
                        }
                        SamplerMode::Periodic {
                            interval: Duration::from_secs_f64(interval),
                        }
                    }
                    Mode::Edge => SamplerMode::Edge,
                };
                let strategy = match mode {
                    Mode::Interval => kind
                        .interval_strategy
                        .expect("needs_interval implies an interval strategy"),
                    Mode::Edge => kind.edge_strategy,
                };

                let name = display_name(type_name, mode, ambiguous, &mut used_names);
                let csv_path = files_dir.as_ref().map(|dir| dir.join(format!("{name}.csv")));
                let source = (kind.make_source)(&roots);
                samplers.push(Sampler::new(
                    name,
                    source,
                    strategy,
                    sampler_mode,
                    entry.on_error,
                    csv_path,
                ));
            }
        }

        log::info!(
            "session ready with {} sampler(s): {}",
            samplers.len(),
            samplers.iter().map(Sampler::name).collect::<Vec<_>>().join(", ")
        );

        Ok(Coordinator {
            runtime,
            samplers,
            store,
            config: config.clone(),
            current_run: None,
            active: false,
            finished: false,
        })
    }

    /// Opens a run (store mode) and starts every sampler.
    ///
    /// A sampler whose initial collection fails is logged and left in the
    /// session; its tick policy decides what happens next.
    ///
    /// A coordinator is single-use: once `stop_all()` has closed the run,
    /// `start_all()` fails with [`SessionError::Finished`].
    pub fn start_all(&mut self) -> Result<(), SessionError> {
        if self.finished {
            return Err(SessionError::Finished);
        }
        if self.active {
            return Err(SessionError::AlreadyStarted);
        }

        if let Some(store) = &self.store {
            let snapshot = serde_json::to_string(&self.config).map_err(PersistenceError::from)?;
            let run_id = store.create_run(Timestamp::now(), &snapshot)?;
            log::info!("opened run {run_id}");
            self.current_run = Some(run_id);
        }

        for sampler in &mut self.samplers {
            if let Err(e) = sampler.start(self.runtime.handle()) {
                log::error!("failed to start sampler `{}`: {e:#}", sampler.name());
            }
        }
        self.active = true;
        Ok(())
    }

    /// Stops every sampler, then drains their logs into the store and
    /// closes the run.
    ///
    /// Without an active run this is a no-op, so calling `stop_all()` twice
    /// never reopens a closed run, and the coordinator becomes finished:
    /// no further run can be opened with it. Each sampler is drained in its own
    /// transaction; the samplers that failed to drain are reported in the
    /// returned error, the others are persisted.
    pub fn stop_all(&mut self) -> Result<(), SessionError> {
        if !self.active {
            log::warn!("stop_all called without an active run, ignoring");
            return Ok(());
        }

        // Stop everything first: the logs may only be read once every
        // sampler has definitively stopped.
        for sampler in &mut self.samplers {
            if let Err(e) = sampler.stop(self.runtime.handle()) {
                log::error!("failed to stop sampler `{}`: {e:#}", sampler.name());
            }
        }
        self.active = false;
        self.finished = true;

        let Some(store) = &mut self.store else {
            // File mode: every sampler flushed its own CSV during stop().
            return Ok(());
        };
        let Some(run_id) = self.current_run.take() else {
            log::error!("no run is open, collected data cannot be persisted");
            return Ok(());
        };

        let mut failed = Vec::new();
        for sampler in &self.samplers {
            let Some((raw, summary)) = sampler.logs() else {
                log::error!("logs of sampler `{}` are unavailable", sampler.name());
                failed.push(sampler.name().to_string());
                continue;
            };
            if let Err(e) = store.drain_sampler(run_id, sampler.name(), raw, summary) {
                log::error!("failed to drain sampler `{}`: {e:#}", sampler.name());
                failed.push(sampler.name().to_string());
            }
        }
        store.finalize_run(run_id, Timestamp::now())?;
        log::info!("closed run {run_id}");

        if failed.is_empty() {
            Ok(())
        } else {
            Err(PersistenceError::PartialDrain { failed }.into())
        }
    }

    pub fn samplers(&self) -> &[Sampler] {
        &self.samplers
    }

    /// The id of the run opened by `start_all()`, while it is active.
    pub fn current_run(&self) -> Option<RunId> {
        self.current_run
    }

    /// The relational store, when the session persists to a database.
    pub fn store(&self) -> Option<&Store> {
        self.store.as_ref()
    }
}

/// Picks the unique display name for a sampler.
///
/// The type name alone when unambiguous; suffixed with the mode when the
/// type is enabled more than once, and numbered as a last resort (two
/// entries with the same type and mode).
fn display_name(type_name: &str, mode: Mode, ambiguous: bool, used: &mut HashSet<String>) -> String {
    let base = if ambiguous {
        format!("{type_name}_{mode}")
    } else {
        type_name.to_string()
    };
    let mut name = base.clone();
    let mut n = 1;
    while !used.insert(name.clone()) {
        n += 1;
        name = format!("{base}_{n}");
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;

    #[test]
    fn display_names_are_unique() {
        let mut used = HashSet::new();
        assert_eq!(display_name("cpu_total", Mode::Interval, false, &mut used), "cpu_total");
        assert_eq!(display_name("rapl", Mode::Interval, true, &mut used), "rapl_interval");
        assert_eq!(display_name("rapl", Mode::Edge, true, &mut used), "rapl_edge");
        // same type and mode twice: numbered
        assert_eq!(display_name("rapl", Mode::Edge, true, &mut used), "rapl_edge_2");
        assert_eq!(display_name("rapl", Mode::Edge, true, &mut used), "rapl_edge_3");
    }
}
