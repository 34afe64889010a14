//! Samplers: the unit that collects and derives metrics for one source.
//!
//! A sampler wraps a [`MetricSource`] with a collection mode and a
//! [`DerivationStrategy`], and owns two append-only logs: the raw
//! measurements and the derived summary points.
//!
//! Lifecycle: `Idle → Running → Stopped`, with no re-entry. A periodic
//! sampler runs its collection loop on a dedicated tokio task; ownership of
//! the logs moves into the task at `start()` and back at `stop()`, so the
//! logs can only be read once the loop has definitively terminated.

pub mod derive;

use std::path::PathBuf;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::TickErrorPolicy;
use crate::error::{CollectionError, InvalidStateError, SamplerError};
use crate::measurement::{Sample, Timestamp};
use crate::sink::csv;
use crate::sources::MetricSource;
pub use derive::DerivationStrategy;

/// Collection mode of a built sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerMode {
    /// Collect every `interval`, measured from tick completion (a slow
    /// collection delays the next tick; there is no catch-up).
    Periodic { interval: Duration },
    /// Collect exactly once at start and once at stop.
    Edge,
}

/// Collects measurements from one metric source and derives summary points.
pub struct Sampler {
    name: String,
    mode: SamplerMode,
    /// Where to flush the summary log at stop, when running without a store.
    csv_path: Option<PathBuf>,
    state: State,
}

enum State {
    Idle(Box<Inner>),
    RunningPeriodic {
        cancel: CancellationToken,
        task: JoinHandle<Box<Inner>>,
    },
    RunningEdge(Box<Inner>),
    Stopped(Box<Inner>),
    /// The collection task was lost (it panicked). The logs are gone.
    Broken,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Idle(_) => "Idle",
            State::RunningPeriodic { .. } | State::RunningEdge(_) => "Running",
            State::Stopped(_) => "Stopped",
            State::Broken => "Broken",
        }
    }
}

/// The part of the sampler that moves into the periodic collection task.
struct Inner {
    name: String,
    source: Box<dyn MetricSource>,
    strategy: DerivationStrategy,
    on_error: TickErrorPolicy,
    raw: Vec<Sample>,
    summary: Vec<Sample>,
    /// Set when the abort policy terminated the loop early.
    failure: Option<CollectionError>,
}

impl Inner {
    /// Reads the source once and appends the result to the raw log.
    fn collect(&mut self, timestamp: Timestamp) -> Result<(), CollectionError> {
        let value = self.source.read().map_err(|source| CollectionError {
            sampler: self.name.clone(),
            timestamp,
            source,
        })?;
        self.raw.push(Sample::new(timestamp, value));
        Ok(())
    }

    /// Applies the strategy to the raw log. A derivation error aborts only
    /// this step, not the sampler.
    fn derive_step(&mut self) {
        match self.strategy.derive(&self.raw) {
            Ok(Some(summary)) => self.summary.push(summary),
            Ok(None) => (),
            Err(e) => log::error!("derivation failed for sampler `{}`: {e}", self.name),
        }
    }
}

/// The periodic collection loop.
///
/// Cancellation is cooperative and observed only at tick boundaries: a
/// collection in progress always runs to completion.
async fn run_periodic(mut inner: Box<Inner>, interval: Duration, cancel: CancellationToken) -> Box<Inner> {
    log::debug!("sampler `{}` started, polling every {interval:?}", inner.name);
    loop {
        let timestamp = Timestamp::now();
        match inner.collect(timestamp) {
            Ok(()) => inner.derive_step(),
            Err(e) => match inner.on_error {
                TickErrorPolicy::Skip => {
                    log::error!("{e:#} (skipping this tick)");
                }
                TickErrorPolicy::Abort => {
                    log::error!("{e:#} (aborting the sampler)");
                    inner.failure = Some(e);
                    break;
                }
            },
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    log::debug!(
        "sampler `{}` stopped with {} raw and {} summary points",
        inner.name,
        inner.raw.len(),
        inner.summary.len()
    );
    inner
}

impl Sampler {
    pub(crate) fn new(
        name: String,
        source: Box<dyn MetricSource>,
        strategy: DerivationStrategy,
        mode: SamplerMode,
        on_error: TickErrorPolicy,
        csv_path: Option<PathBuf>,
    ) -> Self {
        let inner = Inner {
            name: name.clone(),
            source,
            strategy,
            on_error,
            raw: Vec::new(),
            summary: Vec::new(),
            failure: None,
        };
        Self {
            name,
            mode,
            csv_path,
            state: State::Idle(Box::new(inner)),
        }
    }

    /// The unique display name of this sampler within the run.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> SamplerMode {
        self.mode
    }

    /// Starts collecting.
    ///
    /// Periodic mode spawns the collection loop on `rt`; edge mode performs
    /// one synchronous collection and returns. Starting a sampler that is
    /// not `Idle` (including one that was already stopped) fails.
    pub fn start(&mut self, rt: &Handle) -> Result<(), SamplerError> {
        let mut inner = match std::mem::replace(&mut self.state, State::Broken) {
            State::Idle(inner) => inner,
            other => {
                self.state = other;
                return Err(self.invalid_state("start").into());
            }
        };
        match self.mode {
            SamplerMode::Periodic { interval } => {
                let cancel = CancellationToken::new();
                let task = rt.spawn(run_periodic(inner, interval, cancel.clone()));
                self.state = State::RunningPeriodic { cancel, task };
                Ok(())
            }
            SamplerMode::Edge => {
                let result = inner.collect(Timestamp::now());
                self.state = State::RunningEdge(inner);
                result.map_err(SamplerError::from)
            }
        }
    }

    /// Stops collecting and finalizes the logs.
    ///
    /// For a periodic sampler this cancels the loop and waits for it to
    /// fully terminate: no raw or summary append happens after this returns.
    /// For an edge sampler this performs the final collection and derives
    /// the single summary point covering the whole run.
    pub fn stop(&mut self, rt: &Handle) -> Result<(), SamplerError> {
        let mut first_error = None;
        let inner = match std::mem::replace(&mut self.state, State::Broken) {
            State::RunningPeriodic { cancel, task } => {
                cancel.cancel();
                match rt.block_on(task) {
                    Ok(inner) => inner,
                    Err(e) => {
                        // The task panicked; the logs moved with it and are lost.
                        return Err(SamplerError::Task(anyhow::Error::new(e)));
                    }
                }
            }
            State::RunningEdge(mut inner) => {
                if let Err(e) = inner.collect(Timestamp::now()) {
                    first_error = Some(SamplerError::from(e));
                }
                inner.derive_step();
                inner
            }
            other => {
                self.state = other;
                return Err(self.invalid_state("stop").into());
            }
        };

        if let Some(path) = &self.csv_path {
            if let Err(e) = csv::write_summary(path, &inner.summary) {
                log::error!("failed to flush sampler `{}` to {}: {e:#}", self.name, path.display());
                first_error.get_or_insert(SamplerError::from(e));
            } else {
                log::debug!("sampler `{}` flushed to {}", self.name, path.display());
            }
        }

        self.state = State::Stopped(inner);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// The raw measurement log. `None` while the sampler is running.
    pub fn raw_log(&self) -> Option<&[Sample]> {
        self.logs().map(|(raw, _)| raw)
    }

    /// The derived summary log. `None` while the sampler is running.
    pub fn summary_log(&self) -> Option<&[Sample]> {
        self.logs().map(|(_, summary)| summary)
    }

    /// Both logs at once. `None` while the sampler is running.
    pub fn logs(&self) -> Option<(&[Sample], &[Sample])> {
        match &self.state {
            State::Idle(inner) | State::Stopped(inner) | State::RunningEdge(inner) => {
                Some((&inner.raw, &inner.summary))
            }
            State::RunningPeriodic { .. } | State::Broken => None,
        }
    }

    /// The collection error that aborted the sampler, if the abort policy
    /// ended the loop early.
    pub fn failure(&self) -> Option<&CollectionError> {
        match &self.state {
            State::Idle(inner) | State::Stopped(inner) | State::RunningEdge(inner) => inner.failure.as_ref(),
            State::RunningPeriodic { .. } | State::Broken => None,
        }
    }

    fn invalid_state(&self, operation: &'static str) -> InvalidStateError {
        InvalidStateError {
            sampler: self.name.clone(),
            operation,
            state: self.state.name(),
        }
    }
}
