//! Error taxonomy of the toolkit.
//!
//! Each phase of the data path has its own error type, so that callers can
//! apply the right recovery policy: a failed tick is recoverable, a failed
//! derivation step only aborts that step, a lifecycle misuse is fatal to the
//! call, and a failed drain must be reported rather than silently dropped.

use thiserror::Error;

use crate::measurement::Timestamp;

/// A metric source failed to produce a value.
///
/// Recoverable for periodic samplers, depending on the configured
/// [`TickErrorPolicy`](crate::config::TickErrorPolicy).
#[derive(Debug, Error)]
#[error("collection failed for sampler `{sampler}` at {timestamp}")]
pub struct CollectionError {
    pub sampler: String,
    pub timestamp: Timestamp,
    #[source]
    pub source: anyhow::Error,
}

/// A derivation strategy's preconditions were not met.
///
/// This aborts the current derivation step only; the sampler keeps running.
#[derive(Debug, Error)]
pub enum DerivationError {
    #[error("expected a {expected} value, got {got}")]
    ShapeMismatch { expected: &'static str, got: &'static str },

    #[error("group count changed between snapshots: {previous} then {current}")]
    GroupCountMismatch { previous: usize, current: usize },

    #[error("field `{key}` is missing from one of the snapshots")]
    KeyMismatch { key: String },

    #[error("need {need} samples, have {have}")]
    NotEnoughSamples { need: usize, have: usize },
}

/// An operation was attempted in the wrong lifecycle state.
///
/// Always fatal to the call, never retried.
#[derive(Debug, Error)]
#[error("cannot {operation} sampler `{sampler}` in state {state}")]
pub struct InvalidStateError {
    pub sampler: String,
    pub operation: &'static str,
    pub state: &'static str,
}

/// A sink write failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database operation failed")]
    Database(#[from] rusqlite::Error),

    #[error("file sink write failed")]
    Io(#[from] std::io::Error),

    #[error("value serialization failed")]
    Format(#[from] serde_json::Error),

    /// Some samplers could not be drained into the store. Each failed
    /// sampler's data was rolled back as a whole; the others were persisted.
    #[error("failed to persist data for sampler(s): {}", failed.join(", "))]
    PartialDrain { failed: Vec<String> },
}

/// Errors returned by [`Sampler`](crate::sampler::Sampler) lifecycle calls.
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("sampler task failed: {0}")]
    Task(anyhow::Error),
}

/// Errors returned by [`Coordinator`](crate::session::Coordinator) calls.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("the session is already started")]
    AlreadyStarted,

    #[error("the session has already run; build a new coordinator for a new run")]
    Finished,

    #[error(transparent)]
    Sampler(#[from] SamplerError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
