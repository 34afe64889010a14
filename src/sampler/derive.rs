//! Derivation strategies: pure functions from the raw log to summary points.

use indexmap::IndexMap;

use crate::error::DerivationError;
use crate::measurement::{RawValue, Sample};

/// How a sampler turns its raw log into summary points.
///
/// Strategies are pure: they read the last one or two raw samples and never
/// mutate the log. The sampler applies its strategy after every periodic
/// collection, or once at stop in edge mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationStrategy {
    /// `current - previous`, for monotonically increasing scalar counters.
    ///
    /// A counter that wraps around (e.g. powercap `energy_uj` reaching
    /// `max_energy_range_uj`) produces one negative delta; no correction is
    /// applied.
    Delta,
    /// Per-key usage percentages between two snapshots of named
    /// accumulators, applied per group when the value is [`RawValue::Groups`].
    PercentBreakdown,
    /// The latest raw value, unchanged. For instantaneous quantities.
    Passthrough,
    /// The scalar difference between the start and stop edge samples,
    /// stamped with the stop time.
    EdgeSpan,
}

impl DerivationStrategy {
    /// Derives the next summary point from the raw log.
    ///
    /// Returns `Ok(None)` when there are not enough samples yet (e.g. a
    /// single sample under [`DerivationStrategy::Delta`]).
    pub fn derive(&self, raw: &[Sample]) -> Result<Option<Sample>, DerivationError> {
        match self {
            DerivationStrategy::Delta => {
                let Some((previous, current)) = last_two(raw) else {
                    return Ok(None);
                };
                let value = scalar_difference(previous, current)?;
                Ok(Some(Sample::new(current.timestamp, RawValue::Scalar(value))))
            }
            DerivationStrategy::PercentBreakdown => {
                let Some((previous, current)) = last_two(raw) else {
                    return Ok(None);
                };
                let value = match (&previous.value, &current.value) {
                    (RawValue::Fields(p), RawValue::Fields(c)) => RawValue::Fields(percent_breakdown(p, c)?),
                    (RawValue::Groups(p), RawValue::Groups(c)) => {
                        if p.len() != c.len() {
                            return Err(DerivationError::GroupCountMismatch {
                                previous: p.len(),
                                current: c.len(),
                            });
                        }
                        let groups = p
                            .iter()
                            .zip(c)
                            .map(|(prev_group, curr_group)| percent_breakdown(prev_group, curr_group))
                            .collect::<Result<Vec<_>, _>>()?;
                        RawValue::Groups(groups)
                    }
                    (_, other) => {
                        return Err(DerivationError::ShapeMismatch {
                            expected: "fields or groups",
                            got: other.kind(),
                        });
                    }
                };
                Ok(Some(Sample::new(current.timestamp, value)))
            }
            DerivationStrategy::Passthrough => Ok(raw.last().cloned()),
            DerivationStrategy::EdgeSpan => {
                if raw.len() != 2 {
                    return Err(DerivationError::NotEnoughSamples {
                        need: 2,
                        have: raw.len(),
                    });
                }
                let value = scalar_difference(&raw[0], &raw[1])?;
                Ok(Some(Sample::new(raw[1].timestamp, RawValue::Scalar(value))))
            }
        }
    }
}

fn last_two(raw: &[Sample]) -> Option<(&Sample, &Sample)> {
    match raw {
        [.., previous, current] => Some((previous, current)),
        _ => None,
    }
}

fn scalar_difference(previous: &Sample, current: &Sample) -> Result<f64, DerivationError> {
    let p = previous.value.as_scalar().ok_or(DerivationError::ShapeMismatch {
        expected: "scalar",
        got: previous.value.kind(),
    })?;
    let c = current.value.as_scalar().ok_or(DerivationError::ShapeMismatch {
        expected: "scalar",
        got: current.value.kind(),
    })?;
    Ok(c - p)
}

/// Computes the per-key usage percentages between two snapshots of named
/// non-negative accumulators. Both snapshots must have the same key set.
///
/// When nothing changed between the snapshots (`total == 0`), every key gets
/// exactly `0.0` instead of a division by zero.
fn percent_breakdown(
    previous: &IndexMap<String, f64>,
    current: &IndexMap<String, f64>,
) -> Result<IndexMap<String, f64>, DerivationError> {
    if let Some(key) = previous.keys().find(|k| !current.contains_key(*k)) {
        return Err(DerivationError::KeyMismatch { key: key.clone() });
    }

    let mut deltas = IndexMap::with_capacity(current.len());
    for (key, curr) in current {
        let prev = previous.get(key).ok_or_else(|| DerivationError::KeyMismatch { key: key.clone() })?;
        deltas.insert(key.clone(), curr - prev);
    }

    let total: f64 = deltas.values().sum();
    let usage = deltas
        .into_iter()
        .map(|(key, delta)| {
            let percent = if total == 0.0 { 0.0 } else { 100.0 * delta / total };
            (key, percent)
        })
        .collect();
    Ok(usage)
}
