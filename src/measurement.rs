//! Measurement values and timestamps.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use serde::Serialize;

/// A point in time, stored as fractional seconds since the Unix epoch.
///
/// This is the time representation used everywhere in the toolkit: in the
/// in-memory logs, in CSV files and in the `REAL` columns of the store.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Timestamp(f64);

impl Timestamp {
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Timestamp(elapsed.as_secs_f64())
    }

    pub fn from_epoch_secs(secs: f64) -> Self {
        Timestamp(secs)
    }

    pub fn as_epoch_secs(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// One raw measurement, as produced by a [`MetricSource`](crate::sources::MetricSource).
///
/// A source returns a single `RawValue` per read, but a value may hold more
/// than one scalar: a list of per-core readings, a map of named accumulators,
/// or one map per core.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawValue {
    /// A single number, e.g. a cumulative energy counter.
    Scalar(f64),
    /// An ordered list of numbers, e.g. one frequency per core.
    Series(Vec<f64>),
    /// Named values, e.g. CPU time spent in each state.
    Fields(IndexMap<String, f64>),
    /// One map of named values per logical group, e.g. per core.
    Groups(Vec<IndexMap<String, f64>>),
}

impl RawValue {
    /// A short name for the shape of the value, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            RawValue::Scalar(_) => "scalar",
            RawValue::Series(_) => "series",
            RawValue::Fields(_) => "fields",
            RawValue::Groups(_) => "groups",
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            RawValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// Breaks the value into `(key, value)` rows, one per scalar component.
    ///
    /// A scalar has no key. A series is keyed by index, a map by field name,
    /// and groups by `"<group index>.<field name>"`. The row order follows
    /// the order of the value itself.
    pub fn flatten(&self) -> Vec<(Option<String>, f64)> {
        match self {
            RawValue::Scalar(v) => vec![(None, *v)],
            RawValue::Series(values) => values
                .iter()
                .enumerate()
                .map(|(i, v)| (Some(i.to_string()), *v))
                .collect(),
            RawValue::Fields(fields) => fields.iter().map(|(k, v)| (Some(k.clone()), *v)).collect(),
            RawValue::Groups(groups) => groups
                .iter()
                .enumerate()
                .flat_map(|(i, fields)| fields.iter().map(move |(k, v)| (Some(format!("{i}.{k}")), *v)))
                .collect(),
        }
    }
}

/// A timestamped entry of a sampler's raw or summary log.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub value: RawValue,
}

impl Sample {
    pub fn new(timestamp: Timestamp, value: RawValue) -> Self {
        Self { timestamp, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;
    use pretty_assertions::assert_eq;

    #[test]
    fn flatten_scalar() {
        let rows = RawValue::Scalar(42.5).flatten();
        assert_eq!(rows, vec![(None, 42.5)]);
    }

    #[test]
    fn flatten_series_keyed_by_index() {
        let rows = RawValue::Series(vec![1000.0, 2000.0, 1500.0]).flatten();
        assert_eq!(
            rows,
            vec![
                (Some("0".to_string()), 1000.0),
                (Some("1".to_string()), 2000.0),
                (Some("2".to_string()), 1500.0),
            ]
        );
    }

    #[test]
    fn flatten_fields_keeps_insertion_order() {
        let value = RawValue::Fields(indexmap! {
            "user".to_string() => 10.0,
            "idle".to_string() => 90.0,
        });
        let rows = value.flatten();
        assert_eq!(
            rows,
            vec![
                (Some("user".to_string()), 10.0),
                (Some("idle".to_string()), 90.0),
            ]
        );
    }

    #[test]
    fn flatten_groups_prefixes_group_index() {
        let value = RawValue::Groups(vec![
            indexmap! { "user".to_string() => 1.0 },
            indexmap! { "user".to_string() => 2.0 },
        ]);
        let rows = value.flatten();
        assert_eq!(
            rows,
            vec![
                (Some("0.user".to_string()), 1.0),
                (Some("1.user".to_string()), 2.0),
            ]
        );
    }

    #[test]
    fn timestamp_display_has_microsecond_precision() {
        let ts = Timestamp::from_epoch_secs(1234.5);
        assert_eq!(ts.to_string(), "1234.500000");
    }
}
