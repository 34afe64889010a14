//! Wall-clock source, for execution-time measurement in edge mode.

use super::MetricSource;
use crate::measurement::{RawValue, Timestamp};

/// Returns the current time as epoch seconds.
///
/// Paired with the edge-span strategy, the two edge samples give the
/// elapsed wall time of the run.
pub struct WallClockSource;

impl MetricSource for WallClockSource {
    fn read(&mut self) -> anyhow::Result<RawValue> {
        Ok(RawValue::Scalar(Timestamp::now().as_epoch_secs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_monotonic() {
        let mut source = WallClockSource;
        let a = source.read().unwrap().as_scalar().unwrap();
        let b = source.read().unwrap().as_scalar().unwrap();
        assert!(b >= a);
    }
}
