//! Stage 1: per-driver extraction.
//!
//! Laps arrive as column-oriented bundles. Each bundle is validated
//! (channel lengths, non-decreasing time), bundles are sorted by start
//! time — the collection is tens of items, so sorting at lap granularity
//! avoids an argsort over hundreds of thousands of points — and
//! concatenated into one per-driver trace. A final check confirms the
//! concatenated time axis is monotonic.

use std::collections::BTreeMap;

use replay_core::TyreCompound;

use crate::error::{PipelineError, PipelineResult};
use crate::provider::{LapSummary, LapTrace};

/// Concatenated telemetry for one driver across the whole session.
#[derive(Debug, Clone)]
pub struct DriverTrace {
    pub code: String,
    pub time: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub lap_dist: Vec<f64>,
    pub speed: Vec<f64>,
    pub rpm: Vec<f64>,
    pub throttle: Vec<f64>,
    pub brake: Vec<f64>,
    pub gear: Vec<u8>,
    pub drs: Vec<u8>,
    pub lap: Vec<u32>,
    pub tyre: Vec<TyreCompound>,
    /// Explicit pit flags; present if any source lap carried them.
    pub in_pit: Option<Vec<bool>>,
    /// Completed-lap timing keyed by lap number.
    pub lap_summaries: BTreeMap<u32, LapSummary>,
}

impl DriverTrace {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn first_time(&self) -> f64 {
        self.time.first().copied().unwrap_or(0.0)
    }

    pub fn last_time(&self) -> f64 {
        self.time.last().copied().unwrap_or(0.0)
    }
}

fn check_channel_len(
    driver: &str,
    lap: u32,
    channel: &'static str,
    len: usize,
    expected: usize,
) -> PipelineResult<()> {
    if len != expected {
        return Err(PipelineError::ChannelLengthMismatch {
            driver: driver.to_string(),
            lap,
            channel,
        });
    }
    Ok(())
}

/// Validate one lap bundle: non-empty, equal channel lengths, and
/// non-decreasing time within the lap.
pub fn validate_lap(driver: &str, lap: &LapTrace) -> PipelineResult<()> {
    if lap.time.is_empty() {
        return Err(PipelineError::EmptyTelemetry {
            driver: driver.to_string(),
        });
    }

    let n = lap.time.len();
    check_channel_len(driver, lap.lap, "x", lap.x.len(), n)?;
    check_channel_len(driver, lap.lap, "y", lap.y.len(), n)?;
    check_channel_len(driver, lap.lap, "lap_dist", lap.lap_dist.len(), n)?;
    check_channel_len(driver, lap.lap, "speed", lap.speed.len(), n)?;
    check_channel_len(driver, lap.lap, "rpm", lap.rpm.len(), n)?;
    check_channel_len(driver, lap.lap, "throttle", lap.throttle.len(), n)?;
    check_channel_len(driver, lap.lap, "brake", lap.brake.len(), n)?;
    check_channel_len(driver, lap.lap, "gear", lap.gear.len(), n)?;
    check_channel_len(driver, lap.lap, "drs", lap.drs.len(), n)?;
    if let Some(in_pit) = &lap.in_pit {
        check_channel_len(driver, lap.lap, "in_pit", in_pit.len(), n)?;
    }

    if lap.time.windows(2).any(|w| w[1] < w[0]) {
        return Err(PipelineError::NonMonotonicLap {
            driver: driver.to_string(),
            lap: lap.lap,
        });
    }

    Ok(())
}

/// Concatenate a driver's laps into one trace.
///
/// Laps are sorted by start time, boundaries are checked (lap k+1 must not
/// start before lap k ended), and the concatenated time axis is verified
/// monotonic so downstream interpolation can skip its own argsort.
pub fn concat_driver_laps(code: &str, mut laps: Vec<LapTrace>) -> PipelineResult<DriverTrace> {
    if laps.is_empty() {
        return Err(PipelineError::EmptyTelemetry {
            driver: code.to_string(),
        });
    }

    for lap in &laps {
        validate_lap(code, lap)?;
    }

    laps.sort_by(|a, b| a.start_time().total_cmp(&b.start_time()));

    for pair in laps.windows(2) {
        if pair[1].start_time() < pair[0].end_time() {
            return Err(PipelineError::LapOverlap {
                driver: code.to_string(),
                lap: pair[1].lap,
            });
        }
    }

    let total: usize = laps.iter().map(|l| l.time.len()).sum();
    let any_pit_flags = laps.iter().any(|l| l.in_pit.is_some());

    let mut trace = DriverTrace {
        code: code.to_string(),
        time: Vec::with_capacity(total),
        x: Vec::with_capacity(total),
        y: Vec::with_capacity(total),
        lap_dist: Vec::with_capacity(total),
        speed: Vec::with_capacity(total),
        rpm: Vec::with_capacity(total),
        throttle: Vec::with_capacity(total),
        brake: Vec::with_capacity(total),
        gear: Vec::with_capacity(total),
        drs: Vec::with_capacity(total),
        lap: Vec::with_capacity(total),
        tyre: Vec::with_capacity(total),
        in_pit: any_pit_flags.then(|| Vec::with_capacity(total)),
        lap_summaries: BTreeMap::new(),
    };

    for lap in laps {
        let n = lap.time.len();
        trace.time.extend_from_slice(&lap.time);
        trace.x.extend_from_slice(&lap.x);
        trace.y.extend_from_slice(&lap.y);
        trace.lap_dist.extend_from_slice(&lap.lap_dist);
        trace.speed.extend_from_slice(&lap.speed);
        trace.rpm.extend_from_slice(&lap.rpm);
        trace.throttle.extend_from_slice(&lap.throttle);
        trace.brake.extend_from_slice(&lap.brake);
        trace.gear.extend_from_slice(&lap.gear);
        trace.drs.extend_from_slice(&lap.drs);
        trace.lap.extend(std::iter::repeat_n(lap.lap, n));
        trace.tyre.extend(std::iter::repeat_n(lap.tyre, n));
        if let Some(dest) = &mut trace.in_pit {
            match &lap.in_pit {
                Some(flags) => dest.extend_from_slice(flags),
                None => dest.extend(std::iter::repeat_n(false, n)),
            }
        }
        trace.lap_summaries.insert(lap.lap, lap.summary);
    }

    if trace.time.windows(2).any(|w| w[1] < w[0]) {
        return Err(PipelineError::NonMonotonicConcat {
            driver: code.to_string(),
        });
    }

    Ok(trace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lap(number: u32, times: &[f64]) -> LapTrace {
        let n = times.len();
        LapTrace {
            lap: number,
            tyre: TyreCompound::Medium,
            summary: LapSummary::default(),
            time: times.to_vec(),
            x: vec![0.0; n],
            y: vec![0.0; n],
            lap_dist: (0..n).map(|i| i as f64 * 100.0).collect(),
            speed: vec![200.0; n],
            rpm: vec![10_000.0; n],
            throttle: vec![80.0; n],
            brake: vec![0.0; n],
            gear: vec![6; n],
            drs: vec![0; n],
            in_pit: None,
        }
    }

    #[test]
    fn concat_sorts_laps_by_start_time() {
        let laps = vec![lap(2, &[10.0, 11.0, 12.0]), lap(1, &[0.0, 1.0, 2.0])];
        let trace = concat_driver_laps("VER", laps).unwrap();

        assert_eq!(trace.time, vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
        assert_eq!(trace.lap, vec![1, 1, 1, 2, 2, 2]);
        assert_eq!(trace.first_time(), 0.0);
        assert_eq!(trace.last_time(), 12.0);
    }

    #[test]
    fn rejects_non_monotonic_time_within_lap() {
        let err = concat_driver_laps("VER", vec![lap(1, &[0.0, 2.0, 1.0])]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NonMonotonicLap { lap: 1, .. }
        ));
    }

    #[test]
    fn rejects_overlapping_laps() {
        let laps = vec![lap(1, &[0.0, 5.0]), lap(2, &[4.0, 9.0])];
        let err = concat_driver_laps("VER", laps).unwrap_err();
        assert!(matches!(err, PipelineError::LapOverlap { lap: 2, .. }));
    }

    #[test]
    fn rejects_channel_length_mismatch() {
        let mut bad = lap(1, &[0.0, 1.0]);
        bad.speed.pop();
        let err = concat_driver_laps("VER", vec![bad]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ChannelLengthMismatch {
                channel: "speed",
                ..
            }
        ));
    }

    #[test]
    fn rejects_empty_driver() {
        let err = concat_driver_laps("VER", vec![]).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyTelemetry { .. }));
    }

    #[test]
    fn pit_flags_fill_missing_laps_with_false() {
        let mut first = lap(1, &[0.0, 1.0]);
        first.in_pit = Some(vec![true, false]);
        let second = lap(2, &[2.0, 3.0]);

        let trace = concat_driver_laps("VER", vec![first, second]).unwrap();
        assert_eq!(trace.in_pit, Some(vec![true, false, false, false]));
    }

    #[test]
    fn lap_summaries_are_keyed_by_lap() {
        let mut first = lap(1, &[0.0, 1.0]);
        first.summary.lap_time = Some(92_000.0);
        let trace = concat_driver_laps("VER", vec![first, lap(2, &[2.0, 3.0])]).unwrap();

        assert_eq!(trace.lap_summaries[&1].lap_time, Some(92_000.0));
        assert_eq!(trace.lap_summaries[&2].lap_time, None);
    }
}
