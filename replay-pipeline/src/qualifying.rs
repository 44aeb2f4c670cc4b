//! Qualifying variant.
//!
//! Qualifying produces no global frame sequence. Each segment (Q1/Q2/Q3)
//! carries every driver's fastest lap resampled onto a per-segment 25 Hz
//! timeline starting at t = 0; clients interpolate locally instead of
//! receiving streamed frames.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{PipelineError, PipelineResult};
use crate::extract::validate_lap;
use crate::provider::{LapTrace, SegmentWindow};
use crate::resample::{build_timeline, interp_channel, interp_rounded_u8};

/// One resampled sample of a qualifying lap, relative to lap start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualiSample {
    pub t: f64,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub gear: u8,
    pub drs: u8,
    pub throttle: f64,
    pub brake: f64,
    pub rpm: f64,
    pub rel_dist: f64,
}

/// A driver's fastest lap within one segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSegment {
    pub frames: Vec<QualiSample>,
    pub lap_time_ms: f64,
}

/// One qualifying segment: every participating driver's fastest lap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentReplay {
    /// Longest lap in the segment, seconds.
    pub duration: f64,
    pub drivers: BTreeMap<String, DriverSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QualifyingReplay {
    /// Segment label (Q1/Q2/Q3) → replay data.
    pub segments: BTreeMap<String, SegmentReplay>,
}

/// Fastest timed lap starting inside `window`, if the driver set one.
fn fastest_lap_in<'a>(laps: &'a [LapTrace], window: &SegmentWindow) -> Option<&'a LapTrace> {
    laps.iter()
        .filter(|lap| {
            let start = lap.start_time();
            start >= window.start_time && start < window.end_time
        })
        .filter(|lap| lap.summary.lap_time.is_some())
        .min_by(|a, b| {
            a.summary
                .lap_time
                .unwrap()
                .total_cmp(&b.summary.lap_time.unwrap())
        })
}

fn resample_lap(code: &str, lap: &LapTrace) -> PipelineResult<Vec<QualiSample>> {
    validate_lap(code, lap)?;

    let t0 = lap.start_time();
    let times: Vec<f64> = lap.time.iter().map(|t| t - t0).collect();
    let span = times.last().copied().unwrap_or(0.0);
    let timeline = build_timeline(span);

    let lap_length = lap
        .lap_dist
        .iter()
        .fold(f64::NEG_INFINITY, |acc, &d| acc.max(d))
        .max(1.0);

    let x = interp_channel(&times, &lap.x, &timeline);
    let y = interp_channel(&times, &lap.y, &timeline);
    let speed = interp_channel(&times, &lap.speed, &timeline);
    let rpm = interp_channel(&times, &lap.rpm, &timeline);
    let throttle = interp_channel(&times, &lap.throttle, &timeline);
    let brake = interp_channel(&times, &lap.brake, &timeline);
    let dist = interp_channel(&times, &lap.lap_dist, &timeline);
    let gear = interp_rounded_u8(&times, &lap.gear, &timeline);
    let drs = interp_rounded_u8(&times, &lap.drs, &timeline);

    Ok(timeline
        .iter()
        .enumerate()
        .map(|(i, &t)| QualiSample {
            t,
            x: x[i],
            y: y[i],
            speed: speed[i],
            gear: gear[i],
            drs: drs[i],
            throttle: throttle[i],
            brake: brake[i],
            rpm: rpm[i],
            rel_dist: (dist[i] / lap_length).clamp(0.0, 1.0),
        })
        .collect())
}

/// Build the segment-keyed qualifying replay from per-driver lap sets.
pub fn build_qualifying(
    lap_sets: &BTreeMap<String, Vec<LapTrace>>,
    segments: &[SegmentWindow],
) -> PipelineResult<QualifyingReplay> {
    if segments.is_empty() {
        return Err(PipelineError::NoSegments);
    }

    let mut replay = QualifyingReplay::default();

    for window in segments {
        let mut drivers = BTreeMap::new();
        let mut duration = 0.0f64;

        for (code, laps) in lap_sets {
            let Some(lap) = fastest_lap_in(laps, window) else {
                continue;
            };
            let lap_time_ms = lap.summary.lap_time.unwrap();
            duration = duration.max(lap_time_ms / 1000.0);

            drivers.insert(
                code.clone(),
                DriverSegment {
                    frames: resample_lap(code, lap)?,
                    lap_time_ms,
                },
            );
        }

        replay
            .segments
            .insert(window.label.clone(), SegmentReplay { duration, drivers });
    }

    Ok(replay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LapSummary;
    use replay_core::{FRAME_DT, TyreCompound};

    fn quali_lap(number: u32, start: f64, duration: f64, lap_time: Option<f64>) -> LapTrace {
        let n = 11;
        let times: Vec<f64> = (0..n)
            .map(|i| start + duration * i as f64 / (n - 1) as f64)
            .collect();
        LapTrace {
            lap: number,
            tyre: TyreCompound::Soft,
            summary: LapSummary {
                lap_time,
                ..Default::default()
            },
            time: times,
            x: (0..n).map(|i| i as f64 * 10.0).collect(),
            y: vec![0.0; n],
            lap_dist: (0..n).map(|i| i as f64 * 500.0).collect(),
            speed: vec![250.0; n],
            rpm: vec![11_000.0; n],
            throttle: vec![100.0; n],
            brake: vec![0.0; n],
            gear: vec![8; n],
            drs: vec![12; n],
            in_pit: None,
        }
    }

    fn windows() -> Vec<SegmentWindow> {
        vec![
            SegmentWindow {
                label: "Q1".to_string(),
                start_time: 0.0,
                end_time: 1000.0,
            },
            SegmentWindow {
                label: "Q2".to_string(),
                start_time: 1000.0,
                end_time: 2000.0,
            },
        ]
    }

    #[test]
    fn picks_fastest_lap_per_segment() {
        let laps = vec![
            quali_lap(3, 100.0, 92.0, Some(92_000.0)),
            quali_lap(5, 400.0, 90.5, Some(90_500.0)),
            quali_lap(8, 1200.0, 89.8, Some(89_800.0)),
        ];
        let sets = BTreeMap::from([("VER".to_string(), laps)]);

        let replay = build_qualifying(&sets, &windows()).unwrap();

        let q1 = &replay.segments["Q1"];
        assert_eq!(q1.drivers["VER"].lap_time_ms, 90_500.0);
        let q2 = &replay.segments["Q2"];
        assert_eq!(q2.drivers["VER"].lap_time_ms, 89_800.0);
    }

    #[test]
    fn segment_timeline_starts_at_zero_with_fixed_step() {
        let sets = BTreeMap::from([(
            "NOR".to_string(),
            vec![quali_lap(2, 350.0, 91.2, Some(91_200.0))],
        )]);

        let replay = build_qualifying(&sets, &windows()).unwrap();
        let frames = &replay.segments["Q1"].drivers["NOR"].frames;

        assert_eq!(frames[0].t, 0.0);
        for pair in frames.windows(2) {
            assert!((pair[1].t - pair[0].t - FRAME_DT).abs() < 1e-12);
        }
        // rel_dist spans the lap and stays clamped.
        assert!(frames.iter().all(|f| (0.0..=1.0).contains(&f.rel_dist)));
        assert!(frames.last().unwrap().rel_dist > 0.9);
    }

    #[test]
    fn drivers_without_timed_laps_are_absent() {
        let sets = BTreeMap::from([
            (
                "VER".to_string(),
                vec![quali_lap(2, 100.0, 90.0, Some(90_000.0))],
            ),
            ("HUL".to_string(), vec![quali_lap(2, 100.0, 95.0, None)]),
        ]);

        let replay = build_qualifying(&sets, &windows()).unwrap();
        let q1 = &replay.segments["Q1"];
        assert!(q1.drivers.contains_key("VER"));
        assert!(!q1.drivers.contains_key("HUL"));
    }

    #[test]
    fn duration_is_longest_lap_in_segment() {
        let sets = BTreeMap::from([
            (
                "VER".to_string(),
                vec![quali_lap(2, 100.0, 90.0, Some(90_000.0))],
            ),
            (
                "SAI".to_string(),
                vec![quali_lap(2, 200.0, 93.0, Some(93_000.0))],
            ),
        ]);

        let replay = build_qualifying(&sets, &windows()).unwrap();
        assert_eq!(replay.segments["Q1"].duration, 93.0);
    }

    #[test]
    fn empty_segment_list_is_an_error() {
        let sets = BTreeMap::new();
        assert!(matches!(
            build_qualifying(&sets, &[]),
            Err(PipelineError::NoSegments)
        ));
    }
}
