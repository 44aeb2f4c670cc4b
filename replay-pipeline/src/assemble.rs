//! Stage 5: frame assembly and position ordering.
//!
//! Frames are built timeline-first: for every timeline index the full
//! field is ordered, positions 1..N are assigned, and one [`Frame`] is
//! emitted. Ordering runs in one of three modes per frame (grid window,
//! official classification, live race progress), with a hysteresis layer
//! that suppresses sub-threshold position swaps while racing is green.

use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use replay_core::{
    DriverSample, DriverStatus, Frame, TrackStatus, Weather, status_at,
};

use crate::provider::{LapAnchor, WeatherSample};
use crate::resample::AlignedDriver;

/// Minimum race-progress gap, meters, for a green-flag position swap to
/// take effect.
pub const HYSTERESIS_METERS: f64 = 5.0;

/// Grid ordering holds for this long from the start of the timeline.
pub const GRID_LOCK_SECS: f64 = 10.0;

/// Distance regressions beyond this are logged as data anomalies.
const DIST_REGRESSION_EPS: f64 = 1e-3;

/// One driver's fully derived channels, ready for assembly.
#[derive(Debug, Clone)]
pub struct DriverChannels {
    pub aligned: AlignedDriver,
    pub rel: Vec<f64>,
    pub race_progress: Vec<f64>,
    pub in_pit: Vec<bool>,
    /// Sample index from which the driver counts as retired.
    pub retired_from: Option<usize>,
}

impl DriverChannels {
    fn status_at(&self, i: usize) -> DriverStatus {
        if self.retired_from.is_some_and(|r| i >= r) {
            DriverStatus::Retired
        } else if self.in_pit[i] {
            DriverStatus::InPit
        } else {
            DriverStatus::Running
        }
    }
}

/// Everything frame assembly needs, borrowed from the pipeline run.
pub struct AssemblyInputs<'a> {
    pub timeline: &'a [f64],
    pub drivers: &'a [DriverChannels],
    pub circuit_length: f64,
    pub grid_positions: Option<&'a BTreeMap<String, u32>>,
    pub classification: Option<&'a [String]>,
    pub race_end_time: Option<f64>,
    pub track_statuses: &'a [TrackStatus],
    pub lap_anchors: &'a [LapAnchor],
    pub weather: &'a [WeatherSample],
}

/// Order the active field for frame `i` and return driver indices into
/// `inputs.drivers`, leader first.
fn order_active(
    inputs: &AssemblyInputs,
    active: &[usize],
    i: usize,
    t: f64,
    prev_rank: &HashMap<String, usize>,
) -> Vec<usize> {
    let drivers = inputs.drivers;
    let mut order: Vec<usize> = active.to_vec();

    let in_grid_window = t < GRID_LOCK_SECS && inputs.grid_positions.is_some();
    let finished = inputs.classification.is_some()
        && inputs.race_end_time.is_some_and(|end| t >= end);

    if in_grid_window {
        let grid = inputs.grid_positions.unwrap();
        order.sort_by(|&a, &b| {
            let ga = grid.get(&drivers[a].aligned.code).copied().unwrap_or(u32::MAX);
            let gb = grid.get(&drivers[b].aligned.code).copied().unwrap_or(u32::MAX);
            ga.cmp(&gb)
                .then_with(|| drivers[b].race_progress[i].total_cmp(&drivers[a].race_progress[i]))
                .then_with(|| drivers[a].aligned.code.cmp(&drivers[b].aligned.code))
        });
        return order;
    }

    if finished {
        let classified = inputs.classification.unwrap();
        let rank: HashMap<&str, usize> = classified
            .iter()
            .enumerate()
            .map(|(idx, code)| (code.as_str(), idx))
            .collect();
        order.sort_by(|&a, &b| {
            let ra = rank.get(drivers[a].aligned.code.as_str()).copied().unwrap_or(usize::MAX);
            let rb = rank.get(drivers[b].aligned.code.as_str()).copied().unwrap_or(usize::MAX);
            ra.cmp(&rb)
                .then_with(|| drivers[b].race_progress[i].total_cmp(&drivers[a].race_progress[i]))
        });
        return order;
    }

    // Active race: descending race progress, alphabetic tiebreak for
    // determinism.
    order.sort_by(|&a, &b| {
        drivers[b].race_progress[i]
            .total_cmp(&drivers[a].race_progress[i])
            .then_with(|| drivers[a].aligned.code.cmp(&drivers[b].aligned.code))
    });

    // Hysteresis: a swap below the threshold keeps the previous frame's
    // relative order. Suspended while the field is neutralized so official
    // order changes propagate immediately.
    let neutralized = status_at(inputs.track_statuses, t).is_neutralized();
    if !neutralized && !prev_rank.is_empty() {
        for k in 0..order.len().saturating_sub(1) {
            let (a, b) = (order[k], order[k + 1]);
            let gap = (drivers[a].race_progress[i] - drivers[b].race_progress[i]).abs();
            if gap >= HYSTERESIS_METERS {
                continue;
            }
            let (Some(&pa), Some(&pb)) = (
                prev_rank.get(&drivers[a].aligned.code),
                prev_rank.get(&drivers[b].aligned.code),
            ) else {
                continue;
            };
            if pb < pa {
                order.swap(k, k + 1);
            }
        }
    }

    order
}

/// Snap the active order to the latest lap anchor crossed in
/// `(t_prev, t]`, when the provider supplies anchors.
fn apply_anchor(
    inputs: &AssemblyInputs,
    order: Vec<usize>,
    t_prev: f64,
    t: f64,
) -> Vec<usize> {
    let Some(anchor) = inputs
        .lap_anchors
        .iter()
        .filter(|a| a.crossing_time > t_prev && a.crossing_time <= t)
        .max_by(|a, b| a.crossing_time.total_cmp(&b.crossing_time))
    else {
        return order;
    };

    let rank: HashMap<&str, usize> = anchor
        .positions
        .iter()
        .enumerate()
        .map(|(idx, code)| (code.as_str(), idx))
        .collect();

    let mut snapped = order;
    // Drivers absent from the anchor keep their computed relative order,
    // after every anchored driver.
    snapped.sort_by_key(|&d| {
        rank.get(inputs.drivers[d].aligned.code.as_str())
            .copied()
            .unwrap_or(usize::MAX)
    });
    snapped
}

fn weather_at(samples: &[WeatherSample], t: f64) -> Option<Weather> {
    samples
        .iter()
        .take_while(|s| s.time <= t)
        .last()
        .map(|s| Weather {
            air_temp: s.air_temp,
            track_temp: s.track_temp,
            wind_speed: s.wind_speed,
            rain_state: s.rain_state,
        })
}

/// Assemble the full frame sequence.
pub fn assemble_frames(inputs: &AssemblyInputs) -> Vec<Frame> {
    let drivers = inputs.drivers;
    let mut frames = Vec::with_capacity(inputs.timeline.len());
    let mut prev_rank: HashMap<String, usize> = HashMap::new();
    let mut regressions: HashMap<String, usize> = HashMap::new();

    // Retirement order is fixed once: by the sample each driver retires at.
    let mut retirement_order: Vec<usize> = (0..drivers.len())
        .filter(|&d| drivers[d].retired_from.is_some())
        .collect();
    retirement_order.sort_by_key(|&d| {
        (
            drivers[d].retired_from.unwrap(),
            drivers[d].aligned.code.clone(),
        )
    });

    for (i, &t) in inputs.timeline.iter().enumerate() {
        let t_prev = if i == 0 {
            f64::NEG_INFINITY
        } else {
            inputs.timeline[i - 1]
        };

        let active: Vec<usize> = (0..drivers.len())
            .filter(|&d| drivers[d].status_at(i) != DriverStatus::Retired)
            .collect();

        let mut order = order_active(inputs, &active, i, t, &prev_rank);
        order = apply_anchor(inputs, order, t_prev, t);

        prev_rank = order
            .iter()
            .enumerate()
            .map(|(rank, &d)| (drivers[d].aligned.code.clone(), rank))
            .collect();

        // Retired drivers follow the active field in the order they retired.
        order.extend(
            retirement_order
                .iter()
                .filter(|&&d| drivers[d].status_at(i) == DriverStatus::Retired),
        );

        let mut frame_drivers = BTreeMap::new();
        for (rank, &d) in order.iter().enumerate() {
            let ch = &drivers[d];
            let a = &ch.aligned;
            let lap = a.lap[i];
            let completed = lap.checked_sub(1).and_then(|l| a.lap_summaries.get(&l));
            let dist = (lap.saturating_sub(1)) as f64 * inputs.circuit_length + a.lap_dist[i];
            let status = ch.status_at(i);

            if i > 0 && status == DriverStatus::Running {
                let prev_lap = a.lap[i - 1];
                let prev_dist =
                    (prev_lap.saturating_sub(1)) as f64 * inputs.circuit_length + a.lap_dist[i - 1];
                if dist < prev_dist - DIST_REGRESSION_EPS {
                    *regressions.entry(a.code.clone()).or_default() += 1;
                }
            }

            frame_drivers.insert(
                a.code.clone(),
                DriverSample {
                    x: a.x[i],
                    y: a.y[i],
                    dist,
                    rel_dist: ch.rel[i],
                    race_progress: ch.race_progress[i],
                    lap,
                    tyre: a.tyre[i],
                    speed: a.speed[i],
                    gear: a.gear[i],
                    drs: a.drs[i],
                    throttle: a.throttle[i],
                    brake: a.brake[i],
                    rpm: a.rpm[i],
                    position: (rank + 1) as u32,
                    status,
                    lap_time: completed.and_then(|s| s.lap_time),
                    sector1: completed.and_then(|s| s.sector1),
                    sector2: completed.and_then(|s| s.sector2),
                    sector3: completed.and_then(|s| s.sector3),
                },
            );
        }

        let leader_lap = order
            .first()
            .map(|&d| drivers[d].aligned.lap[i])
            .unwrap_or(0);

        frames.push(Frame {
            t,
            leader_lap,
            drivers: frame_drivers,
            weather: weather_at(inputs.weather, t),
        });
    }

    for (code, count) in regressions {
        warn!(
            driver = %code,
            samples = count,
            "Accumulated distance regressed between consecutive frames"
        );
    }

    frames
}
