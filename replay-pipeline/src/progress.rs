//! Stage 2 and stage 4: circuit length, pit detection, race progress.
//!
//! Race progress is the scalar position proxy `(lap-1)·L + rel_dist·L`.
//! It freezes at its pit-entry value while a driver is in the pit lane so
//! a short pit lane cannot produce ghost overtakes against cars on track.

use replay_core::PitLaneBounds;

use crate::provider::LapTrace;
use crate::resample::AlignedDriver;

/// Fallback when no timed lap exists to derive the circuit length from.
pub const DEFAULT_CIRCUIT_LENGTH: f64 = 5000.0;

/// Speed under which a car counts as stationary, km/h.
const STATIONARY_SPEED: f64 = 0.5;

/// A car stationary for this long, through the end of its data, is retired.
const RETIREMENT_SECONDS: f64 = 10.0;

/// Circuit length: total accumulated distance over the fastest lap's
/// telemetry, falling back to [`DEFAULT_CIRCUIT_LENGTH`] when no lap was
/// timed.
pub fn circuit_length<'a>(laps: impl IntoIterator<Item = &'a LapTrace>) -> f64 {
    let mut best: Option<(f64, f64)> = None; // (lap_time, length)

    for lap in laps {
        let Some(lap_time) = lap.summary.lap_time else {
            continue;
        };
        let length = lap
            .lap_dist
            .iter()
            .fold(f64::NEG_INFINITY, |acc, &d| acc.max(d));
        if !length.is_finite() || length <= 0.0 {
            continue;
        }
        if best.is_none_or(|(t, _)| lap_time < t) {
            best = Some((lap_time, length));
        }
    }

    best.map(|(_, length)| length).unwrap_or(DEFAULT_CIRCUIT_LENGTH)
}

/// Per-sample pit flags for one aligned driver.
///
/// Explicit provider flags win; otherwise the pit-lane bounding box from
/// track geometry is consulted; with neither available no sample is
/// flagged (and race progress never freezes).
pub fn detect_pit(driver: &AlignedDriver, pit_lane: Option<&PitLaneBounds>) -> Vec<bool> {
    if let Some(flags) = &driver.in_pit_flags {
        return flags.clone();
    }

    match pit_lane {
        Some(bounds) => driver
            .x
            .iter()
            .zip(&driver.y)
            .map(|(&x, &y)| bounds.contains(x, y))
            .collect(),
        None => vec![false; driver.x.len()],
    }
}

/// Fraction of the current lap completed, clamped to [0, 1].
pub fn rel_dist(lap_dist: &[f64], circuit_length: f64) -> Vec<f64> {
    lap_dist
        .iter()
        .map(|&d| (d / circuit_length).clamp(0.0, 1.0))
        .collect()
}

/// Race progress with pit freeze.
///
/// Outside the pit the value is `(lap-1)·L + rel·L`, clamped
/// non-decreasing against interpolation jitter. While `in_pit` holds, the
/// value stays at its pit-entry level.
pub fn race_progress(lap: &[u32], rel: &[f64], in_pit: &[bool], circuit_length: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(lap.len());
    let mut prev = 0.0f64;

    for i in 0..lap.len() {
        let value = if in_pit[i] {
            prev
        } else {
            let raw = (lap[i].saturating_sub(1)) as f64 * circuit_length + rel[i] * circuit_length;
            raw.max(prev)
        };
        out.push(value);
        prev = value;
    }

    out
}

/// Index of the sample where the driver retires, if it does.
///
/// A driver is retired once it sits below [`STATIONARY_SPEED`] for at
/// least [`RETIREMENT_SECONDS`] and never moves again: a stop that later
/// resumes (red flag, spin) does not count.
pub fn retirement_index(speed: &[f64], dt: f64) -> Option<usize> {
    let window = (RETIREMENT_SECONDS / dt).ceil() as usize;
    if speed.is_empty() || window == 0 {
        return None;
    }

    // Find the start of the trailing stationary run.
    let mut start = speed.len();
    for i in (0..speed.len()).rev() {
        if speed[i] > STATIONARY_SPEED {
            break;
        }
        start = i;
    }

    let run = speed.len() - start;
    (run >= window).then_some(start)
}
