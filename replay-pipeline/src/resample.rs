//! Stage 3: global timeline alignment.
//!
//! All drivers are resampled onto one uniform 25 Hz timeline anchored at
//! the earliest first timestamp across the field. Source time axes are
//! already verified monotonic by stage 1, so interpolation walks both
//! arrays in a single pass with no sorting.

use std::collections::BTreeMap;

use replay_core::{FRAME_DT, TyreCompound};

use crate::extract::DriverTrace;
use crate::provider::LapSummary;

/// Build the uniform timeline covering `[0, span]` at the frame cadence.
///
/// `span` is the session duration after translating by `-t_min`. The
/// timeline has `ceil(span / Δt)` samples; an empty span yields an empty
/// timeline.
pub fn build_timeline(span: f64) -> Vec<f64> {
    if !span.is_finite() || span <= 0.0 {
        return Vec::new();
    }
    let count = (span / FRAME_DT).ceil() as usize;
    (0..count).map(|i| i as f64 * FRAME_DT).collect()
}

/// Linearly interpolate `(xs, ys)` onto `targets`.
///
/// `xs` must be non-decreasing; `targets` must be ascending. Targets
/// outside the observed range are clamped to the endpoint values (the
/// driver's last known sample is held).
pub fn interp_channel(xs: &[f64], ys: &[f64], targets: &[f64]) -> Vec<f64> {
    debug_assert_eq!(xs.len(), ys.len());
    if xs.is_empty() {
        return vec![0.0; targets.len()];
    }

    let mut out = Vec::with_capacity(targets.len());
    let mut hi = 0usize;

    for &t in targets {
        if t <= xs[0] {
            out.push(ys[0]);
            continue;
        }
        if t >= xs[xs.len() - 1] {
            out.push(ys[ys.len() - 1]);
            continue;
        }

        while hi < xs.len() && xs[hi] < t {
            hi += 1;
        }
        let lo = hi - 1;
        let dx = xs[hi] - xs[lo];
        if dx <= 0.0 {
            // Repeated timestamps: hold the earlier sample.
            out.push(ys[lo]);
        } else {
            let frac = (t - xs[lo]) / dx;
            out.push(ys[lo] + (ys[hi] - ys[lo]) * frac);
        }
    }

    out
}

/// Integer channels are interpolated linearly then rounded.
pub fn interp_rounded_u32(xs: &[f64], ys: &[u32], targets: &[f64]) -> Vec<u32> {
    let as_f64: Vec<f64> = ys.iter().map(|&v| v as f64).collect();
    interp_channel(xs, &as_f64, targets)
        .into_iter()
        .map(|v| v.round().max(0.0) as u32)
        .collect()
}

pub fn interp_rounded_u8(xs: &[f64], ys: &[u8], targets: &[f64]) -> Vec<u8> {
    let as_f64: Vec<f64> = ys.iter().map(|&v| v as f64).collect();
    interp_channel(xs, &as_f64, targets)
        .into_iter()
        .map(|v| v.round().clamp(0.0, u8::MAX as f64) as u8)
        .collect()
}

/// Categorical channels take the latest source sample at or before the
/// target (no blending between categories).
pub fn sample_previous<T: Copy>(xs: &[f64], values: &[T], targets: &[f64], default: T) -> Vec<T> {
    debug_assert_eq!(xs.len(), values.len());
    let mut out = Vec::with_capacity(targets.len());
    let mut idx = 0usize;

    for &t in targets {
        while idx + 1 < xs.len() && xs[idx + 1] <= t {
            idx += 1;
        }
        if xs.is_empty() {
            out.push(default);
        } else if t < xs[0] {
            out.push(values[0]);
        } else {
            out.push(values[idx]);
        }
    }

    out
}

/// One driver aligned onto the global timeline.
#[derive(Debug, Clone)]
pub struct AlignedDriver {
    pub code: String,
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
    pub in_pit_flags: Option<Vec<bool>>,
    pub lap_summaries: BTreeMap<u32, LapSummary>,
    /// Translated time of the driver's first and last real samples;
    /// outside this window the channels hold clamped endpoint values.
    pub observed_start: f64,
    pub observed_end: f64,
}

/// Resample one driver onto `timeline`, translating its clock by `-t_min`.
pub fn align_driver(trace: &DriverTrace, t_min: f64, timeline: &[f64]) -> AlignedDriver {
    let times: Vec<f64> = trace.time.iter().map(|t| t - t_min).collect();

    AlignedDriver {
        code: trace.code.clone(),
        x: interp_channel(&times, &trace.x, timeline),
        y: interp_channel(&times, &trace.y, timeline),
        lap_dist: interp_channel(&times, &trace.lap_dist, timeline),
        speed: interp_channel(&times, &trace.speed, timeline),
        rpm: interp_channel(&times, &trace.rpm, timeline),
        throttle: interp_channel(&times, &trace.throttle, timeline),
        brake: interp_channel(&times, &trace.brake, timeline),
        gear: interp_rounded_u8(&times, &trace.gear, timeline),
        drs: interp_rounded_u8(&times, &trace.drs, timeline),
        lap: interp_rounded_u32(&times, &trace.lap, timeline),
        tyre: sample_previous(&times, &trace.tyre, timeline, TyreCompound::Unknown),
        in_pit_flags: trace
            .in_pit
            .as_ref()
            .map(|flags| sample_previous(&times, flags, timeline, false)),
        lap_summaries: trace.lap_summaries.clone(),
        observed_start: times.first().copied().unwrap_or(0.0),
        observed_end: times.last().copied().unwrap_or(0.0),
    }
}
