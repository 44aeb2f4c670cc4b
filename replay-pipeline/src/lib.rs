//! # Replay Pipeline - Telemetry Processing
//!
//! Transforms raw per-lap driver samples into the dense, timeline-aligned
//! frame sequence the streaming gateway plays back.
//!
//! ## Stages
//!
//! 1. **Extraction** — per-driver lap validation and concatenation
//!    (parallel across drivers)
//! 2. **Circuit length** — derived from the fastest lap's telemetry
//! 3. **Alignment** — every driver resampled onto one 25 Hz timeline
//! 4. **Race progress** — cumulative position proxy with pit freeze
//! 5. **Assembly** — per-frame ordering, hysteresis, retirement handling
//!
//! Qualifying sessions skip the global timeline and produce a
//! segment-keyed structure instead (see [`qualifying`]).
//!
//! The pipeline is CPU-bound and runs on the rayon worker pool; callers on
//! an async runtime are expected to dispatch [`run_pipeline`] through
//! their blocking bridge. Progress lands in the supplied sink, which must
//! be cheap and non-blocking.

pub mod assemble;
pub mod error;
pub mod extract;
pub mod progress;
pub mod provider;
pub mod qualifying;
pub mod resample;

pub use error::{PipelineError, PipelineResult};
pub use provider::{
    Entrant, LapAnchor, LapSummary, LapTrace, RawSessionInfo, SegmentWindow, SessionSource,
    WeatherSample,
};
pub use qualifying::QualifyingReplay;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::info;

use replay_core::{Frame, SessionKey, SessionMetadata, SessionType, TrackStatus};

use crate::assemble::{AssemblyInputs, DriverChannels, assemble_frames};
use crate::extract::concat_driver_laps;
use crate::progress::{circuit_length, detect_pit, race_progress, rel_dist, retirement_index};
use crate::resample::{align_driver, build_timeline};

/// Replay data for one session, ready for caching and streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedSession {
    pub payload: ReplayPayload,
    pub metadata: SessionMetadata,
    pub track_statuses: Vec<TrackStatus>,
    pub load_time_seconds: f64,
}

impl ProcessedSession {
    /// Frame count for race-style sessions; 0 for qualifying.
    pub fn frame_count(&self) -> usize {
        match &self.payload {
            ReplayPayload::Race { frames } => frames.len(),
            ReplayPayload::Qualifying { .. } => 0,
        }
    }

    pub fn frames(&self) -> Option<&[Frame]> {
        match &self.payload {
            ReplayPayload::Race { frames } => Some(frames),
            ReplayPayload::Qualifying { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayPayload {
    Race { frames: Vec<Frame> },
    Qualifying { replay: QualifyingReplay },
}

/// Monotonic progress reporter: late or out-of-order reports from
/// parallel workers never move the published value backwards.
pub struct ProgressReporter<'a> {
    sink: &'a (dyn Fn(u8, &str) + Send + Sync),
    last: AtomicU8,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a (dyn Fn(u8, &str) + Send + Sync)) -> Self {
        Self {
            sink,
            last: AtomicU8::new(0),
        }
    }

    pub fn report(&self, progress: u8, message: &str) {
        let progress = progress.min(100);
        let published = self.last.fetch_max(progress, Ordering::Relaxed);
        (self.sink)(progress.max(published), message);
    }
}

/// Run the full pipeline for `key` against `source`.
///
/// Any per-driver failure fails the whole load; missing optional session
/// data (grid, classification, fastest lap) degrades gracefully.
pub fn run_pipeline(
    source: &dyn SessionSource,
    key: SessionKey,
    sink: &(dyn Fn(u8, &str) + Send + Sync),
) -> PipelineResult<ProcessedSession> {
    let started = Instant::now();
    let reporter = ProgressReporter::new(sink);

    reporter.report(2, "Fetching session data");
    let entrants = source.entrants()?;
    if entrants.is_empty() {
        return Err(PipelineError::NoEntrants);
    }
    let info = source.session_info()?;

    reporter.report(5, "Fetching driver laps");
    let mut lap_sets: Vec<(String, Vec<LapTrace>)> = Vec::with_capacity(entrants.len());
    for entrant in &entrants {
        lap_sets.push((entrant.code.clone(), source.laps(&entrant.code)?));
    }

    let length = circuit_length(lap_sets.iter().flat_map(|(_, laps)| laps.iter()));
    let metadata = build_metadata(key, &entrants, &info, length);

    let (payload, track_statuses) = match key.session_type {
        SessionType::Qualifying => {
            reporter.report(40, "Resampling qualifying laps");
            let sets: BTreeMap<String, Vec<LapTrace>> = lap_sets.into_iter().collect();
            let replay = qualifying::build_qualifying(&sets, &info.segments)?;
            reporter.report(95, "Qualifying segments ready");
            // No global timeline: statuses stay in session time.
            (
                ReplayPayload::Qualifying { replay },
                info.track_statuses.clone(),
            )
        }
        SessionType::Race | SessionType::Sprint => {
            let (frames, statuses) = run_race_stages(&reporter, lap_sets, &info, length)?;
            (ReplayPayload::Race { frames }, statuses)
        }
    };

    let load_time_seconds = started.elapsed().as_secs_f64();
    info!(
        key = %key,
        frames = match &payload {
            ReplayPayload::Race { frames } => frames.len(),
            ReplayPayload::Qualifying { replay } => replay.segments.len(),
        },
        load_time_seconds,
        "Pipeline finished"
    );

    Ok(ProcessedSession {
        payload,
        metadata,
        track_statuses,
        load_time_seconds,
    })
}

fn translate_statuses(statuses: &[TrackStatus], t_min: f64) -> Vec<TrackStatus> {
    statuses
        .iter()
        .map(|s| TrackStatus {
            start_time: s.start_time - t_min,
            end_time: s.end_time.map(|e| e - t_min),
            code: s.code,
        })
        .collect()
}

fn build_metadata(
    key: SessionKey,
    entrants: &[Entrant],
    info: &RawSessionInfo,
    circuit_length: f64,
) -> SessionMetadata {
    SessionMetadata {
        year: key.year,
        round: key.round,
        session_type: key.session_type,
        total_laps: info.total_laps,
        race_start_time: info.race_start_time,
        circuit_length,
        driver_colors: entrants
            .iter()
            .map(|e| (e.code.clone(), e.color))
            .collect(),
        driver_numbers: entrants
            .iter()
            .map(|e| (e.code.clone(), e.number))
            .collect(),
        driver_teams: entrants
            .iter()
            .map(|e| (e.code.clone(), e.team.clone()))
            .collect(),
        track_geometry: info.track_geometry.clone(),
    }
}

fn run_race_stages(
    reporter: &ProgressReporter,
    lap_sets: Vec<(String, Vec<LapTrace>)>,
    info: &RawSessionInfo,
    circuit_length: f64,
) -> PipelineResult<(Vec<Frame>, Vec<TrackStatus>)> {
    let total = lap_sets.len();
    // Chunk so each worker takes a few drivers at a time; completion order
    // is irrelevant because results stay keyed by driver.
    let chunk = total.div_ceil(rayon::current_num_threads() * 4).max(1);
    let done = AtomicUsize::new(0);

    let traces: Vec<extract::DriverTrace> = lap_sets
        .into_par_iter()
        .with_min_len(chunk)
        .map(|(code, laps)| {
            let trace = concat_driver_laps(&code, laps)?;
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.report(
                10 + (40 * n / total) as u8,
                &format!("Processed telemetry for {n}/{total} drivers"),
            );
            Ok(trace)
        })
        .collect::<PipelineResult<_>>()?;

    let t_min = traces
        .iter()
        .map(|t| t.first_time())
        .fold(f64::INFINITY, f64::min);
    let t_max = traces
        .iter()
        .map(|t| t.last_time())
        .fold(f64::NEG_INFINITY, f64::max);
    let timeline = build_timeline(t_max - t_min);

    reporter.report(55, "Aligning drivers onto the session timeline");
    let aligned: Vec<resample::AlignedDriver> = traces
        .par_iter()
        .with_min_len(chunk)
        .map(|trace| align_driver(trace, t_min, &timeline))
        .collect();

    reporter.report(80, "Computing race progress");
    let pit_bounds = info.track_geometry.pit_lane;
    let channels: Vec<DriverChannels> = aligned
        .into_par_iter()
        .with_min_len(chunk)
        .map(|driver| {
            let in_pit = detect_pit(&driver, pit_bounds.as_ref());
            let rel = rel_dist(&driver.lap_dist, circuit_length);
            let rp = race_progress(&driver.lap, &rel, &in_pit, circuit_length);
            let retired_from = retirement_index(&driver.speed, replay_core::FRAME_DT);
            DriverChannels {
                aligned: driver,
                rel,
                race_progress: rp,
                in_pit,
                retired_from,
            }
        })
        .collect();

    reporter.report(90, "Assembling frames");
    let statuses = translate_statuses(&info.track_statuses, t_min);
    let anchors: Vec<LapAnchor> = info
        .lap_anchors
        .iter()
        .map(|a| LapAnchor {
            lap: a.lap,
            crossing_time: a.crossing_time - t_min,
            positions: a.positions.clone(),
        })
        .collect();
    let weather: Vec<WeatherSample> = info
        .weather
        .iter()
        .map(|w| WeatherSample {
            time: w.time - t_min,
            ..*w
        })
        .collect();

    let frames = assemble_frames(&AssemblyInputs {
        timeline: &timeline,
        drivers: &channels,
        circuit_length,
        grid_positions: info.grid_positions.as_ref(),
        classification: info.classification.as_deref(),
        race_end_time: info.race_end_time.map(|t| t - t_min),
        track_statuses: &statuses,
        lap_anchors: &anchors,
        weather: &weather,
    });

    reporter.report(97, "Frames assembled");
    Ok((frames, statuses))
}
