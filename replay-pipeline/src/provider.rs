//! Upstream provider contract.
//!
//! The engine treats the telemetry provider as an opaque fetch that returns
//! per-lap samples. Everything downstream works on the column-oriented
//! structures defined here; cross-process handoff is by value and no shared
//! mutable state spans the worker boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use replay_core::{TrackGeometry, TrackStatus, TyreCompound};

use crate::error::PipelineResult;

/// One entrant as reported by the upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entrant {
    /// 3-4 character driver code, unique within a season.
    pub code: String,
    pub number: u32,
    pub team: String,
    pub color: [u8; 3],
}

/// Completed-lap timing attached to a lap trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct LapSummary {
    /// Lap time in milliseconds, when the lap was completed and timed.
    pub lap_time: Option<f64>,
    pub sector1: Option<f64>,
    pub sector2: Option<f64>,
    pub sector3: Option<f64>,
}

/// Raw telemetry for one lap of one driver, column-oriented.
///
/// All channel vectors have the same length as `time`. `time` holds
/// session-time seconds and must be non-decreasing within the lap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LapTrace {
    pub lap: u32,
    pub tyre: TyreCompound,
    #[serde(default)]
    pub summary: LapSummary,
    pub time: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Accumulated distance within this lap, meters.
    pub lap_dist: Vec<f64>,
    pub speed: Vec<f64>,
    pub rpm: Vec<f64>,
    pub throttle: Vec<f64>,
    pub brake: Vec<f64>,
    pub gear: Vec<u8>,
    pub drs: Vec<u8>,
    /// Explicit pit-lane flag per sample, when the provider supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_pit: Option<Vec<bool>>,
}

impl LapTrace {
    pub fn start_time(&self) -> f64 {
        self.time.first().copied().unwrap_or(f64::INFINITY)
    }

    pub fn end_time(&self) -> f64 {
        self.time.last().copied().unwrap_or(f64::NEG_INFINITY)
    }
}

/// Authoritative leaderboard recorded at a lap crossing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LapAnchor {
    pub lap: u32,
    /// Session time of the crossing, seconds.
    pub crossing_time: f64,
    /// Full field in official order at the crossing.
    pub positions: Vec<String>,
}

/// One weather observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    pub time: f64,
    pub air_temp: f64,
    pub track_temp: f64,
    pub wind_speed: f64,
    pub rain_state: bool,
}

/// Time window of one qualifying segment (Q1/Q2/Q3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentWindow {
    pub label: String,
    pub start_time: f64,
    pub end_time: f64,
}

/// Session-level data from the upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSessionInfo {
    pub total_laps: u32,
    pub race_start_time: DateTime<Utc>,
    /// Driver code → grid slot, when the provider has grid data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_positions: Option<BTreeMap<String, u32>>,
    /// Official final classification, full field in finishing order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Vec<String>>,
    /// Session time of the chequered flag, when known. Classification
    /// ordering applies from this point on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race_end_time: Option<f64>,
    #[serde(default)]
    pub track_statuses: Vec<TrackStatus>,
    #[serde(default)]
    pub lap_anchors: Vec<LapAnchor>,
    #[serde(default)]
    pub weather: Vec<WeatherSample>,
    #[serde(default)]
    pub track_geometry: TrackGeometry,
    /// Qualifying segment windows; empty for race-style sessions.
    #[serde(default)]
    pub segments: Vec<SegmentWindow>,
}

/// Opaque upstream fetch: per-lap samples for each entrant plus
/// session-level data. Implementations are free to read from disk, a
/// network API, or a synthetic generator.
pub trait SessionSource: Send + Sync {
    fn entrants(&self) -> PipelineResult<Vec<Entrant>>;

    /// Lap telemetry for one driver, in chronological order.
    fn laps(&self, code: &str) -> PipelineResult<Vec<LapTrace>>;

    fn session_info(&self) -> PipelineResult<RawSessionInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lap_trace_deserializes_with_optional_fields_absent() {
        // The shape providers actually dump: no summary, no pit flags.
        let json = r#"{
            "lap": 3,
            "tyre": "M",
            "time": [100.0, 100.5],
            "x": [0.0, 1.0],
            "y": [0.0, -1.0],
            "lap_dist": [0.0, 40.0],
            "speed": [280.0, 282.0],
            "rpm": [11000.0, 11100.0],
            "throttle": [100.0, 100.0],
            "brake": [0.0, 0.0],
            "gear": [7, 7],
            "drs": [0, 12]
        }"#;

        let lap: LapTrace = serde_json::from_str(json).unwrap();
        assert_eq!(lap.lap, 3);
        assert_eq!(lap.tyre, TyreCompound::Medium);
        assert_eq!(lap.summary.lap_time, None);
        assert!(lap.in_pit.is_none());
        assert_eq!(lap.start_time(), 100.0);
        assert_eq!(lap.end_time(), 100.5);
    }

    #[test]
    fn session_info_defaults_optional_collections() {
        let json = r#"{
            "total_laps": 57,
            "race_start_time": "2024-05-05T14:00:00Z"
        }"#;

        let info: RawSessionInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.total_laps, 57);
        assert!(info.grid_positions.is_none());
        assert!(info.classification.is_none());
        assert!(info.track_statuses.is_empty());
        assert!(info.lap_anchors.is_empty());
        assert!(info.segments.is_empty());
    }

    #[test]
    fn empty_lap_trace_times_are_inert() {
        let lap = LapTrace {
            lap: 1,
            tyre: TyreCompound::Unknown,
            summary: LapSummary::default(),
            time: Vec::new(),
            x: Vec::new(),
            y: Vec::new(),
            lap_dist: Vec::new(),
            speed: Vec::new(),
            rpm: Vec::new(),
            throttle: Vec::new(),
            brake: Vec::new(),
            gear: Vec::new(),
            drs: Vec::new(),
            in_pit: None,
        };
        assert!(lap.start_time().is_infinite());
        assert!(lap.end_time().is_infinite());
    }
}
