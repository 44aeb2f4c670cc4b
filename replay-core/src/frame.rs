use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{DriverStatus, TyreCompound};

/// One driver's state at a single timeline sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSample {
    /// Position on track in local track units.
    pub x: f64,
    pub y: f64,
    /// Accumulated race distance in meters.
    pub dist: f64,
    /// Fraction of the current lap completed, clamped to [0, 1].
    pub rel_dist: f64,
    /// Cumulative position proxy: `(lap - 1) * L + rel_dist * L`.
    /// Frozen while the driver is in the pit lane.
    pub race_progress: f64,
    pub lap: u32,
    pub tyre: TyreCompound,
    /// Speed in km/h.
    pub speed: f64,
    /// Gear, 0 (neutral) through 8.
    pub gear: u8,
    /// DRS state code as reported upstream.
    pub drs: u8,
    /// Throttle application, 0-100.
    pub throttle: f64,
    /// Brake application, 0-100.
    pub brake: f64,
    pub rpm: f64,
    /// Race position, 1..N. Assigned during frame assembly.
    pub position: u32,
    pub status: DriverStatus,
    /// Most recent completed lap time in milliseconds, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lap_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector3: Option<f64>,
}

/// Weather snapshot attached to a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub air_temp: f64,
    pub track_temp: f64,
    pub wind_speed: f64,
    pub rain_state: bool,
}

/// A single timeline sample: every entrant's state at absolute time `t`
/// (seconds from session start).
///
/// Across consecutive frames `t` is strictly increasing with fixed step
/// [`crate::FRAME_DT`], and every frame carries the same set of driver
/// codes (retired drivers stay present, flagged `Retired`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub t: f64,
    /// Current lap of the race leader.
    pub leader_lap: u32,
    /// Driver code → sample. BTreeMap keeps encoding deterministic.
    pub drivers: BTreeMap<String, DriverSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<Weather>,
}

impl Frame {
    /// The driver currently holding position 1, if any driver is present.
    pub fn leader(&self) -> Option<(&str, &DriverSample)> {
        self.drivers
            .iter()
            .find(|(_, sample)| sample.position == 1)
            .map(|(code, sample)| (code.as_str(), sample))
    }
}
