use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{SessionKey, SessionType};

/// Axis-aligned bounds of the pit lane in track-local coordinates.
///
/// Used as the geometric fallback for pit detection when the upstream
/// provider carries no explicit in-pit flag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitLaneBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl PitLaneBounds {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// Track shape shipped to clients for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrackGeometry {
    /// Centerline vertices `[x, y]` in track-local units.
    pub centerline: Vec<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pit_lane: Option<PitLaneBounds>,
}

/// Immutable-after-load description of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub year: u16,
    pub round: u8,
    pub session_type: SessionType,
    pub total_laps: u32,
    pub race_start_time: DateTime<Utc>,
    /// Length of one lap in meters, derived from the fastest lap.
    pub circuit_length: f64,
    /// Driver code → RGB.
    pub driver_colors: BTreeMap<String, [u8; 3]>,
    pub driver_numbers: BTreeMap<String, u32>,
    pub driver_teams: BTreeMap<String, String>,
    pub track_geometry: TrackGeometry,
}

impl SessionMetadata {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.year, self.round, self.session_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pit_lane_bounds_containment() {
        let bounds = PitLaneBounds {
            min_x: -10.0,
            min_y: 0.0,
            max_x: 10.0,
            max_y: 50.0,
        };

        assert!(bounds.contains(0.0, 25.0));
        assert!(bounds.contains(-10.0, 0.0));
        assert!(!bounds.contains(11.0, 25.0));
        assert!(!bounds.contains(0.0, -1.0));
    }

    #[test]
    fn metadata_key_round_trip() {
        let metadata = SessionMetadata {
            year: 2024,
            round: 6,
            session_type: SessionType::Race,
            total_laps: 57,
            race_start_time: Utc::now(),
            circuit_length: 5412.0,
            driver_colors: BTreeMap::new(),
            driver_numbers: BTreeMap::new(),
            driver_teams: BTreeMap::new(),
            track_geometry: TrackGeometry::default(),
        };

        assert_eq!(metadata.key().to_string(), "2024_6_R");
    }
}
