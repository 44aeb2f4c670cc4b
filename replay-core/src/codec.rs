//! Binary frame codec.
//!
//! Frames cross the wire as compact MessagePack maps (one binary WebSocket
//! message per frame). The encoding is self-describing: field names are
//! carried in the payload, integers use the minimum width MessagePack
//! allows, and decoders ignore unknown fields so the format can grow
//! without breaking older clients.
//!
//! Non-finite numeric inputs (NaN, ±inf) are coerced to 0 before encoding.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::CodecResult;
use crate::frame::{DriverSample, Frame, Weather};
use crate::types::{DriverStatus, TyreCompound};

/// On-wire shape of one driver inside a frame payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDriver {
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub gear: u8,
    pub lap: u32,
    pub position: u32,
    pub tyre: TyreCompound,
    pub throttle: f64,
    pub brake: f64,
    pub drs: u8,
    pub dist: f64,
    pub rel_dist: f64,
    pub race_progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lap_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector3: Option<f64>,
    pub status: DriverStatus,
}

/// On-wire weather snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireWeather {
    pub air_temp: f64,
    pub track_temp: f64,
    pub wind_speed: f64,
    pub rain_state: bool,
}

/// On-wire shape of one frame payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub frame_index: u32,
    pub t: f64,
    /// Current lap of the race leader.
    pub lap: u32,
    pub drivers: BTreeMap<String, WireDriver>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<WireWeather>,
}

impl WireFrame {
    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// Coerce non-finite values to 0 so a single bad upstream sample cannot
/// poison a client-side renderer.
fn finite(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

fn finite_opt(value: Option<f64>) -> Option<f64> {
    value.map(finite)
}

fn wire_driver(sample: &DriverSample) -> WireDriver {
    WireDriver {
        x: finite(sample.x),
        y: finite(sample.y),
        speed: finite(sample.speed),
        gear: sample.gear,
        lap: sample.lap,
        position: sample.position,
        tyre: sample.tyre,
        throttle: finite(sample.throttle),
        brake: finite(sample.brake),
        drs: sample.drs,
        dist: finite(sample.dist),
        rel_dist: finite(sample.rel_dist),
        race_progress: finite(sample.race_progress),
        lap_time: finite_opt(sample.lap_time),
        sector1: finite_opt(sample.sector1),
        sector2: finite_opt(sample.sector2),
        sector3: finite_opt(sample.sector3),
        status: sample.status,
    }
}

fn wire_weather(weather: &Weather) -> WireWeather {
    WireWeather {
        air_temp: finite(weather.air_temp),
        track_temp: finite(weather.track_temp),
        wind_speed: finite(weather.wind_speed),
        rain_state: weather.rain_state,
    }
}

/// Encode frame `index` as a binary wire payload.
pub fn encode_frame(index: u32, frame: &Frame) -> CodecResult<Vec<u8>> {
    let wire = WireFrame {
        frame_index: index,
        t: finite(frame.t),
        lap: frame.leader_lap,
        drivers: frame
            .drivers
            .iter()
            .map(|(code, sample)| (code.clone(), wire_driver(sample)))
            .collect(),
        weather: frame.weather.as_ref().map(wire_weather),
    };
    wire.to_bytes()
}

/// Decode a binary frame payload.
pub fn decode_frame(bytes: &[u8]) -> CodecResult<WireFrame> {
    WireFrame::from_bytes(bytes)
}
