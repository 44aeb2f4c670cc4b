use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::KeyParseError;

/// Frame period in seconds: frames are sampled at 25 Hz.
pub const FRAME_DT: f64 = 0.04;

/// Frame cadence in Hz.
pub const FRAME_RATE_HZ: f64 = 25.0;

/// The kind of session a replay is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionType {
    #[serde(rename = "R")]
    Race,
    #[serde(rename = "S")]
    Sprint,
    #[serde(rename = "Q")]
    Qualifying,
}

impl SessionType {
    /// Single-letter code used in session ids and cache file names.
    pub fn code(&self) -> &'static str {
        match self {
            SessionType::Race => "R",
            SessionType::Sprint => "S",
            SessionType::Qualifying => "Q",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "R" => Some(SessionType::Race),
            "S" => Some(SessionType::Sprint),
            "Q" => Some(SessionType::Qualifying),
            _ => None,
        }
    }

    /// Race-style sessions stream a global frame sequence; qualifying
    /// delivers per-segment fastest laps instead.
    pub fn streams_frames(&self) -> bool {
        !matches!(self, SessionType::Qualifying)
    }
}

/// Identity of one session: `(year, round, session_type)`.
///
/// The canonical string form doubles as the public session id and as the
/// WebSocket path segment: `2024_6_R`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub year: u16,
    pub round: u8,
    pub session_type: SessionType,
}

impl SessionKey {
    pub fn new(year: u16, round: u8, session_type: SessionType) -> Self {
        Self {
            year,
            round,
            session_type,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.year,
            self.round,
            self.session_type.code()
        )
    }
}

impl FromStr for SessionKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('_');
        let (Some(year), Some(round), Some(code), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(KeyParseError::Malformed(s.to_string()));
        };

        let year: u16 = year
            .parse()
            .map_err(|_| KeyParseError::InvalidYear(year.to_string()))?;
        let round: u8 = round
            .parse()
            .map_err(|_| KeyParseError::InvalidRound(round.to_string()))?;
        let session_type = SessionType::from_code(code)
            .ok_or_else(|| KeyParseError::InvalidSessionType(code.to_string()))?;

        Ok(SessionKey {
            year,
            round,
            session_type,
        })
    }
}

/// Lifecycle state of a session load.
///
/// Transitions are one-way: Init → Loading → Ready | Error. A refresh
/// destroys the session and starts over with a fresh entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingState {
    Init,
    Loading,
    Ready,
    Error,
}

impl LoadingState {
    pub fn name(&self) -> &'static str {
        match self {
            LoadingState::Init => "init",
            LoadingState::Loading => "loading",
            LoadingState::Ready => "ready",
            LoadingState::Error => "error",
        }
    }

    /// Loading is settled once the session is Ready or failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadingState::Ready | LoadingState::Error)
    }
}

/// Per-frame activity state of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverStatus {
    Running,
    InPit,
    Retired,
}

/// Tyre compound fitted for a stint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TyreCompound {
    #[serde(rename = "S")]
    Soft,
    #[serde(rename = "M")]
    Medium,
    #[serde(rename = "H")]
    Hard,
    #[serde(rename = "I")]
    Intermediate,
    #[serde(rename = "W")]
    Wet,
    #[serde(rename = "U")]
    Unknown,
}

impl TyreCompound {
    pub fn code(&self) -> &'static str {
        match self {
            TyreCompound::Soft => "S",
            TyreCompound::Medium => "M",
            TyreCompound::Hard => "H",
            TyreCompound::Intermediate => "I",
            TyreCompound::Wet => "W",
            TyreCompound::Unknown => "U",
        }
    }
}

/// Race-control status code for an interval of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatusCode {
    Green,
    Yellow,
    SafetyCar,
    VirtualSafetyCar,
    RedFlag,
}

impl TrackStatusCode {
    /// Under SC/VSC/red the field is neutralized: the position hysteresis
    /// layer is suspended so official order changes propagate immediately.
    pub fn is_neutralized(&self) -> bool {
        matches!(
            self,
            TrackStatusCode::SafetyCar
                | TrackStatusCode::VirtualSafetyCar
                | TrackStatusCode::RedFlag
        )
    }
}

/// One race-control interval. `end_time` is `None` while the status is
/// still open (e.g. a red flag that never lifted in the source data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackStatus {
    pub start_time: f64,
    pub end_time: Option<f64>,
    pub code: TrackStatusCode,
}

impl TrackStatus {
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start_time && self.end_time.is_none_or(|end| t < end)
    }
}

/// The effective track status at time `t`, given intervals ordered by
/// start time. Overlapping intervals resolve to the latest one started.
pub fn status_at(statuses: &[TrackStatus], t: f64) -> TrackStatusCode {
    statuses
        .iter()
        .rev()
        .find(|s| s.contains(t))
        .map(|s| s.code)
        .unwrap_or(TrackStatusCode::Green)
}
