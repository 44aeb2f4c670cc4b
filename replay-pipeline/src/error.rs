use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Upstream fetch failed: {0}")]
    Source(String),

    #[error("No entrants in session data")]
    NoEntrants,

    #[error("Driver {driver} has no telemetry samples")]
    EmptyTelemetry { driver: String },

    #[error("Driver {driver} lap {lap}: telemetry time is not non-decreasing")]
    NonMonotonicLap { driver: String, lap: u32 },

    #[error("Driver {driver} lap {lap}: {channel} channel length does not match time channel")]
    ChannelLengthMismatch {
        driver: String,
        lap: u32,
        channel: &'static str,
    },

    #[error(
        "Driver {driver}: lap {lap} starts before the previous lap ended (overlapping lap telemetry)"
    )]
    LapOverlap { driver: String, lap: u32 },

    #[error("Driver {driver}: concatenated telemetry time is not monotonic")]
    NonMonotonicConcat { driver: String },

    #[error("Qualifying session has no segment windows")]
    NoSegments,
}

pub type PipelineResult<T> = Result<T, PipelineError>;
