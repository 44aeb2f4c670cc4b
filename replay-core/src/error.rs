use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("Malformed session id: {0} (expected year_round_type, e.g. 2024_6_R)")]
    Malformed(String),

    #[error("Invalid year in session id: {0}")]
    InvalidYear(String),

    #[error("Invalid round in session id: {0}")]
    InvalidRound(String),

    #[error("Invalid session type in session id: {0} (expected R, S or Q)")]
    InvalidSessionType(String),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Frame encoding failed")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Frame decoding failed")]
    Decode(#[from] rmp_serde::decode::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;
