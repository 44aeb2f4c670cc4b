//! # Replay Core - Telemetry Replay Domain Model
//!
//! Core data model for the telemetry replay engine.
//!
//! ## What This Library Provides
//!
//! - **Session identity** (`SessionKey`, `SessionType`) and lifecycle state
//! - **Frame model** (`Frame`, `DriverSample`, `Weather`)
//! - **Session metadata** (driver colors/numbers/teams, track geometry)
//! - **Track status intervals** (safety car, VSC, red flag)
//! - **Binary frame codec** (compact map-based encoding for the wire)
//!
//! ## What This Library Does NOT Provide
//!
//! - Telemetry processing (see `replay-pipeline` crate)
//! - Session orchestration and streaming (see `replay-server` crate)
//! - I/O operations of any kind
//!
//! This is a pure logic library with zero I/O dependencies.
//!
//! ## Example Usage
//!
//! ```rust
//! use replay_core::{SessionKey, SessionType, FRAME_DT};
//!
//! let key: SessionKey = "2024_6_R".parse().unwrap();
//! assert_eq!(key.year, 2024);
//! assert_eq!(key.session_type, SessionType::Race);
//! assert_eq!(key.to_string(), "2024_6_R");
//!
//! // Frames are sampled on a fixed 25 Hz timeline
//! assert_eq!(FRAME_DT, 0.04);
//! ```

pub mod codec;
pub mod error;
pub mod frame;
pub mod metadata;
pub mod types;

// Re-export commonly used items at crate root
pub use codec::{WireDriver, WireFrame, WireWeather, decode_frame, encode_frame};
pub use error::*;
pub use frame::{DriverSample, Frame, Weather};
pub use metadata::{PitLaneBounds, SessionMetadata, TrackGeometry};
pub use types::*;
