//! # Replay Server
//!
//! Session orchestration and streaming for the telemetry replay engine:
//! a keyed session registry with a progress event bus, background loading
//! on the CPU worker pool, an on-disk frame cache, and a per-client
//! WebSocket gateway that multiplexes loading events and binary frames.

pub mod api;
pub mod cache;
pub mod playback;
pub mod providers;
pub mod session;
