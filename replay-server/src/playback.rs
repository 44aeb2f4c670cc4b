//! Playback cursor state.
//!
//! The WebSocket handler ticks at ~60 Hz while frames advance at 25 Hz;
//! the cursor is fractional and a frame is sent only when its integer
//! index changes. All of this is pure state so the timing-free parts of
//! the playback loop stay unit-testable.

use replay_contracts::ClientCommand;

/// Handler ticks per second.
pub const TICK_HZ: f64 = 60.0;

/// Cursor advance per tick at speed 1.0: maps the 60 Hz wall clock onto
/// the 25 Hz frame cadence.
pub const FRAMES_PER_TICK: f64 = replay_core::FRAME_RATE_HZ / TICK_HZ;

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub frame_cursor: f64,
    pub speed: f64,
    pub is_playing: bool,
    /// Index of the frame most recently sent; -1 forces a resend.
    pub last_sent: i64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackState {
    pub fn new() -> Self {
        Self {
            frame_cursor: 0.0,
            speed: 1.0,
            is_playing: false,
            last_sent: -1,
        }
    }

    /// Apply one client control message.
    pub fn apply(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Play { speed } => {
                if speed.is_finite() && speed > 0.0 {
                    self.speed = speed;
                }
                self.is_playing = true;
            }
            ClientCommand::Pause => {
                self.is_playing = false;
            }
            ClientCommand::Seek { frame } => {
                self.frame_cursor = frame as f64;
                // Force the seeked frame out even if the index is unchanged.
                self.last_sent = -1;
            }
        }
    }

    /// Advance one tick against a sequence of `total` frames. Returns the
    /// index to send now, if any.
    pub fn tick(&mut self, total: usize) -> Option<usize> {
        if total == 0 {
            // Nothing to play; seeks and plays against an empty session
            // are no-ops.
            self.is_playing = false;
            return None;
        }

        if self.is_playing {
            self.frame_cursor += self.speed * FRAMES_PER_TICK;
        }

        // Past the end: clamp and pause.
        if self.frame_cursor >= total as f64 {
            self.frame_cursor = (total - 1) as f64;
            self.is_playing = false;
        }
        if self.frame_cursor < 0.0 {
            self.frame_cursor = 0.0;
        }

        let index = self.frame_cursor.floor() as usize;
        if index as i64 != self.last_sent && index < total {
            self.last_sent = index as i64;
            Some(index)
        } else {
            None
        }
    }
}
