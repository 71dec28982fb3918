//! Playback Module
//!
//! Timer-driven animation over built frame sequences:
//! - Cancellable repeating frame timer
//! - Play / pause / stop / jump scheduler with wraparound

pub mod scheduler;
pub mod timer;

pub use scheduler::{
    FrameCallback, FrameChange, PlayStatus, PlaybackScheduler, PlaybackSession, PlaybackState,
};
pub use timer::{FrameTimer, MIN_FRAME_PERIOD};
