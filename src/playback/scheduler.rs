//! Playback scheduler
//!
//! Timer-driven loop over a built frame sequence.
//!
//! States: `Stopped -> Playing <-> Paused -> Stopped`. Every tick advances
//! the current index (wrapping when looping) and hands the new frame to the
//! registered callbacks. A callback failure is logged and counted; it never
//! stops the timer. Jumping to a frame cancels the timer and leaves the
//! session paused, so at most one timer is ever active per session.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::timer::FrameTimer;
use crate::config::EngineConfig;
use crate::error::{PlaybackError, Result};
use crate::sequence::{BuildStatus, Frame, FrameSequence};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// What a `play()` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayStatus {
    Started,
    AlreadyPlaying,
    NothingToPlay,
}

impl PlayStatus {
    /// The reported condition, if any.
    pub fn condition(self) -> Option<PlaybackError> {
        match self {
            PlayStatus::NothingToPlay => Some(PlaybackError::NothingToPlay),
            _ => None,
        }
    }
}

/// The frame a callback is asked to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameChange {
    pub session_id: Uuid,
    pub index: usize,
    pub date: NaiveDate,
    pub frame: Frame,
}

pub type FrameCallback = Box<dyn FnMut(&FrameChange) -> Result<()> + Send>;

/// Per-run playback state; replaced on `stop()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSession {
    pub id: Uuid,
    pub current_index: usize,
    pub interval: Duration,
    pub state: PlaybackState,
    pub loop_playback: bool,
}

impl PlaybackSession {
    fn new(interval: Duration, loop_playback: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            current_index: 0,
            interval,
            state: PlaybackState::Stopped,
            loop_playback,
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct PlaybackScheduler {
    sequence: Arc<FrameSequence>,
    session: PlaybackSession,
    timer: FrameTimer,
    callbacks: Vec<FrameCallback>,
    /// Set when a non-looping run reached its last frame.
    finished: bool,
    render_failures: u64,
}

impl PlaybackScheduler {
    /// Scheduler bound to an empty sequence.
    pub fn new(interval: Duration, loop_playback: bool) -> Self {
        let empty = FrameSequence {
            start_date: NaiveDate::MIN,
            end_date: NaiveDate::MIN,
            frames: Vec::new(),
            requested_count: 0,
            built_count: 0,
            status: BuildStatus::Idle,
        };
        let timer = FrameTimer::new(interval);
        Self {
            sequence: Arc::new(empty),
            session: PlaybackSession::new(timer.period(), loop_playback),
            timer,
            callbacks: Vec::new(),
            finished: false,
            render_failures: 0,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.frame_interval(), config.loop_playback)
    }

    /// Replace the sequence; any running playback is stopped.
    pub fn bind(&mut self, sequence: Arc<FrameSequence>) {
        self.stop();
        debug!(frames = sequence.len(), "sequence bound");
        self.sequence = sequence;
    }

    pub fn on_frame_changed<C>(&mut self, callback: C)
    where
        C: FnMut(&FrameChange) -> Result<()> + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    pub fn play(&mut self) -> PlayStatus {
        if self.session.state == PlaybackState::Playing {
            return PlayStatus::AlreadyPlaying;
        }
        if self.sequence.is_empty() {
            warn!("{}", PlaybackError::NothingToPlay);
            return PlayStatus::NothingToPlay;
        }

        if self.finished {
            self.session.current_index = 0;
            self.finished = false;
        }
        self.timer.start();
        self.session.state = PlaybackState::Playing;
        info!(
            session = %self.session.id,
            index = self.session.current_index,
            interval_ms = self.session.interval.as_millis() as u64,
            "playback started"
        );
        PlayStatus::Started
    }

    pub fn pause(&mut self) {
        self.timer.cancel();
        if self.session.state == PlaybackState::Playing {
            self.session.state = PlaybackState::Paused;
            debug!(index = self.session.current_index, "playback paused");
        }
    }

    /// Cancel the timer and reset to the first frame.
    pub fn stop(&mut self) {
        self.timer.cancel();
        if self.session.state != PlaybackState::Stopped {
            debug!(session = %self.session.id, "playback stopped");
        }
        self.session = PlaybackSession::new(self.session.interval, self.session.loop_playback);
        self.finished = false;
    }

    /// Show frame `index` (clamped) once and pause.
    ///
    /// Returns the index shown, or `None` for an empty sequence.
    pub fn jump_to_frame(&mut self, index: usize) -> Option<usize> {
        if self.sequence.is_empty() {
            return None;
        }
        self.timer.cancel();

        let index = index.min(self.sequence.len() - 1);
        self.session.current_index = index;
        self.session.state = PlaybackState::Paused;
        self.finished = false;
        self.emit();
        Some(index)
    }

    /// Advance one frame as a timer tick would.
    ///
    /// Does nothing unless playing.
    pub fn tick(&mut self) -> Option<FrameChange> {
        if self.session.state != PlaybackState::Playing || self.sequence.is_empty() {
            return None;
        }

        let len = self.sequence.len();
        let next = self.session.current_index + 1;
        let index = if next < len {
            next
        } else if self.session.loop_playback {
            0
        } else {
            self.finish();
            return None;
        };

        self.session.current_index = index;
        let change = self.emit();
        if !self.session.loop_playback && index == len - 1 {
            self.finish();
        }
        change
    }

    /// Wait for the timer and advance. Pending while the timer is inactive.
    pub async fn next_tick(&mut self) -> Option<FrameChange> {
        self.timer.wait().await;
        self.tick()
    }

    /// Change the tick interval; intervals below the timer minimum are raised to it.
    pub fn set_interval(&mut self, interval: Duration) {
        self.timer.set_period(interval);
        self.session.interval = self.timer.period();
    }

    pub fn set_loop(&mut self, loop_playback: bool) {
        self.session.loop_playback = loop_playback;
    }

    fn finish(&mut self) {
        self.timer.cancel();
        self.session.state = PlaybackState::Paused;
        self.finished = true;
        info!(index = self.session.current_index, "playback reached the last frame");
    }

    fn emit(&mut self) -> Option<FrameChange> {
        let frame = self.sequence.get(self.session.current_index)?.clone();
        let change = FrameChange {
            session_id: self.session.id,
            index: self.session.current_index,
            date: frame.date,
            frame,
        };

        for callback in &mut self.callbacks {
            if let Err(e) = callback(&change) {
                self.render_failures += 1;
                warn!(index = change.index, date = %change.date, error = %e, "frame render failed");
            }
        }
        Some(change)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn state(&self) -> PlaybackState {
        self.session.state
    }

    /// Current frame index; `None` for an empty sequence.
    pub fn current_index(&self) -> Option<usize> {
        (!self.sequence.is_empty()).then_some(self.session.current_index)
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.sequence.get(self.session.current_index)
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn sequence(&self) -> &Arc<FrameSequence> {
        &self.sequence
    }

    pub fn is_timer_active(&self) -> bool {
        self.timer.is_active()
    }

    /// Callback failures since the scheduler was created.
    pub fn render_failures(&self) -> u64 {
        self.render_failures
    }
}
