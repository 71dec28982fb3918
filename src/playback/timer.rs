//! Cancellable repeating frame timer.
//!
//! The underlying tokio interval is created lazily on the first wait, so
//! the timer can be started and cancelled outside of a runtime. A
//! cancelled timer never fires; waiting on it stays pending.
//!
//! Periods shorter than [`MIN_FRAME_PERIOD`] are raised to it.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::warn;

/// Shortest period the timer runs at.
pub const MIN_FRAME_PERIOD: Duration = Duration::from_millis(1);

fn clamp_period(period: Duration) -> Duration {
    if period < MIN_FRAME_PERIOD {
        warn!(requested = ?period, used = ?MIN_FRAME_PERIOD, "frame period too short, clamped");
        MIN_FRAME_PERIOD
    } else {
        period
    }
}

#[derive(Debug)]
pub struct FrameTimer {
    period: Duration,
    started_at: Option<Instant>,
    interval: Option<Interval>,
}

impl FrameTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period: clamp_period(period),
            started_at: None,
            interval: None,
        }
    }

    /// Arm the timer; the first tick fires one period from now.
    ///
    /// Restarting an armed timer replaces its schedule.
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
        self.interval = None;
    }

    pub fn cancel(&mut self) {
        self.started_at = None;
        self.interval = None;
    }

    pub fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Change the period; an armed timer restarts with the new period.
    pub fn set_period(&mut self, period: Duration) {
        self.period = clamp_period(period);
        if self.is_active() {
            self.start();
        }
    }

    /// Wait for the next tick.
    pub async fn wait(&mut self) {
        let Some(started_at) = self.started_at else {
            return std::future::pending().await;
        };

        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = interval_at(started_at + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        interval.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_period() {
        let mut timer = FrameTimer::new(Duration::from_millis(100));
        let start = Instant::now();
        timer.start();

        timer.wait().await;
        assert_eq!(start.elapsed(), Duration::from_millis(100));
        timer.wait().await;
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let mut timer = FrameTimer::new(Duration::from_millis(100));
        timer.start();
        timer.cancel();
        assert!(!timer.is_active());

        let fired = tokio::time::timeout(Duration::from_secs(10), timer.wait()).await;
        assert!(fired.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_is_clamped() {
        let mut timer = FrameTimer::new(Duration::ZERO);
        assert_eq!(timer.period(), MIN_FRAME_PERIOD);

        timer.set_period(Duration::ZERO);
        let start = Instant::now();
        timer.start();
        timer.wait().await;
        assert_eq!(start.elapsed(), MIN_FRAME_PERIOD);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_schedule() {
        let mut timer = FrameTimer::new(Duration::from_millis(100));
        timer.start();
        tokio::time::sleep(Duration::from_millis(70)).await;

        let restarted = Instant::now();
        timer.set_period(Duration::from_millis(50));
        timer.wait().await;
        assert_eq!(restarted.elapsed(), Duration::from_millis(50));
    }
}
