//! Frame sequence builder
//!
//! Walks a date range one day at a time and asks the snapshot fetcher for
//! each frame. Fetches run strictly one after another, so frames are
//! appended in date order and progress only ever moves forward.
//!
//! A failed date is logged and skipped. Cancellation bumps a generation
//! token that the loop checks before and after every fetch; whatever was
//! built up to that point is returned with status `Cancelled`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::cache::{CacheStats, FrameCache, FrameKey};
use super::fetch::SnapshotFetcher;
use super::frame::{BuildStatus, FramePayload, FrameSequence};
use super::range::DateRange;
use crate::config::EngineConfig;
use crate::error::{Result, SequenceFetchError, TerraError};
use crate::layers::Viewport;

// ============================================================================
// Progress and reports
// ============================================================================

/// Snapshot of a running (or finished) build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildProgress {
    /// 1-based position of the date being fetched; 0 before the first.
    pub position: usize,
    pub requested: usize,
    pub built: usize,
    pub failed: usize,
    pub current_date: Option<NaiveDate>,
    pub status: BuildStatus,
}

impl BuildProgress {
    fn idle() -> Self {
        Self {
            position: 0,
            requested: 0,
            built: 0,
            failed: 0,
            current_date: None,
            status: BuildStatus::Idle,
        }
    }

    /// Rounded percentage of dates reached so far.
    pub fn percent(&self) -> u8 {
        if self.requested == 0 {
            return 0;
        }
        ((self.position * 100 + self.requested / 2) / self.requested).min(100) as u8
    }

    pub fn message(&self) -> String {
        match self.status {
            BuildStatus::Idle => "Idle".to_string(),
            BuildStatus::Building => format!(
                "Fetching frame {} of {} ({}%)",
                self.position,
                self.requested,
                self.percent()
            ),
            BuildStatus::Complete => build_summary(self.built),
            BuildStatus::Cancelled => format!("Build cancelled after {} frames", self.built),
        }
    }
}

fn build_summary(built: usize) -> String {
    if built > 0 {
        format!("Built {built} frames successfully")
    } else {
        "No frames were built. Please check your date range and try again.".to_string()
    }
}

/// Result of one build run.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub run_id: Uuid,
    pub sequence: FrameSequence,
    /// Dates that were attempted and skipped, in date order.
    pub failures: Vec<SequenceFetchError>,
    pub cache_hits: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BuildReport {
    pub fn summary(&self) -> String {
        match self.sequence.status {
            BuildStatus::Cancelled => {
                format!("Build cancelled after {} frames", self.sequence.built_count)
            }
            _ => build_summary(self.sequence.built_count),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.sequence.status == BuildStatus::Cancelled
    }
}

/// Clears the building flag however the run ends.
struct BuildGuard<'a>(&'a AtomicBool);

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Builder
// ============================================================================

pub struct FrameSequenceBuilder<F: SnapshotFetcher> {
    fetcher: F,
    cache: Mutex<FrameCache>,
    generation: AtomicU64,
    building: AtomicBool,
    progress: watch::Sender<BuildProgress>,
    max_range_days: usize,
}

impl<F: SnapshotFetcher> FrameSequenceBuilder<F> {
    pub fn new(fetcher: F, cache_capacity: usize, max_range_days: usize) -> Self {
        let (progress, _) = watch::channel(BuildProgress::idle());
        Self {
            fetcher,
            cache: Mutex::new(FrameCache::new(cache_capacity)),
            generation: AtomicU64::new(0),
            building: AtomicBool::new(false),
            progress,
            max_range_days,
        }
    }

    pub fn from_config(fetcher: F, config: &EngineConfig) -> Self {
        Self::new(fetcher, config.cache_capacity, config.max_range_days)
    }

    /// Build one frame per day of `range`.
    ///
    /// Rejected up front when the range is too long or another build is
    /// running. Individual date failures never fail the build.
    pub async fn build(&self, range: DateRange, viewport: &Viewport) -> Result<BuildReport> {
        if range.day_count() > self.max_range_days {
            return Err(TerraError::invalid_range(format!(
                "range of {} days exceeds the maximum of {}",
                range.day_count(),
                self.max_range_days
            )));
        }
        if self
            .building
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TerraError::BuildInProgress);
        }
        let _guard = BuildGuard(&self.building);

        let generation = self.generation.load(Ordering::SeqCst);
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "frame_build",
            %run_id,
            start = %range.start(),
            end = %range.end(),
            days = range.day_count()
        );

        Ok(self.run(range, viewport, generation, run_id).instrument(span).await)
    }

    async fn run(
        &self,
        range: DateRange,
        viewport: &Viewport,
        generation: u64,
        run_id: Uuid,
    ) -> BuildReport {
        let started_at = Utc::now();
        let scene = self.fetcher.scene_key(viewport);
        let mut sequence = FrameSequence::new(&range);
        let mut failures = Vec::new();
        let mut cache_hits = 0;
        let mut progress = BuildProgress {
            requested: sequence.requested_count,
            status: BuildStatus::Building,
            ..BuildProgress::idle()
        };

        sequence.status = BuildStatus::Building;
        info!(requested = sequence.requested_count, "frame build started");

        for (index, date) in range.dates().enumerate() {
            if self.is_cancelled(generation) {
                sequence.status = BuildStatus::Cancelled;
                break;
            }

            progress.position = index + 1;
            progress.current_date = Some(date);
            self.progress.send_replace(progress.clone());
            debug!("{}", progress.message());

            let key = FrameKey::new(scene.clone(), date);
            let cached = self.lock_cache().get(&key);
            let outcome = match cached {
                Some(payload) => {
                    cache_hits += 1;
                    Ok(Some(payload))
                }
                None => self.fetcher.fetch_snapshot(date, viewport).await,
            };

            // The fetch may have outlived a cancel; its result is dropped.
            if self.is_cancelled(generation) {
                sequence.status = BuildStatus::Cancelled;
                break;
            }

            match outcome {
                Ok(Some(payload)) => self.append(&mut sequence, key, payload),
                Ok(None) => failures.push(self.skip(date, "no snapshot available".to_string())),
                Err(e) => failures.push(self.skip(date, e.to_string())),
            }
            progress.built = sequence.built_count;
            progress.failed = failures.len();
        }

        if sequence.status == BuildStatus::Building {
            sequence.status = BuildStatus::Complete;
        }
        progress.status = sequence.status;
        progress.built = sequence.built_count;
        self.progress.send_replace(progress.clone());

        info!(
            status = %sequence.status,
            built = sequence.built_count,
            failed = failures.len(),
            cache_hits,
            "{}",
            progress.message()
        );

        BuildReport {
            run_id,
            sequence,
            failures,
            cache_hits,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn append(&self, sequence: &mut FrameSequence, key: FrameKey, payload: FramePayload) {
        let date = key.date;
        self.lock_cache().insert(key, payload.clone());
        if !sequence.push_frame(date, payload) {
            warn!(%date, "frame out of order, dropped");
        }
    }

    fn skip(&self, date: NaiveDate, reason: String) -> SequenceFetchError {
        warn!(%date, %reason, "skipping date");
        SequenceFetchError { date, reason }
    }

    fn is_cancelled(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, FrameCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel the running build, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let running = self.is_building();
        if running {
            info!("frame build cancellation requested");
        }
        running
    }

    pub fn is_building(&self) -> bool {
        self.building.load(Ordering::SeqCst)
    }

    /// Progress updates of current and future builds.
    pub fn subscribe(&self) -> watch::Receiver<BuildProgress> {
        self.progress.subscribe()
    }

    pub fn progress(&self) -> BuildProgress {
        self.progress.borrow().clone()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }
}
