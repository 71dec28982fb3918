//! Playback Tests
//!
//! Scheduler state machine and timer behavior on a paused tokio clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use test_case::test_case;
use tokio::time::{timeout, Instant};

use terratime::playback::{PlayStatus, PlaybackScheduler, PlaybackState, MIN_FRAME_PERIOD};
use terratime::sequence::{parse_date, DateRange, FramePayload, FrameSequence, TileReference};

const INTERVAL: Duration = Duration::from_millis(250);

fn sequence(frames: usize) -> Arc<FrameSequence> {
    let range = DateRange::parse("2024-09-01", "2024-09-30").unwrap();
    let mut seq = FrameSequence::new(&range);
    for date in range.dates().take(frames) {
        seq.push_frame(
            date,
            FramePayload::Tiles(vec![TileReference {
                layer_id: "sst".to_string(),
                url: format!("https://tiles.example/sst/{date}/{{z}}/{{y}}/{{x}}.png"),
            }]),
        );
    }
    Arc::new(seq)
}

fn recorded(scheduler: &mut PlaybackScheduler) -> Arc<Mutex<Vec<usize>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    scheduler.on_frame_changed(move |change| {
        sink.lock().unwrap().push(change.index);
        Ok(())
    });
    seen
}

// === Wraparound ===

#[test_case(0, 0 ; "no ticks")]
#[test_case(5, 0 ; "one full pass")]
#[test_case(7, 2 ; "one pass plus two")]
#[test_case(23, 3 ; "four passes plus three")]
fn test_index_after_ticks(ticks: usize, expected: usize) {
    let mut scheduler = PlaybackScheduler::new(INTERVAL, true);
    scheduler.bind(sequence(5));
    assert_eq!(scheduler.play(), PlayStatus::Started);

    for _ in 0..ticks {
        scheduler.tick();
    }
    assert_eq!(scheduler.current_index(), Some(expected));
}

#[tokio::test(start_paused = true)]
async fn test_timer_drives_wraparound() {
    let mut scheduler = PlaybackScheduler::new(INTERVAL, true);
    scheduler.bind(sequence(5));
    let seen = recorded(&mut scheduler);
    let start = Instant::now();

    scheduler.play();
    for _ in 0..12 {
        scheduler.next_tick().await.unwrap();
    }

    assert_eq!(start.elapsed(), INTERVAL * 12);
    assert_eq!(scheduler.current_index(), Some(2));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![1, 2, 3, 4, 0, 1, 2, 3, 4, 0, 1, 2]
    );
}

// === Jump and Pause ===

#[tokio::test(start_paused = true)]
async fn test_jump_while_playing_cancels_timer() {
    let mut scheduler = PlaybackScheduler::new(INTERVAL, true);
    scheduler.bind(sequence(5));
    let seen = recorded(&mut scheduler);

    scheduler.play();
    scheduler.next_tick().await.unwrap();
    assert_eq!(scheduler.jump_to_frame(3), Some(3));
    assert_eq!(scheduler.state(), PlaybackState::Paused);

    let fired = timeout(INTERVAL * 20, scheduler.next_tick()).await;
    assert!(fired.is_err(), "no tick may fire after a jump");
    assert_eq!(*seen.lock().unwrap(), vec![1, 3]);

    scheduler.play();
    let change = scheduler.next_tick().await.unwrap();
    assert_eq!(change.index, 4);
    assert_eq!(*seen.lock().unwrap(), vec![1, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume_continue_from_same_frame() {
    let mut scheduler = PlaybackScheduler::new(INTERVAL, true);
    scheduler.bind(sequence(5));

    scheduler.play();
    scheduler.next_tick().await;
    scheduler.next_tick().await;
    scheduler.pause();
    assert!(timeout(INTERVAL * 4, scheduler.next_tick()).await.is_err());

    scheduler.play();
    let change = scheduler.next_tick().await.unwrap();
    assert_eq!(change.index, 3);
}

#[tokio::test(start_paused = true)]
async fn test_stop_resets_to_first_frame() {
    let mut scheduler = PlaybackScheduler::new(INTERVAL, true);
    scheduler.bind(sequence(5));

    scheduler.play();
    scheduler.next_tick().await;
    scheduler.next_tick().await;
    scheduler.stop();

    assert_eq!(scheduler.state(), PlaybackState::Stopped);
    assert_eq!(scheduler.current_index(), Some(0));
    assert!(!scheduler.is_timer_active());
}

// === Non-looping and Failures ===

#[tokio::test(start_paused = true)]
async fn test_no_loop_stops_on_last_frame() {
    let mut scheduler = PlaybackScheduler::new(INTERVAL, false);
    scheduler.bind(sequence(3));
    let seen = recorded(&mut scheduler);

    scheduler.play();
    scheduler.next_tick().await;
    scheduler.next_tick().await;

    assert_eq!(scheduler.state(), PlaybackState::Paused);
    assert_eq!(scheduler.current_index(), Some(2));
    assert!(timeout(INTERVAL * 4, scheduler.next_tick()).await.is_err());
    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_render_failure_keeps_timer_running() {
    let mut scheduler = PlaybackScheduler::new(INTERVAL, true);
    scheduler.bind(sequence(4));
    let failing_date = parse_date("2024-09-02").unwrap();
    scheduler.on_frame_changed(move |change| {
        if change.date == failing_date {
            return Err(terratime::TerraError::Http {
                reason: "tiles unavailable".to_string(),
            });
        }
        Ok(())
    });

    scheduler.play();
    for _ in 0..4 {
        assert!(scheduler.next_tick().await.is_some());
    }

    assert_eq!(scheduler.state(), PlaybackState::Playing);
    assert_eq!(scheduler.render_failures(), 1);
    assert_eq!(scheduler.current_index(), Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_ticks_at_minimum_period() {
    let mut scheduler = PlaybackScheduler::new(Duration::from_millis(100), true);
    scheduler.bind(sequence(3));
    scheduler.set_interval(Duration::ZERO);
    assert_eq!(scheduler.session().interval, MIN_FRAME_PERIOD);

    let start = Instant::now();
    scheduler.play();
    let change = scheduler.next_tick().await.unwrap();
    assert_eq!(change.index, 1);
    assert_eq!(start.elapsed(), MIN_FRAME_PERIOD);

    let fresh = PlaybackScheduler::new(Duration::ZERO, false);
    assert_eq!(fresh.session().interval, MIN_FRAME_PERIOD);
}

#[test]
fn test_empty_sequence_reports_nothing_to_play() {
    let mut scheduler = PlaybackScheduler::new(INTERVAL, true);
    assert_eq!(scheduler.play(), PlayStatus::NothingToPlay);
    assert_eq!(scheduler.state(), PlaybackState::Stopped);
    assert!(!scheduler.is_timer_active());
}
