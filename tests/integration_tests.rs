//! Integration Tests
//!
//! End-to-end: build a tile-reference sequence, play it on the timer and
//! render every frame change through the compositor.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pretty_assertions::assert_eq;

use terratime::cli::{Cli, Commands};
use terratime::compositor::{Compositor, RecordingViewer};
use terratime::config::EngineConfig;
use terratime::layers::{LayerCatalog, Viewport};
use terratime::playback::{PlayStatus, PlaybackScheduler};
use terratime::sequence::{
    read_manifest, write_sequence, DateRange, FramePayload, FrameSequenceBuilder,
    TileReferenceFetcher,
};

fn layer_ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

// === Build Then Replay ===

#[tokio::test(start_paused = true)]
async fn test_build_then_play_through_compositor() {
    let config = EngineConfig {
        frame_interval_ms: 200,
        crossfade_ms: 50,
        ..EngineConfig::default()
    };
    let catalog = LayerCatalog::gibs_default();
    let layers = layer_ids(&["bluemarble", "sst"]);

    let fetcher = TileReferenceFetcher::new(&catalog, &layers).unwrap();
    let builder = FrameSequenceBuilder::from_config(fetcher, &config);
    let report = builder
        .build(DateRange::parse("2024-09-09", "2024-09-13").unwrap(), &Viewport::default())
        .await
        .unwrap();
    let sequence = Arc::new(report.sequence);
    assert_eq!(sequence.len(), 5);

    let mut compositor =
        Compositor::from_config(RecordingViewer::auto_loading(), catalog, &config);
    for id in &layers {
        compositor.set_visible(id, true).unwrap();
    }

    let mut scheduler = PlaybackScheduler::from_config(&config);
    scheduler.bind(Arc::clone(&sequence));
    assert_eq!(scheduler.play(), PlayStatus::Started);

    let mut rendered = Vec::new();
    for _ in 0..7 {
        let change = scheduler.next_tick().await.unwrap();
        let report = compositor.render_and_settle(change.date).await;
        assert!(report.is_rendered());
        rendered.push(change.date.to_string());
    }

    assert_eq!(
        rendered,
        vec![
            "2024-09-10",
            "2024-09-11",
            "2024-09-12",
            "2024-09-13",
            "2024-09-09",
            "2024-09-10",
            "2024-09-11",
        ]
    );

    // Base stays attached once; the overlay shows the last rendered date.
    let visible = compositor.viewer().visible_sources();
    assert_eq!(visible.len(), 2);
    assert_eq!(visible[0].spec.label, "bluemarble-B");
    assert!(visible[1].spec.url.contains("/2024-09-11/"));
}

#[tokio::test]
async fn test_tile_frames_match_tile_urls() {
    let catalog = LayerCatalog::gibs_default();
    let fetcher = TileReferenceFetcher::new(&catalog, &layer_ids(&["avhrr_sst"])).unwrap();
    let builder = FrameSequenceBuilder::new(fetcher, 0, 366);

    let report = builder
        .build(DateRange::parse("2024-09-29", "2024-09-30").unwrap(), &Viewport::default())
        .await
        .unwrap();

    let FramePayload::Tiles(tiles) = &report.sequence.frames[1].payload else {
        panic!("expected tile references");
    };
    assert_eq!(tiles[0].layer_id, "avhrr_sst");
    assert!(tiles[0].url.contains("AVHRR_MetOp-B_L3U_Sea_Surface_Temperature/default/2024-09-30/"));
}

#[tokio::test]
async fn test_export_round_trip_through_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = LayerCatalog::gibs_default();
    let fetcher = TileReferenceFetcher::new(&catalog, &layer_ids(&["sst"])).unwrap();
    let builder = FrameSequenceBuilder::new(fetcher, 0, 366);

    let report = builder
        .build(DateRange::parse("2024-09-09", "2024-09-11").unwrap(), &Viewport::default())
        .await
        .unwrap();
    write_sequence(&report.sequence, &report.failures, dir.path()).unwrap();

    let manifest = read_manifest(dir.path()).unwrap();
    assert_eq!(manifest.requested_count, 3);
    assert_eq!(manifest.frames.len(), 3);
    assert!(manifest.failures.is_empty());
}

// === Configuration and CLI ===

#[test]
fn test_config_file_feeds_components() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "frame_interval_ms": 400, "loop_playback": false, "crossfade_ms": 0 }}"#
    )
    .unwrap();

    let config = EngineConfig::load(file.path()).unwrap();
    let scheduler = PlaybackScheduler::from_config(&config);
    assert_eq!(scheduler.session().interval, Duration::from_millis(400));
    assert!(!scheduler.session().loop_playback);

    let compositor =
        Compositor::from_config(RecordingViewer::new(), LayerCatalog::gibs_default(), &config);
    assert_eq!(compositor.crossfade(), Duration::ZERO);
}

#[test]
fn test_cli_parses_build_command() {
    let cli = Cli::try_parse_from([
        "terratime",
        "--verbose",
        "build",
        "--from",
        "2024-09-09",
        "--to",
        "2024-09-30",
        "--layers",
        "bluemarble,sst",
        "--tiles-only",
    ])
    .unwrap();

    assert!(cli.verbose);
    match cli.command {
        Some(Commands::Build {
            from,
            layers,
            tiles_only,
            width,
            ..
        }) => {
            assert_eq!(from, "2024-09-09");
            assert_eq!(layers, vec!["bluemarble", "sst"]);
            assert!(tiles_only);
            assert_eq!(width, 1200);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_cli_parses_play_defaults() {
    let cli = Cli::try_parse_from(["terratime", "play", "--from", "2024-09-09", "--to", "2024-09-10"])
        .unwrap();

    match cli.command {
        Some(Commands::Play {
            cycles,
            no_loop,
            interval,
            ..
        }) => {
            assert_eq!(cycles, 1);
            assert!(!no_loop);
            assert_eq!(interval, None);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}
