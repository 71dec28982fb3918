//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::compositor::{Compositor, RecordingViewer};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::layers::{format_api_date, format_display_date, LayerCatalog, TileUrlBuilder, Viewport};
use crate::playback::{PlayStatus, PlaybackScheduler, PlaybackState};
use crate::sequence::{
    parse_date, write_sequence, BuildReport, BuildStatus, DateRange, FrameSequenceBuilder,
    SnapshotFetcher, TileReferenceFetcher,
};

/// Configuration and catalog shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: EngineConfig,
    pub catalog: LayerCatalog,
}

impl Context {
    /// Load the configuration and catalog, falling back to the defaults.
    pub fn load(config: Option<&Path>, catalog: Option<&Path>) -> Result<Self> {
        let config = match config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        let catalog = match catalog {
            Some(path) => LayerCatalog::load(path)?,
            None => LayerCatalog::gibs_default(),
        };
        Ok(Self { config, catalog })
    }
}

/// Options of the `build` command.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub from: String,
    pub to: String,
    pub layers: Vec<String>,
    pub bbox: Option<String>,
    pub width: u32,
    pub height: u32,
    pub tiles_only: bool,
    pub out: Option<PathBuf>,
}

/// Options of the `play` command.
#[derive(Debug, Clone)]
pub struct PlayOptions {
    pub from: String,
    pub to: String,
    pub layers: Vec<String>,
    pub interval_ms: Option<u64>,
    pub cycles: u32,
    pub no_loop: bool,
}

/// List catalog layers bottom to top.
pub fn list_layers(ctx: &Context) -> Result<()> {
    println!("Layers (bottom to top):");
    println!("{:-<72}", "");
    for layer in ctx.catalog.stacking_order() {
        println!(
            "{:<16} {:<8} {:<6} z{}-{}  {:.2}  {}",
            layer.id,
            layer.tier(),
            if layer.has_time_dimension { "daily" } else { "static" },
            layer.min_zoom,
            layer.max_zoom,
            layer.target_opacity(),
            layer.name
        );
    }
    println!("{:-<72}", "");
    println!("Total: {} layers", ctx.catalog.len());
    Ok(())
}

/// Print the tile URL template of one layer at one date.
pub fn tile_url(ctx: &Context, layer_id: &str, date: &str) -> Result<()> {
    let layer = ctx.catalog.require(layer_id)?;
    let date = parse_date(date)?;
    println!("{}", TileUrlBuilder::tile_url(layer, date));
    Ok(())
}

/// Print every day of an inclusive range.
pub fn list_dates(from: &str, to: &str) -> Result<()> {
    let range = DateRange::parse(from, to)?;
    for date in range.dates() {
        println!("{}  {}", format_api_date(date), format_display_date(date));
    }
    println!("Total: {} dates", range.day_count());
    Ok(())
}

/// Build a frame sequence, printing progress, and optionally export it.
pub async fn build(ctx: &Context, options: BuildOptions) -> Result<()> {
    let range = DateRange::parse(&options.from, &options.to)?;
    let viewport = match &options.bbox {
        Some(bbox) => Viewport::from_bbox(bbox, options.width, options.height)?,
        None => Viewport::global(options.width, options.height),
    };

    let report = if options.tiles_only {
        let fetcher = TileReferenceFetcher::new(&ctx.catalog, &options.layers)?;
        run_build(&FrameSequenceBuilder::from_config(fetcher, &ctx.config), range, &viewport).await?
    } else {
        build_snapshots(ctx, &options.layers, range, &viewport).await?
    };

    println!("{}", report.summary());
    for failure in &report.failures {
        println!("  skipped {}: {}", format_display_date(failure.date), failure.reason);
    }

    if let Some(out) = &options.out {
        let manifest = write_sequence(&report.sequence, &report.failures, out)?;
        println!(
            "Exported {} frames to {}",
            manifest.frames.len(),
            out.display()
        );
    }
    Ok(())
}

#[cfg(feature = "http")]
async fn build_snapshots(
    ctx: &Context,
    layers: &[String],
    range: DateRange,
    viewport: &Viewport,
) -> Result<BuildReport> {
    let fetcher =
        crate::sequence::WmsSnapshotFetcher::new(ctx.config.snapshot.clone(), &ctx.catalog, layers)?;
    run_build(&FrameSequenceBuilder::from_config(fetcher, &ctx.config), range, viewport).await
}

#[cfg(not(feature = "http"))]
async fn build_snapshots(
    ctx: &Context,
    layers: &[String],
    range: DateRange,
    viewport: &Viewport,
) -> Result<BuildReport> {
    tracing::warn!("built without the 'http' feature; building tile-reference frames");
    let fetcher = TileReferenceFetcher::new(&ctx.catalog, layers)?;
    run_build(&FrameSequenceBuilder::from_config(fetcher, &ctx.config), range, viewport).await
}

async fn run_build<F: SnapshotFetcher>(
    builder: &FrameSequenceBuilder<F>,
    range: DateRange,
    viewport: &Viewport,
) -> Result<BuildReport> {
    println!("Fetching {} frames...", range.day_count());
    let mut progress = builder.subscribe();
    let build = builder.build(range, viewport);
    tokio::pin!(build);

    loop {
        tokio::select! {
            result = &mut build => return result,
            Ok(()) = progress.changed() => {
                let current = progress.borrow_and_update().clone();
                if current.status == BuildStatus::Building {
                    println!("{}", current.message());
                }
            }
        }
    }
}

/// Build a tile-reference sequence and play it through a headless compositor.
pub async fn play(ctx: &Context, options: PlayOptions) -> Result<()> {
    let range = DateRange::parse(&options.from, &options.to)?;
    let fetcher = TileReferenceFetcher::new(&ctx.catalog, &options.layers)?;
    let builder = FrameSequenceBuilder::from_config(fetcher, &ctx.config);
    let report = builder.build(range, &Viewport::default()).await?;
    println!("{}", report.summary());

    let mut compositor =
        Compositor::from_config(RecordingViewer::auto_loading(), ctx.catalog.clone(), &ctx.config);
    for layer in &options.layers {
        compositor.set_visible(layer, true)?;
    }

    let sequence = Arc::new(report.sequence);
    let total = sequence.len();
    let mut scheduler = PlaybackScheduler::from_config(&ctx.config);
    if let Some(ms) = options.interval_ms {
        scheduler.set_interval(Duration::from_millis(ms.max(1)));
    }
    if options.no_loop {
        scheduler.set_loop(false);
    }
    scheduler.bind(Arc::clone(&sequence));
    scheduler.on_frame_changed(move |change| {
        println!(
            "Frame {}/{}  {}",
            change.index + 1,
            total,
            format_display_date(change.date)
        );
        Ok(())
    });

    let Some(first) = sequence.get(0) else {
        println!("No frames to play. Please build first.");
        return Ok(());
    };
    let first_report = compositor.render_and_settle(first.date).await;
    println!("Frame 1/{}  {}", total, format_display_date(first.date));
    for err in first_report.errors() {
        println!("  {err}");
    }

    if scheduler.play() != PlayStatus::Started {
        return Ok(());
    }
    info!(session = %scheduler.session().id, frames = total, "headless playback");

    let limit = if !scheduler.session().loop_playback {
        total.saturating_sub(1)
    } else {
        total * options.cycles.max(1) as usize
    };
    let mut ticks = 0;

    while ticks < limit {
        let change = tokio::select! {
            change = scheduler.next_tick() => change,
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted");
                break;
            }
        };

        if let Some(change) = change {
            ticks += 1;
            let rendered = compositor.render_and_settle(change.date).await;
            for err in rendered.errors() {
                println!("  {err}");
            }
        }
        if scheduler.state() != PlaybackState::Playing {
            break;
        }
    }

    scheduler.stop();
    println!("Played {ticks} frame changes");
    Ok(())
}
