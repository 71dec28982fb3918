//! Terratime CLI - Temporal Imagery Engine
//!
//! Command-line interface for the Terratime compositor and playback engine.

use anyhow::Context as _;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use terratime::cli::commands::{self, BuildOptions, Context, PlayOptions};
use terratime::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Terratime v{}", env!("CARGO_PKG_VERSION"));

    let ctx = Context::load(cli.config.as_deref(), cli.catalog.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Some(cmd) => handle_command(&ctx, cmd).await,
        None => {
            println!("Terratime v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

async fn handle_command(ctx: &Context, cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Layers => commands::list_layers(ctx)?,
        Commands::TileUrl { layer, date } => commands::tile_url(ctx, &layer, &date)?,
        Commands::Dates { from, to } => commands::list_dates(&from, &to)?,
        Commands::Build {
            from,
            to,
            layers,
            bbox,
            width,
            height,
            tiles_only,
            out,
        } => commands::build(
            ctx,
            BuildOptions {
                from,
                to,
                layers,
                bbox,
                width,
                height,
                tiles_only,
                out,
            },
        )
        .await
        .context("build failed")?,
        Commands::Play {
            from,
            to,
            layers,
            interval,
            cycles,
            no_loop,
        } => commands::play(
            ctx,
            PlayOptions {
                from,
                to,
                layers,
                interval_ms: interval,
                cycles,
                no_loop,
            },
        )
        .await
        .context("playback failed")?,
    }
    Ok(())
}
