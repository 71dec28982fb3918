//! CLI Module
//!
//! Command-line interface for the Terratime imagery engine.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Terratime - temporal satellite imagery compositor and player
#[derive(Parser, Debug)]
#[command(name = "terratime")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Layer catalog file (JSON array); defaults to the built-in GIBS catalog
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List catalog layers in stacking order
    #[command(name = "layers")]
    Layers,

    /// Print the tile URL template of a layer at a date
    #[command(name = "tile-url")]
    TileUrl {
        /// Layer id
        #[arg(short, long)]
        layer: String,

        /// Date (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,
    },

    /// Enumerate the days of an inclusive date range
    #[command(name = "dates")]
    Dates {
        /// First date (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Last date (YYYY-MM-DD)
        #[arg(long)]
        to: String,
    },

    /// Build a frame sequence
    #[command(name = "build")]
    Build {
        /// First date (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Last date (YYYY-MM-DD)
        #[arg(long)]
        to: String,

        /// Comma-separated layer ids
        #[arg(short, long, value_delimiter = ',', default_value = "bluemarble,sst")]
        layers: Vec<String>,

        /// Snapshot extent as west,south,east,north
        #[arg(long)]
        bbox: Option<String>,

        /// Snapshot width in pixels
        #[arg(long, default_value_t = 1200)]
        width: u32,

        /// Snapshot height in pixels
        #[arg(long, default_value_t = 600)]
        height: u32,

        /// Build tile-reference frames instead of fetching snapshots
        #[arg(long)]
        tiles_only: bool,

        /// Export frames and a manifest to this directory
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Build a tile-reference sequence and play it headlessly
    #[command(name = "play")]
    Play {
        /// First date (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Last date (YYYY-MM-DD)
        #[arg(long)]
        to: String,

        /// Comma-separated layer ids
        #[arg(short, long, value_delimiter = ',', default_value = "bluemarble,sst")]
        layers: Vec<String>,

        /// Frame interval in milliseconds (overrides the configuration)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Stop after this many passes over the sequence
        #[arg(long, default_value_t = 1)]
        cycles: u32,

        /// Stop at the last frame instead of wrapping
        #[arg(long)]
        no_loop: bool,
    },
}
