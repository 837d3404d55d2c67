// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "depth-greenscreen")]
#[command(about = "Depth-keyed greenscreen for depth cameras")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every device and resolution combination
    List,

    /// Run the keyed capture loop
    Run {
        /// Serial number of the device to use
        #[arg(short, long)]
        serial: Option<String>,

        /// Color stream width
        #[arg(short, long)]
        width: Option<u32>,

        /// Color stream height
        #[arg(long)]
        height: Option<u32>,

        /// Depth frames a pixel is remembered for (1 disables the filter)
        #[arg(short = 'f', long)]
        depth_filter: Option<usize>,

        /// Far clipping plane in meters
        #[arg(short, long)]
        max_distance: Option<f32>,

        /// Key color as 0xRRGGBB
        #[arg(short, long, value_parser = cli::parse_color)]
        color: Option<u32>,

        /// Output RGBA instead of RGB
        #[arg(long)]
        rgba: bool,

        /// Stop after this many frames (default: run until Ctrl+C)
        #[arg(short = 'n', long)]
        frames: Option<u64>,

        /// Save the last keyed frame as PNG (file or directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Settings file (default: ~/.config/depth-greenscreen/settings.json)
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Write the effective settings back to the settings file
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=depth_greenscreen=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => cli::list_devices(),
        Commands::Run {
            serial,
            width,
            height,
            depth_filter,
            max_distance,
            color,
            rgba,
            frames,
            output,
            settings,
            save,
        } => cli::run(cli::RunOptions {
            serial,
            width,
            height,
            depth_filter,
            max_distance,
            color,
            rgba,
            frames,
            output,
            settings,
            save,
        }),
    }
}
