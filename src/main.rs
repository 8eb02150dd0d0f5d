// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "serial-scanner")]
#[command(about = "Scan one barcode or serial number from a camera feed")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay images as a live feed and print the first accepted code
    Scan {
        /// Image files or directories of images
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Accept only numeric values
        #[arg(long)]
        numeric_only: bool,

        /// Minimum accepted value length
        #[arg(long)]
        min_length: Option<usize>,

        /// Give up after this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Simulate a denied camera permission
        #[arg(long)]
        deny: bool,

        /// Milliseconds between replayed frames
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Sensor rotation hint in degrees
        #[arg(long, default_value = "0")]
        rotation: i32,
    },

    /// Decode a single image and list every code found
    Decode {
        /// Image file to decode
        image: PathBuf,
    },

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=serial_scanner=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            images,
            numeric_only,
            min_length,
            timeout,
            deny,
            interval_ms,
            rotation,
        } => cli::scan(cli::ScanOptions {
            images,
            numeric_only,
            min_length,
            timeout,
            deny,
            interval_ms,
            rotation,
        })?,
        Commands::Decode { image } => cli::decode(&image)?,
        Commands::Config { save } => cli::show_config(save)?,
    }

    Ok(())
}
