// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Scanning a replayed image feed through a full session
//! - Decoding a single image
//! - Showing and saving the configuration

use serial_scanner::backends::camera::file_source::load_image_buffer;
use serial_scanner::backends::camera::{FileFrameSource, Frame, SensorRotation};
use serial_scanner::backends::permission::StaticPermission;
use serial_scanner::config::ScanConfig;
use serial_scanner::constants::file_formats;
use serial_scanner::errors::{AppError, AppResult, CameraError, ConfigError};
use serial_scanner::pipeline::{AcceptPolicy, AcceptRule, QrDetector, RecognitionEngine};
use serial_scanner::session::{ScanListener, SessionController, SessionState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Flags for the `scan` command, layered over the saved config
pub struct ScanOptions {
    pub images: Vec<PathBuf>,
    pub numeric_only: bool,
    pub min_length: Option<usize>,
    pub timeout: Option<u64>,
    pub deny: bool,
    pub interval_ms: Option<u64>,
    pub rotation: i32,
}

/// Prints terminal failures; the result itself is printed by [`scan`]
struct ConsoleListener;

impl ScanListener for ConsoleListener {
    fn on_result(&self, _raw_value: &str) {}

    fn on_denied(&self) {
        eprintln!("Camera permission denied.");
    }

    fn on_failed(&self, reason: &str) {
        eprintln!("Scan failed: {}", reason);
    }
}

/// Load the saved config, falling back to defaults if it cannot be read
fn load_config() -> ScanConfig {
    ScanConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        ScanConfig::default()
    })
}

/// Run one scan session over a looping image feed
pub fn scan(options: ScanOptions) -> AppResult<()> {
    let mut config = load_config();
    if options.numeric_only {
        config.accept = AcceptRule::NumericOnly;
    }
    if let Some(min_length) = options.min_length {
        config.min_length = min_length;
    }
    if let Some(interval_ms) = options.interval_ms {
        config.frame_interval_ms = interval_ms;
    }

    let paths = collect_image_paths(&options.images)?;
    if paths.is_empty() {
        return Err("No supported images found in input".into());
    }
    println!("Scanning {} image(s)... (press Ctrl+C to stop)", paths.len());

    let source = FileFrameSource::new(paths, config.frame_interval())
        .with_rotation(SensorRotation::from_degrees(options.rotation));
    let permission = if options.deny {
        StaticPermission::denied()
    } else {
        StaticPermission::granted()
    };
    let engine = Arc::new(QrDetector::with_max_dimension(config.max_dimension));

    let controller = Arc::new(
        SessionController::builder(source, engine)
            .permission(permission)
            .config(&config)
            .listener(Arc::new(ConsoleListener))
            .build(),
    );

    let stop_handle = Arc::clone(&controller);
    ctrlc::set_handler(move || stop_handle.stop())
        .map_err(|e| AppError::Other(format!("Failed to install Ctrl+C handler: {}", e)))?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| AppError::Other(format!("Failed to start runtime: {}", e)))?;
    let state = rt.block_on(async {
        controller.start().await?;
        let state = match options.timeout {
            Some(secs) => {
                match tokio::time::timeout(
                    Duration::from_secs(secs),
                    controller.wait_for_terminal(),
                )
                .await
                {
                    Ok(state) => state,
                    Err(_) => {
                        println!("No code accepted within {} seconds.", secs);
                        controller.stop();
                        controller.state()
                    }
                }
            }
            None => controller.wait_for_terminal().await,
        };
        Ok::<_, AppError>(state)
    })?;

    match state {
        SessionState::Matched => {
            if let Some(result) = controller.result() {
                println!("{}", result.raw_value());
                eprintln!(
                    "Format: {}, frame #{}",
                    result.format(),
                    result.decoded_from_frame()
                );
            }
            Ok(())
        }
        SessionState::Blocked => Err("Camera permission denied".into()),
        SessionState::Failed => Err("Frame source failed".into()),
        _ => {
            println!("Scan stopped.");
            Ok(())
        }
    }
}

/// Decode one image and list every candidate in engine order
pub fn decode(image: &Path) -> AppResult<()> {
    let config = load_config();
    let policy = config.value_policy();

    let frame = Frame::new(1, load_image_buffer(image)?);
    println!("Image: {}x{}", frame.width(), frame.height());

    let candidates = QrDetector::with_max_dimension(config.max_dimension).recognize(&frame)?;
    if candidates.is_empty() {
        println!("No codes found.");
        return Ok(());
    }

    for (index, candidate) in candidates.iter().enumerate() {
        let note = if policy.accepts(candidate) {
            ""
        } else {
            " (rejected by policy)"
        };
        println!(
            "  [{}] {} [{}]{}",
            index, candidate.raw_value, candidate.format, note
        );
    }

    Ok(())
}

/// Print the effective config, optionally writing it back
pub fn show_config(save: bool) -> AppResult<()> {
    let config = ScanConfig::load()?;
    let json = serde_json::to_string_pretty(&config).map_err(ConfigError::from)?;
    println!("{}", json);

    if save {
        let path = config.save()?;
        println!("Saved: {}", path.display());
    }

    Ok(())
}

/// Expand directories into the supported images they contain, sorted by name
fn collect_image_paths(inputs: &[PathBuf]) -> AppResult<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let entries = std::fs::read_dir(input).map_err(|e| CameraError::UnsupportedImage {
                path: input.display().to_string(),
                reason: e.to_string(),
            })?;
            let mut dir_paths: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file() && is_supported_image(path))
                .collect();
            dir_paths.sort();
            paths.extend(dir_paths);
        } else {
            paths.push(input.clone());
        }
    }

    Ok(paths)
}

fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| file_formats::is_image_extension(&ext.to_string_lossy()))
        .unwrap_or(false)
}
