// SPDX-License-Identifier: GPL-3.0-only

//! File-backed frame source
//!
//! Replays still images as a paced frame stream. Used by the CLI and for
//! exercising the pipeline without a camera.

use crate::backends::camera::FrameSource;
use crate::backends::camera::types::{CopiedBuffer, Frame, PixelFormat, SensorRotation};
use crate::constants::file_formats;
use crate::errors::CameraError;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Load an image file as an RGBA buffer
pub fn load_image_buffer(path: &Path) -> Result<CopiedBuffer, CameraError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    if !file_formats::is_image_extension(&extension) {
        return Err(CameraError::UnsupportedImage {
            path: path.display().to_string(),
            reason: format!("unsupported extension '{}'", extension),
        });
    }

    info!(path = %path.display(), "Loading image file");

    let img = image::open(path).map_err(|e| CameraError::UnsupportedImage {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let rgba = img.to_rgba8();
    let width = rgba.width();
    let height = rgba.height();

    debug!(width, height, "Image loaded successfully");

    Ok(CopiedBuffer::new(
        rgba.into_raw(),
        width,
        height,
        PixelFormat::Rgba,
    ))
}

/// Streams a fixed set of images at a steady interval
pub struct FileFrameSource {
    paths: Vec<PathBuf>,
    buffers: Vec<CopiedBuffer>,
    interval: Duration,
    repeat: bool,
    rotation: SensorRotation,
    next_index: usize,
    next_sequence: u64,
    last_emit: Option<Instant>,
}

impl FileFrameSource {
    /// Replay the images at `paths`; they are decoded when the source is bound
    pub fn new(paths: Vec<PathBuf>, interval: Duration) -> Self {
        Self {
            paths,
            buffers: Vec::new(),
            interval,
            repeat: true,
            rotation: SensorRotation::None,
            next_index: 0,
            next_sequence: 1,
            last_emit: None,
        }
    }

    /// Replay already-decoded buffers
    pub fn from_buffers(buffers: Vec<CopiedBuffer>, interval: Duration) -> Self {
        let mut source = Self::new(Vec::new(), interval);
        source.buffers = buffers;
        source
    }

    /// Stop after one pass instead of looping
    pub fn once(mut self) -> Self {
        self.repeat = false;
        self
    }

    /// Rotation hint attached to every frame
    pub fn with_rotation(mut self, rotation: SensorRotation) -> Self {
        self.rotation = rotation;
        self
    }

    fn pace(&mut self) {
        if let Some(last) = self.last_emit {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                thread::sleep(self.interval - elapsed);
            }
        }
        self.last_emit = Some(Instant::now());
    }
}

impl FrameSource for FileFrameSource {
    fn name(&self) -> &str {
        "file"
    }

    fn bind(&mut self) -> Result<(), CameraError> {
        if !self.paths.is_empty() {
            self.buffers = self
                .paths
                .iter()
                .map(|p| load_image_buffer(p))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| CameraError::BindFailed(e.to_string()))?;
        }

        if self.buffers.is_empty() {
            return Err(CameraError::BindFailed("no images to stream".to_string()));
        }

        self.next_index = 0;
        self.last_emit = None;
        info!(images = self.buffers.len(), repeat = self.repeat, "File source bound");
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        if self.next_index >= self.buffers.len() {
            if !self.repeat || self.buffers.is_empty() {
                return Ok(None);
            }
            self.next_index = 0;
        }

        self.pace();

        let Some(buffer) = self.buffers.get(self.next_index).cloned() else {
            return Ok(None);
        };
        self.next_index += 1;

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        Ok(Some(Frame::new(sequence, buffer).with_rotation(self.rotation)))
    }

    fn unbind(&mut self) {
        if !self.paths.is_empty() {
            // Decoded again on the next bind
            self.buffers.clear();
        }
        self.last_emit = None;
    }
}
