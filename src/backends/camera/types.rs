// SPDX-License-Identifier: GPL-3.0-only
// Shared types for frame sources and the recognition pipeline

//! Shared types for camera backends

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

/// Pixel formats a frame buffer can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// RGBA - 32-bit with alpha (4 bytes per pixel)
    Rgba,
    /// RGB24 - 24-bit RGB (3 bytes per pixel, no alpha)
    Rgb24,
    /// Gray8 - 8-bit grayscale (single channel)
    Gray8,
    /// NV12 - Semi-planar 4:2:0 (Y plane + interleaved UV plane)
    /// Only the Y plane is read by the recognizers
    Nv12,
    /// YUYV - Packed 4:2:2 (Y0 U Y1 V interleaved)
    Yuyv,
}

impl PixelFormat {
    /// Bytes occupied by one pixel in the first plane
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Rgba => 4,
            PixelFormat::Rgb24 => 3,
            PixelFormat::Gray8 | PixelFormat::Nv12 => 1,
            PixelFormat::Yuyv => 2,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PixelFormat::Rgba => "RGBA",
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Gray8 => "GRAY8",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Yuyv => "YUYV",
        };
        f.write_str(name)
    }
}

/// Sensor rotation in degrees (clockwise)
///
/// Handed to the recognition engine as a hint; mobile sensors are commonly
/// mounted at 90° or 270° relative to the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SensorRotation {
    /// No rotation (sensor is oriented correctly)
    #[default]
    None,
    /// 90 degrees clockwise
    Rotate90,
    /// 180 degrees (upside down)
    Rotate180,
    /// 270 degrees clockwise (90 degrees counter-clockwise)
    Rotate270,
}

impl SensorRotation {
    /// Create rotation from an integer degree value (normalised to 0-360).
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => SensorRotation::Rotate90,
            180 => SensorRotation::Rotate180,
            270 => SensorRotation::Rotate270,
            _ => SensorRotation::None,
        }
    }

    /// Get the rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            SensorRotation::None => 0,
            SensorRotation::Rotate90 => 90,
            SensorRotation::Rotate180 => 180,
            SensorRotation::Rotate270 => 270,
        }
    }
}

impl std::fmt::Display for SensorRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// An image buffer acquired from a frame source
///
/// The buffer carries a release obligation: `close` is invoked exactly once,
/// when the owning [`Frame`] is dropped, whichever path drops it.
pub trait FrameBuffer: Send {
    /// Width in pixels
    fn width(&self) -> u32;
    /// Height in pixels
    fn height(&self) -> u32;
    /// Bytes per row of the first plane (may include padding)
    fn stride(&self) -> u32;
    /// Pixel format of the data
    fn format(&self) -> PixelFormat;
    /// Raw bytes, first plane at offset zero
    fn data(&self) -> &[u8];
    /// Hand the buffer back to its producer
    fn close(&mut self);
}

/// Pre-copied frame bytes (file sources, tests)
///
/// Nothing to hand back on close; memory is freed with the frame.
#[derive(Clone)]
pub struct CopiedBuffer {
    data: Arc<[u8]>,
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
}

impl CopiedBuffer {
    /// Wrap tightly packed pixel data
    pub fn new(data: impl Into<Arc<[u8]>>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            stride: width * format.bytes_per_pixel(),
            format,
        }
    }

    /// Override the row stride for padded data
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride;
        self
    }
}

impl std::fmt::Debug for CopiedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CopiedBuffer({}x{} {}, {} bytes)",
            self.width,
            self.height,
            self.format,
            self.data.len()
        )
    }
}

impl FrameBuffer for CopiedBuffer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn stride(&self) -> u32 {
        self.stride
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn close(&mut self) {}
}

/// Why a frame left the pipeline (diagnostics only)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    /// Replaced in the frame slot by a newer frame
    Evicted,
    /// Decoded without any candidates
    NoCandidates,
    /// The engine failed on this frame
    DecodeFailed,
    /// Candidates found, none accepted by the value policy
    Rejected,
    /// This frame produced the session's result
    Matched,
    /// Candidates found after another frame already claimed the session
    LostClaim,
    /// The session was closed before this frame was processed
    Cancelled,
}

/// One captured frame
///
/// Ownership moves from the source to the frame slot and then to exactly one
/// consumer. The underlying buffer is closed when the frame is dropped, so
/// every path that lets go of a frame releases it, and none can release it
/// twice.
pub struct Frame {
    /// Monotonically increasing sequence number assigned by the source
    pub sequence: u64,
    /// Rotation hint for the recognizer
    pub rotation: SensorRotation,
    /// Timestamp when frame was captured
    pub captured_at: Instant,
    buffer: Box<dyn FrameBuffer>,
}

impl Frame {
    /// Wrap an acquired buffer
    pub fn new(sequence: u64, buffer: impl FrameBuffer + 'static) -> Self {
        Self {
            sequence,
            rotation: SensorRotation::None,
            captured_at: Instant::now(),
            buffer: Box::new(buffer),
        }
    }

    /// Attach the sensor rotation hint
    pub fn with_rotation(mut self, rotation: SensorRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Borrow the image buffer
    pub fn buffer(&self) -> &dyn FrameBuffer {
        self.buffer.as_ref()
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn format(&self) -> PixelFormat {
        self.buffer.format()
    }

    /// Let go of the frame, closing its buffer
    pub fn release(self, reason: ReleaseReason) {
        trace!(
            sequence = self.sequence,
            ?reason,
            age_ms = self.captured_at.elapsed().as_millis(),
            "Releasing frame"
        );
        drop(self);
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.buffer.close();
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("format", &self.format())
            .field("rotation", &self.rotation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBuffer(Arc<AtomicUsize>);

    impl FrameBuffer for CountingBuffer {
        fn width(&self) -> u32 {
            1
        }
        fn height(&self) -> u32 {
            1
        }
        fn stride(&self) -> u32 {
            1
        }
        fn format(&self) -> PixelFormat {
            PixelFormat::Gray8
        }
        fn data(&self) -> &[u8] {
            &[0]
        }
        fn close(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_release_closes_buffer_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let frame = Frame::new(7, CountingBuffer(Arc::clone(&closes)));
        frame.release(ReleaseReason::NoCandidates);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_closes_buffer() {
        let closes = Arc::new(AtomicUsize::new(0));
        {
            let _frame = Frame::new(1, CountingBuffer(Arc::clone(&closes)));
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rotation_from_degrees() {
        assert_eq!(SensorRotation::from_degrees(90), SensorRotation::Rotate90);
        assert_eq!(SensorRotation::from_degrees(-90), SensorRotation::Rotate270);
        assert_eq!(SensorRotation::from_degrees(450), SensorRotation::Rotate90);
        assert_eq!(SensorRotation::from_degrees(45), SensorRotation::None);
        assert_eq!(SensorRotation::Rotate270.degrees(), 270);
    }

    #[test]
    fn test_copied_buffer_stride() {
        let buffer = CopiedBuffer::new(vec![0u8; 24], 2, 3, PixelFormat::Rgba);
        assert_eq!(buffer.stride(), 8);
        let padded = buffer.with_stride(10);
        assert_eq!(padded.stride(), 10);
    }
}
