// SPDX-License-Identifier: GPL-3.0-only

//! QR code recognition engine
//!
//! This module implements a [`RecognitionEngine`] on top of the rqrr crate.
//! Frames are reduced to a luma plane, optionally downscaled, and searched
//! for QR grids; every grid that decodes becomes a candidate, in the order
//! rqrr reports them.

use crate::backends::camera::types::{Frame, FrameBuffer, PixelFormat};
use crate::constants::pipeline::DEFAULT_MAX_DIMENSION;
use crate::errors::EngineError;
use crate::pipeline::recognizer::RecognitionEngine;
use crate::pipeline::types::{BarcodeFormat, Candidate};
use std::time::Instant;
use tracing::{debug, trace};

/// QR code detector
///
/// Optimized for real-time processing with frame downscaling. rqrr finds
/// grids in any orientation, so `frame.rotation` is only logged; an engine
/// that needs upright input can read it from there.
pub struct QrDetector {
    /// Maximum dimension for processing (frames are downscaled to this)
    max_dimension: u32,
}

impl Default for QrDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl QrDetector {
    /// Create a new QR detector with default settings
    pub fn new() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    /// Create a QR detector with custom max dimension
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }
}

impl RecognitionEngine for QrDetector {
    fn name(&self) -> &str {
        "qr"
    }

    fn recognize(&self, frame: &Frame) -> Result<Vec<Candidate>, EngineError> {
        trace!(sequence = frame.sequence, rotation = %frame.rotation, "Running QR detection");
        detect_sync(frame.buffer(), self.max_dimension)
    }
}

/// A tightly packed 8-bit luma image
#[derive(Debug, Clone, PartialEq)]
struct LumaImage {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl LumaImage {
    fn get(&self, x: usize, y: usize) -> u8 {
        self.data.get(y * self.width + x).copied().unwrap_or(0)
    }
}

fn detect_sync(buffer: &dyn FrameBuffer, max_dimension: u32) -> Result<Vec<Candidate>, EngineError> {
    let start = Instant::now();

    let luma = extract_luma(buffer)?;
    let max_dimension = max_dimension as usize;
    let luma = if luma.width > max_dimension || luma.height > max_dimension {
        let scale = (luma.width as f32 / max_dimension as f32)
            .max(luma.height as f32 / max_dimension as f32);
        let new_width = ((luma.width as f32 / scale) as usize).max(1);
        let new_height = ((luma.height as f32 / scale) as usize).max(1);
        downscale_luma(&luma, new_width, new_height)
    } else {
        luma
    };

    let conversion_time = start.elapsed();
    trace!(
        proc_width = luma.width,
        proc_height = luma.height,
        conversion_ms = conversion_time.as_millis(),
        "Prepared luma image for processing"
    );

    let mut prepared =
        rqrr::PreparedImage::prepare_from_greyscale(luma.width, luma.height, |x, y| luma.get(x, y));
    let grids = prepared.detect_grids();

    let mut candidates = Vec::with_capacity(grids.len());
    for grid in grids {
        match grid.decode() {
            Ok((_meta, content)) => {
                debug!(content = %content, "Detected QR code");
                candidates.push(Candidate::new(content, BarcodeFormat::QrCode));
            }
            Err(e) => {
                debug!(error = ?e, "Failed to decode QR code");
            }
        }
    }

    trace!(
        count = candidates.len(),
        total_ms = start.elapsed().as_millis(),
        "QR detection complete"
    );

    Ok(candidates)
}

/// Reduce the first plane of a frame to packed luma, dropping stride padding
fn extract_luma(buffer: &dyn FrameBuffer) -> Result<LumaImage, EngineError> {
    let width = buffer.width() as usize;
    let height = buffer.height() as usize;
    let stride = buffer.stride() as usize;
    let format = buffer.format();
    let bpp = format.bytes_per_pixel() as usize;
    let data = buffer.data();

    if width == 0 || height == 0 {
        return Err(EngineError::Decode("empty frame".to_string()));
    }
    if stride < width * bpp || data.len() < (height - 1) * stride + width * bpp {
        return Err(EngineError::Decode(format!(
            "truncated {} frame: {} bytes for {}x{} stride {}",
            format,
            data.len(),
            width,
            height,
            stride
        )));
    }

    let mut luma = Vec::with_capacity(width * height);
    for y in 0..height {
        let row_start = y * stride;
        let row = &data[row_start..row_start + width * bpp];
        match format {
            PixelFormat::Gray8 | PixelFormat::Nv12 => luma.extend_from_slice(row),
            PixelFormat::Yuyv => luma.extend(row.chunks_exact(2).map(|px| px[0])),
            PixelFormat::Rgba | PixelFormat::Rgb24 => {
                luma.extend(row.chunks_exact(bpp).map(|px| rgb_to_luma(px[0], px[1], px[2])))
            }
        }
    }

    Ok(LumaImage {
        width,
        height,
        data: luma,
    })
}

/// BT.601 luma in fixed point
fn rgb_to_luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

/// Downscale a luma image using bilinear interpolation
fn downscale_luma(src: &LumaImage, dst_width: usize, dst_height: usize) -> LumaImage {
    let mut result = Vec::with_capacity(dst_width * dst_height);

    let x_ratio = src.width as f32 / dst_width as f32;
    let y_ratio = src.height as f32 / dst_height as f32;

    for y in 0..dst_height {
        for x in 0..dst_width {
            let src_x = x as f32 * x_ratio;
            let src_y = y as f32 * y_ratio;

            let x0 = src_x as usize;
            let y0 = src_y as usize;
            let x1 = (x0 + 1).min(src.width - 1);
            let y1 = (y0 + 1).min(src.height - 1);

            let x_frac = src_x - x0 as f32;
            let y_frac = src_y - y0 as f32;

            let p00 = src.get(x0, y0) as f32;
            let p01 = src.get(x1, y0) as f32;
            let p10 = src.get(x0, y1) as f32;
            let p11 = src.get(x1, y1) as f32;

            let value = p00 * (1.0 - x_frac) * (1.0 - y_frac)
                + p01 * x_frac * (1.0 - y_frac)
                + p10 * (1.0 - x_frac) * y_frac
                + p11 * x_frac * y_frac;

            result.push(value as u8);
        }
    }

    LumaImage {
        width: dst_width,
        height: dst_height,
        data: result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::CopiedBuffer;

    #[test]
    fn test_extract_luma_drops_stride_padding() {
        let data: Vec<u8> = vec![
            10, 20, 0, 0, // row 0 + padding
            30, 40, 0, 0, // row 1 + padding
        ];
        let buffer = CopiedBuffer::new(data, 2, 2, PixelFormat::Gray8).with_stride(4);

        let luma = extract_luma(&buffer).expect("gray frame should convert");
        assert_eq!(luma.data, vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_extract_luma_from_rgba() {
        let data: Vec<u8> = vec![
            255, 255, 255, 255, // white
            0, 0, 0, 255, // black
        ];
        let buffer = CopiedBuffer::new(data, 2, 1, PixelFormat::Rgba);

        let luma = extract_luma(&buffer).expect("rgba frame should convert");
        assert!(luma.data[0] > 250);
        assert_eq!(luma.data[1], 0);
    }

    #[test]
    fn test_extract_luma_from_yuyv() {
        // Y0 U Y1 V
        let data: Vec<u8> = vec![16, 128, 235, 128];
        let buffer = CopiedBuffer::new(data, 2, 1, PixelFormat::Yuyv);

        let luma = extract_luma(&buffer).expect("yuyv frame should convert");
        assert_eq!(luma.data, vec![16, 235]);
    }

    #[test]
    fn test_truncated_frame_is_decode_failure() {
        let buffer = CopiedBuffer::new(vec![0u8; 3], 2, 2, PixelFormat::Gray8);
        assert!(matches!(
            extract_luma(&buffer),
            Err(EngineError::Decode(_))
        ));
    }

    #[test]
    fn test_downscale_luma() {
        let src = LumaImage {
            width: 4,
            height: 2,
            data: vec![
                0, 85, 170, 255, // row 0
                0, 85, 170, 255, // row 1
            ],
        };

        let result = downscale_luma(&src, 2, 1);
        assert_eq!(result.data.len(), 2);
        assert!(result.data[0] < 100);
        assert!(result.data[1] > 150);
    }

    #[test]
    fn test_blank_frame_has_no_candidates() {
        let buffer = CopiedBuffer::new(vec![255u8; 64 * 64], 64, 64, PixelFormat::Gray8);
        let frame = Frame::new(1, buffer);

        let candidates = QrDetector::new()
            .recognize(&frame)
            .expect("blank frame should decode cleanly");
        assert!(candidates.is_empty());
    }

    fn qr_frame(content: &str, size: u32) -> Frame {
        let image = qrcode::QrCode::new(content.as_bytes())
            .unwrap()
            .render::<image::Luma<u8>>()
            .min_dimensions(size, size)
            .build();
        let (width, height) = image.dimensions();
        Frame::new(
            1,
            CopiedBuffer::new(image.into_raw(), width, height, PixelFormat::Gray8),
        )
    }

    #[test]
    fn test_decodes_rendered_qr_code() {
        let candidates = QrDetector::new()
            .recognize(&qr_frame("123456789012", 240))
            .expect("qr frame should decode");

        assert_eq!(
            candidates.first(),
            Some(&Candidate::new("123456789012", BarcodeFormat::QrCode))
        );
    }

    #[test]
    fn test_decodes_after_downscale() {
        let candidates = QrDetector::with_max_dimension(320)
            .recognize(&qr_frame("SN-4471", 900))
            .expect("qr frame should decode");

        let values: Vec<_> = candidates.iter().map(|c| c.raw_value.as_str()).collect();
        assert_eq!(values, vec!["SN-4471"]);
    }

    #[test]
    fn test_large_frame_is_downscaled() {
        let buffer = CopiedBuffer::new(vec![0u8; 1280 * 960], 1280, 960, PixelFormat::Gray8);
        let frame = Frame::new(1, buffer);

        let candidates = QrDetector::with_max_dimension(320)
            .recognize(&frame)
            .expect("dark frame should decode cleanly");
        assert!(candidates.is_empty());
    }
}
