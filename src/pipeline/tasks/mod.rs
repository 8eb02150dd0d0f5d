// SPDX-License-Identifier: GPL-3.0-only

//! Recognition engines
//!
//! Implementations of [`RecognitionEngine`](crate::pipeline::recognizer::RecognitionEngine)
//! that ship with the crate.

pub mod qr_detector;

pub use qr_detector::QrDetector;
