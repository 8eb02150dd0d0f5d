// SPDX-License-Identifier: GPL-3.0-only

//! Capture-and-recognition pipeline
//!
//! ```text
//! FrameSource ─► FrameSlot ─► ScanCoordinator ─► RecognizerAdapter
//!                                   ▲                    │
//!                                   └──── outcome ◄──────┘
//! ```
//!
//! The slot bounds in-flight work to one frame, the recognizer runs decodes
//! on a single worker thread, and the coordinator settles each outcome
//! against the session's atomic claim.

pub mod coordinator;
pub mod frame_slot;
pub mod recognizer;
pub mod tasks;
pub mod types;

pub use coordinator::{ScanCoordinator, Settlement};
pub use frame_slot::{FrameSlot, PublishOutcome, SlotStats};
pub use recognizer::{RecognitionEngine, RecognizeOutcome, RecognizerAdapter};
pub use tasks::QrDetector;
pub use types::{AcceptPolicy, AcceptRule, BarcodeFormat, Candidate, ScanResult, ValuePolicy};
