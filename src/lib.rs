// SPDX-License-Identifier: GPL-3.0-only

//! Serial Scanner - live capture-and-recognition pipeline
//!
//! Scans a barcode or serial number from a stream of camera frames and hands
//! exactly one decoded value back to the caller, releasing every frame
//! exactly once along the way.
//!
//! # Architecture
//!
//! ```text
//! FrameSource ─► FrameSlot ─► ScanCoordinator ─► RecognizerAdapter
//!  (producer)   (keep-latest)        ▲                  │
//!                                    └──── outcome ─────┘
//!                                    │
//!                                    ▼
//!                            SessionController ─► ScanListener
//! ```
//!
//! - [`backends`]: Frame sources, frame types and the permission collaborator
//! - [`pipeline`]: Frame slot, recognizer adapter, scan coordinator, QR engine
//! - [`session`]: Session state machine and controller
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```no_run
//! use serial_scanner::backends::camera::FileFrameSource;
//! use serial_scanner::pipeline::QrDetector;
//! use serial_scanner::session::SessionController;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), serial_scanner::errors::SessionError> {
//! let source = FileFrameSource::new(vec!["label.png".into()], Duration::from_millis(33));
//! let controller = SessionController::builder(source, Arc::new(QrDetector::new())).build();
//! controller.start().await?;
//! controller.wait_for_terminal().await;
//! if let Some(result) = controller.result() {
//!     println!("{}", result.raw_value());
//! }
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipeline;
pub mod session;

// Re-export commonly used types
pub use config::ScanConfig;
pub use errors::{AppError, AppResult};
pub use pipeline::{Candidate, ScanResult, ValuePolicy};
pub use session::{ScanListener, Session, SessionController, SessionState};
