// SPDX-License-Identifier: GPL-3.0-only

//! Frame source abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  SessionController  │  ← binds / unbinds through the capture loop
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │CaptureLoopController│  ← producer thread, owns the bound source
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │  FrameSource trait  │  ← camera, file replay, test doubles
//! └─────────────────────┘
//! ```

pub mod file_source;
pub mod frame_loop;
pub mod types;

pub use file_source::FileFrameSource;
pub use frame_loop::{CaptureLoopController, LoopAction};
pub use types::*;

use crate::errors::CameraError;
use tracing::debug;

/// A start/stop-able stream of frames bound to a display surface
///
/// All methods are called from the capture loop thread.
pub trait FrameSource: Send + 'static {
    /// Short name for logging
    fn name(&self) -> &str;

    /// Acquire the device and attach it to its surface
    ///
    /// An error here is fatal for the session.
    fn bind(&mut self) -> Result<(), CameraError>;

    /// Produce the next frame
    ///
    /// # Returns
    /// * `Ok(Some(frame))` - A new frame, with a sequence number greater than the last
    /// * `Ok(None)` - The stream has ended
    /// * `Err(CameraError)` - This capture failed; the stream may continue
    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Detach from the surface and release the device
    fn unbind(&mut self);
}

/// A source that has been bound; unbinds when dropped
pub struct BoundSource {
    source: Box<dyn FrameSource>,
}

impl BoundSource {
    /// Bind `source`, returning a guard that owns it while bound
    pub fn bind(mut source: Box<dyn FrameSource>) -> Result<Self, CameraError> {
        source.bind()?;
        debug!(source = source.name(), "Frame source bound");
        Ok(Self { source })
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        self.source.next_frame()
    }
}

impl Drop for BoundSource {
    fn drop(&mut self) {
        self.source.unbind();
        debug!(source = self.source.name(), "Frame source unbound");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakySource {
        fail_bind: bool,
        unbinds: Arc<AtomicUsize>,
    }

    impl FrameSource for FlakySource {
        fn name(&self) -> &str {
            "flaky"
        }

        fn bind(&mut self) -> Result<(), CameraError> {
            if self.fail_bind {
                Err(CameraError::BindFailed("surface gone".to_string()))
            } else {
                Ok(())
            }
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
            Ok(None)
        }

        fn unbind(&mut self) {
            self.unbinds.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_bound_source_unbinds_on_drop() {
        let unbinds = Arc::new(AtomicUsize::new(0));
        let bound = BoundSource::bind(Box::new(FlakySource {
            fail_bind: false,
            unbinds: Arc::clone(&unbinds),
        }))
        .expect("bind should succeed");
        assert_eq!(bound.name(), "flaky");
        drop(bound);
        assert_eq!(unbinds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_bind_never_unbinds() {
        let unbinds = Arc::new(AtomicUsize::new(0));
        let result = BoundSource::bind(Box::new(FlakySource {
            fail_bind: true,
            unbinds: Arc::clone(&unbinds),
        }));
        assert!(matches!(result, Err(CameraError::BindFailed(_))));
        assert_eq!(unbinds.load(Ordering::SeqCst), 0);
    }
}
