// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Directory name under the platform config dir
pub const APP_DIR_NAME: &str = "serial-scanner";

/// Config file name inside [`APP_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Current config schema version
pub const CONFIG_VERSION: u32 = 1;

/// Pipeline defaults
pub mod pipeline {
    use super::Duration;

    /// Frames larger than this (in either dimension) are downscaled before QR detection
    pub const DEFAULT_MAX_DIMENSION: u32 = 640;

    /// Pacing of the file-backed frame source (~30fps)
    pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

    /// Mid-stream capture errors tolerated in a row before the session fails
    pub const DEFAULT_MAX_CONSECUTIVE_CAPTURE_ERRORS: u32 = 5;

    /// Back-off after a failed capture before trying the next one
    pub const CAPTURE_ERROR_BACKOFF: Duration = Duration::from_millis(10);

    /// Thread name of the frame producer
    pub const CAPTURE_LOOP_NAME: &str = "scan-capture";

    /// Thread name of the single recognition worker
    pub const RECOGNIZER_THREAD_NAME: &str = "scan-recognizer";
}

/// Supported input files for the file-backed source
pub mod file_formats {
    /// Supported image file extensions
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

    /// Check if a file extension is a supported image format
    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}
