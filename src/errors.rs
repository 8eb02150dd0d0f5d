// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the scanning pipeline

use thiserror::Error;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Camera-related errors
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),
    /// Session lifecycle errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Recognition engine errors (only surfaced by one-shot decoding)
    #[error("Recognition error: {0}")]
    Engine(#[from] EngineError),
    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// Frame source errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    /// The source could not be bound to its surface; fatal for the session
    #[error("Failed to bind frame source: {0}")]
    BindFailed(String),
    /// Camera disconnected during operation
    #[error("Camera disconnected")]
    Disconnected,
    /// A single frame could not be captured
    #[error("Capture failed: {0}")]
    CaptureFailed(String),
    /// An image file could not be turned into a frame
    #[error("Unsupported image '{path}': {reason}")]
    UnsupportedImage { path: String, reason: String },
}

/// Failure of a single decode attempt
///
/// These are absorbed by the scan coordinator and never reach the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine ran but could not decode the frame
    #[error("Decode failed: {0}")]
    Decode(String),
    /// The engine panicked while decoding
    #[error("Recognition engine panicked")]
    Panicked,
}

/// Recognizer adapter errors
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum RecognizerError {
    /// The executor was shut down before the request completed
    #[error("Recognizer has been shut down")]
    ShutDown,
}

/// Session lifecycle misuse
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SessionError {
    /// `start()` was called a second time
    #[error("Session has already been started")]
    AlreadyStarted,
    /// `start()` was called after the session was stopped
    #[error("Session has been stopped")]
    Stopped,
}

/// Configuration load/save errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No platform configuration directory is available
    #[error("No configuration directory available")]
    NoConfigDir,
    /// Reading or writing the config file failed
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The config file is not valid JSON for this version
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

// Conversion from String for ad hoc CLI errors
impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}
