// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{self, CONFIG_VERSION, pipeline};
use crate::errors::ConfigError;
use crate::pipeline::types::{AcceptRule, BarcodeFormat, ValuePolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Scanner settings, persisted as JSON in the platform config directory
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Schema version of the file
    pub version: u32,
    /// Which decoded values the caller accepts
    pub accept: AcceptRule,
    /// Minimum accepted value length in characters
    pub min_length: usize,
    /// Accepted symbologies; empty accepts all
    pub allowed_formats: Vec<BarcodeFormat>,
    /// Frames are downscaled to this before QR detection
    pub max_dimension: u32,
    /// Pacing of the file-backed frame source
    pub frame_interval_ms: u64,
    /// Capture errors in a row before the session fails
    pub max_consecutive_capture_errors: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            accept: AcceptRule::Any,
            min_length: 1, // Empty values are never a scan
            allowed_formats: Vec::new(),
            max_dimension: pipeline::DEFAULT_MAX_DIMENSION,
            frame_interval_ms: pipeline::DEFAULT_FRAME_INTERVAL.as_millis() as u64,
            max_consecutive_capture_errors: pipeline::DEFAULT_MAX_CONSECUTIVE_CAPTURE_ERRORS,
        }
    }
}

impl ScanConfig {
    /// Location of the user's config file
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| {
                dir.join(constants::APP_DIR_NAME)
                    .join(constants::CONFIG_FILE_NAME)
            })
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load the user's config, or defaults if none has been saved
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;

        if config.version > CONFIG_VERSION {
            warn!(
                found = config.version,
                supported = CONFIG_VERSION,
                "Config file is from a newer version, using defaults"
            );
            return Ok(Self::default());
        }

        Ok(Self {
            version: CONFIG_VERSION,
            ..config
        })
    }

    /// Save to the user's config file
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Acceptance policy described by this config
    pub fn value_policy(&self) -> ValuePolicy {
        ValuePolicy {
            rule: self.accept,
            min_length: self.min_length,
            allowed_formats: self.allowed_formats.clone(),
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{AcceptPolicy, Candidate};

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScanConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, ScanConfig::default());
        assert_eq!(config.min_length, 1);
        assert_eq!(config.max_dimension, 640);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "accept": "NumericOnly", "min_length": 12 }"#).unwrap();

        let config = ScanConfig::load_from(&path).unwrap();
        assert_eq!(config.accept, AcceptRule::NumericOnly);
        assert_eq!(config.min_length, 12);
        assert_eq!(config.frame_interval(), Duration::from_millis(33));
    }

    #[test]
    fn test_newer_version_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "version": 99, "min_length": 40 }"#).unwrap();

        assert_eq!(ScanConfig::load_from(&path).unwrap(), ScanConfig::default());
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            ScanConfig::load_from(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_value_policy_from_config() {
        let config = ScanConfig {
            accept: AcceptRule::NumericOnly,
            min_length: 4,
            ..ScanConfig::default()
        };
        let policy = config.value_policy();
        assert!(policy.accepts(&Candidate::new("1234", BarcodeFormat::Ean8)));
        assert!(!policy.accepts(&Candidate::new("123", BarcodeFormat::Ean8)));
        assert!(!policy.accepts(&Candidate::new("12a4", BarcodeFormat::Ean8)));
    }
}
