// SPDX-License-Identifier: GPL-3.0-only

//! Core types for recognition results
//!
//! These types flow from the recognition engine through the scan coordinator
//! to the session controller, which hands the single accepted result to the
//! caller.

use serde::{Deserialize, Serialize};

/// Symbology tag reported by the recognition engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarcodeFormat {
    QrCode,
    DataMatrix,
    Aztec,
    Pdf417,
    Ean13,
    Ean8,
    UpcA,
    UpcE,
    Code128,
    Code39,
    Code93,
    Codabar,
    Itf,
    /// The engine did not say
    Unknown,
}

impl BarcodeFormat {
    /// Get display name for the format
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::QrCode => "QR Code",
            Self::DataMatrix => "Data Matrix",
            Self::Aztec => "Aztec",
            Self::Pdf417 => "PDF417",
            Self::Ean13 => "EAN-13",
            Self::Ean8 => "EAN-8",
            Self::UpcA => "UPC-A",
            Self::UpcE => "UPC-E",
            Self::Code128 => "Code 128",
            Self::Code39 => "Code 39",
            Self::Code93 => "Code 93",
            Self::Codabar => "Codabar",
            Self::Itf => "ITF",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One decoded value, as returned by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Decoded content
    pub raw_value: String,
    /// Symbology the value was read from
    pub format: BarcodeFormat,
}

impl Candidate {
    pub fn new(raw_value: impl Into<String>, format: BarcodeFormat) -> Self {
        Self {
            raw_value: raw_value.into(),
            format,
        }
    }
}

/// The value a session delivers to its caller
///
/// Immutable once constructed; at most one exists per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    raw_value: String,
    format: BarcodeFormat,
    decoded_from_frame: u64,
}

impl ScanResult {
    pub(crate) fn new(candidate: Candidate, decoded_from_frame: u64) -> Self {
        Self {
            raw_value: candidate.raw_value,
            format: candidate.format,
            decoded_from_frame,
        }
    }

    pub fn raw_value(&self) -> &str {
        &self.raw_value
    }

    pub fn format(&self) -> BarcodeFormat {
        self.format
    }

    /// Sequence number of the frame the value was decoded from
    pub fn decoded_from_frame(&self) -> u64 {
        self.decoded_from_frame
    }
}

/// Decides whether a decoded value is acceptable to the caller
///
/// Some callers want only numeric serials, others accept anything; the
/// pipeline asks this policy instead of deciding itself.
pub trait AcceptPolicy: Send + Sync {
    fn accepts(&self, candidate: &Candidate) -> bool;
}

impl<F> AcceptPolicy for F
where
    F: Fn(&Candidate) -> bool + Send + Sync,
{
    fn accepts(&self, candidate: &Candidate) -> bool {
        self(candidate)
    }
}

/// Character-level acceptance rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AcceptRule {
    /// Any non-empty value
    #[default]
    Any,
    /// ASCII digits only
    NumericOnly,
}

/// Configurable [`AcceptPolicy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuePolicy {
    pub rule: AcceptRule,
    /// Minimum length in characters; values shorter than this are rejected
    pub min_length: usize,
    /// Accepted symbologies; empty means all
    pub allowed_formats: Vec<BarcodeFormat>,
}

impl Default for ValuePolicy {
    fn default() -> Self {
        Self {
            rule: AcceptRule::Any,
            min_length: 1,
            allowed_formats: Vec::new(),
        }
    }
}

impl ValuePolicy {
    /// Accept only ASCII digit strings
    pub fn numeric_only() -> Self {
        Self {
            rule: AcceptRule::NumericOnly,
            ..Self::default()
        }
    }
}

impl AcceptPolicy for ValuePolicy {
    fn accepts(&self, candidate: &Candidate) -> bool {
        let value = candidate.raw_value.as_str();

        // Empty values are never a scan, whatever the configured minimum
        if value.is_empty() || value.chars().count() < self.min_length {
            return false;
        }

        if !self.allowed_formats.is_empty() && !self.allowed_formats.contains(&candidate.format) {
            return false;
        }

        match self.rule {
            AcceptRule::Any => true,
            AcceptRule::NumericOnly => value.chars().all(|c| c.is_ascii_digit()),
        }
    }
}
