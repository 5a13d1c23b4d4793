//! Decode backends.
//!
//! A session decodes with exactly one backend, chosen once by probing the
//! native capability:
//! - [`NativeBackend`]: platform detector (ML Kit, Vision, `BarcodeDetector`),
//!   polled against the live stream.
//! - [`FallbackDecoder`]: the in-crate software decoder, run on every fresh
//!   frame.
//!
//! Both share the same contract: `detect` on a live frame and
//! `decode_snapshot` on a normalized still.

pub mod fallback;
pub mod linear;
pub mod matrix;
pub mod native;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::camera::Frame;
use crate::error::{Result, ScanError};
use crate::preprocess::NormalizedBitmap;

pub use fallback::FallbackDecoder;
pub use matrix::QrDecoder;
pub use native::{NativeBackend, NativeDetection, NativeDetector};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Symbologies the scanner knows about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum SymbolFormat {
    Ean13,
    Ean8,
    UpcA,
    UpcE,
    Code128,
    QrCode,
}

impl SymbolFormat {
    /// Linear retail codes printed on packaged goods.
    pub fn is_retail_linear(&self) -> bool {
        matches!(
            self,
            SymbolFormat::Ean13 | SymbolFormat::Ean8 | SymbolFormat::UpcA | SymbolFormat::UpcE
        )
    }

    /// The formats the app asks for unless configured otherwise.
    pub fn retail_defaults() -> BTreeSet<SymbolFormat> {
        [
            SymbolFormat::Ean13,
            SymbolFormat::Ean8,
            SymbolFormat::UpcA,
            SymbolFormat::UpcE,
        ]
        .into_iter()
        .collect()
    }
}

/// Which backend produced a detection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BackendSource {
    Native,
    Fallback,
}

/// One successful decode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DecodedSymbol {
    pub value: String,
    pub format: SymbolFormat,
    pub detected_at: DateTime<Utc>,
    pub source: BackendSource,
}

impl DecodedSymbol {
    pub fn new(value: impl Into<String>, format: SymbolFormat, source: BackendSource) -> Self {
        Self {
            value: value.into(),
            format,
            detected_at: Utc::now(),
            source,
        }
    }
}

/// Outcome of one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionAttempt {
    Success(DecodedSymbol),
    /// Nothing in view. Expected and never an error.
    NotFound,
    BackendError(ScanError),
}

/// The backend chosen for a session.
pub enum DecodeBackend {
    Native(NativeBackend),
    Fallback(FallbackDecoder),
}

impl DecodeBackend {
    /// Probe `native` once and pick a backend for `required` formats.
    ///
    /// Native is chosen only when the probe succeeds and covers every
    /// required format.
    pub fn select(
        native: Option<Arc<dyn NativeDetector>>,
        required: &BTreeSet<SymbolFormat>,
    ) -> Self {
        let Some(detector) = native else {
            log_info!("no native barcode detector on this platform, using fallback decoder");
            return DecodeBackend::Fallback(FallbackDecoder::new(required));
        };

        match detector.supported_formats() {
            Ok(supported) => {
                let missing: Vec<SymbolFormat> =
                    required.difference(&supported).copied().collect();
                if missing.is_empty() {
                    log_info!("native detector '{}' covers {:?}", detector.name(), required);
                    DecodeBackend::Native(NativeBackend::new(detector, required))
                } else {
                    log_info!(
                        "native detector '{}' lacks {:?}, using fallback decoder",
                        detector.name(),
                        missing
                    );
                    DecodeBackend::Fallback(FallbackDecoder::new(required))
                }
            }
            Err(err) => {
                log_warn!("native detector probe failed ({err}), using fallback decoder");
                DecodeBackend::Fallback(FallbackDecoder::new(required))
            }
        }
    }

    pub fn source(&self) -> BackendSource {
        match self {
            DecodeBackend::Native(_) => BackendSource::Native,
            DecodeBackend::Fallback(_) => BackendSource::Fallback,
        }
    }

    /// Decode a live frame. An empty vector means nothing was found.
    pub fn detect(&self, frame: &Frame) -> Result<Vec<DecodedSymbol>> {
        match self {
            DecodeBackend::Native(native) => native.detect_once(frame),
            DecodeBackend::Fallback(fallback) => Ok(fallback.decode_frame(frame)),
        }
    }

    /// Decode a preprocessed still. Always runs the software decoder.
    pub fn decode_snapshot(&self, bitmap: &NormalizedBitmap) -> Option<DecodedSymbol> {
        match self {
            DecodeBackend::Native(native) => native.snapshot_decoder().decode_snapshot(bitmap),
            DecodeBackend::Fallback(fallback) => fallback.decode_snapshot(bitmap),
        }
    }

    /// Required formats the active backend cannot decode on live frames.
    pub fn unsupported_formats(&self) -> Vec<SymbolFormat> {
        match self {
            DecodeBackend::Native(_) => Vec::new(),
            DecodeBackend::Fallback(fallback) => fallback.unsupported_formats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDetector {
        formats: Option<BTreeSet<SymbolFormat>>,
    }

    impl NativeDetector for FixedDetector {
        fn supported_formats(&self) -> Result<BTreeSet<SymbolFormat>> {
            self.formats
                .clone()
                .ok_or_else(|| ScanError::DecodeFault("probe crashed".into()))
        }

        fn detect(&self, _frame: &Frame) -> Result<Vec<NativeDetection>> {
            Ok(Vec::new())
        }
    }

    fn required() -> BTreeSet<SymbolFormat> {
        [SymbolFormat::Ean13, SymbolFormat::UpcA].into_iter().collect()
    }

    #[test]
    fn no_native_capability_selects_fallback() {
        let backend = DecodeBackend::select(None, &required());
        assert_eq!(backend.source(), BackendSource::Fallback);
    }

    #[test]
    fn native_missing_a_required_format_selects_fallback() {
        let detector = FixedDetector {
            formats: Some([SymbolFormat::QrCode, SymbolFormat::Ean13].into_iter().collect()),
        };
        let backend = DecodeBackend::select(Some(Arc::new(detector)), &required());
        assert_eq!(backend.source(), BackendSource::Fallback);
    }

    #[test]
    fn native_covering_formats_is_selected() {
        let detector = FixedDetector {
            formats: Some(SymbolFormat::retail_defaults()),
        };
        let backend = DecodeBackend::select(Some(Arc::new(detector)), &required());
        assert_eq!(backend.source(), BackendSource::Native);
        assert!(backend.unsupported_formats().is_empty());
    }

    #[test]
    fn failing_probe_selects_fallback() {
        let detector = FixedDetector { formats: None };
        let backend = DecodeBackend::select(Some(Arc::new(detector)), &required());
        assert_eq!(backend.source(), BackendSource::Fallback);
    }

    #[test]
    fn backend_source_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&BackendSource::Fallback).unwrap(),
            "\"fallback\""
        );
    }
}
