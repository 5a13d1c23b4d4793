use std::collections::BTreeSet;
use std::sync::Arc;

use crate::camera::Frame;
use crate::error::Result;

use super::{BackendSource, DecodedSymbol, FallbackDecoder, SymbolFormat};

/// Raw hit reported by a platform detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeDetection {
    pub value: String,
    pub format: SymbolFormat,
}

/// Platform barcode detection facility.
///
/// Implemented by the host shell (a mobile plugin or the webview's
/// `BarcodeDetector`). Calls may block; the scheduler runs them off the
/// async threads.
pub trait NativeDetector: Send + Sync {
    fn name(&self) -> &str {
        "native"
    }

    /// Capability probe. Called once when a session starts.
    fn supported_formats(&self) -> Result<BTreeSet<SymbolFormat>>;

    /// Zero or more symbols visible in `frame`. An empty result is "nothing
    /// found", not an error.
    fn detect(&self, frame: &Frame) -> Result<Vec<NativeDetection>>;
}

pub struct NativeBackend {
    detector: Arc<dyn NativeDetector>,
    formats: BTreeSet<SymbolFormat>,
    /// Software decoder kept for the snapshot retry path.
    snapshot: FallbackDecoder,
}

impl NativeBackend {
    pub fn new(detector: Arc<dyn NativeDetector>, formats: &BTreeSet<SymbolFormat>) -> Self {
        Self {
            detector,
            formats: formats.clone(),
            snapshot: FallbackDecoder::new(formats),
        }
    }

    /// One polling pass. Hits in formats the session did not ask for are dropped.
    pub fn detect_once(&self, frame: &Frame) -> Result<Vec<DecodedSymbol>> {
        let hits = self.detector.detect(frame)?;
        Ok(hits
            .into_iter()
            .filter(|hit| self.formats.contains(&hit.format))
            .map(|hit| DecodedSymbol::new(hit.value, hit.format, BackendSource::Native))
            .collect())
    }

    pub fn snapshot_decoder(&self) -> &FallbackDecoder {
        &self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use image::RgbImage;

    struct ScriptedDetector;

    impl NativeDetector for ScriptedDetector {
        fn supported_formats(&self) -> Result<BTreeSet<SymbolFormat>> {
            Ok(SymbolFormat::retail_defaults())
        }

        fn detect(&self, frame: &Frame) -> Result<Vec<NativeDetection>> {
            if frame.sequence == 99 {
                return Err(ScanError::DecodeFault("vision request failed".into()));
            }
            Ok(vec![
                NativeDetection {
                    value: "4006381333931".into(),
                    format: SymbolFormat::Ean13,
                },
                NativeDetection {
                    value: "https://example.com".into(),
                    format: SymbolFormat::QrCode,
                },
            ])
        }
    }

    #[test]
    fn detections_outside_requested_formats_are_dropped() {
        let formats: BTreeSet<_> = [SymbolFormat::Ean13].into_iter().collect();
        let backend = NativeBackend::new(Arc::new(ScriptedDetector), &formats);

        let symbols = backend.detect_once(&Frame::new(1, RgbImage::new(2, 2))).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].value, "4006381333931");
        assert_eq!(symbols[0].source, BackendSource::Native);
    }

    #[test]
    fn detector_errors_propagate() {
        let formats: BTreeSet<_> = [SymbolFormat::Ean13].into_iter().collect();
        let backend = NativeBackend::new(Arc::new(ScriptedDetector), &formats);
        let err = backend
            .detect_once(&Frame::new(99, RgbImage::new(2, 2)))
            .unwrap_err();
        assert!(matches!(err, ScanError::DecodeFault(_)));
    }
}
