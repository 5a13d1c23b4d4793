use std::collections::BTreeSet;

use image::GrayImage;

use crate::camera::Frame;
use crate::preprocess::{luminance, NormalizedBitmap};

use super::linear::LinearDecoder;
use super::matrix::QrDecoder;
use super::{BackendSource, DecodedSymbol, SymbolFormat};

/// Software decoder used when the platform has no usable detector.
///
/// Covers EAN-13, UPC-A, EAN-8 and QR. Other requested formats are reported
/// by [`FallbackDecoder::unsupported_formats`] and never decoded.
#[derive(Debug, Clone)]
pub struct FallbackDecoder {
    linear: LinearDecoder,
    /// Only when QR was asked for; grid detection is the costlier pass.
    qr: Option<QrDecoder>,
    requested: BTreeSet<SymbolFormat>,
}

impl FallbackDecoder {
    pub fn new(formats: &BTreeSet<SymbolFormat>) -> Self {
        Self {
            linear: LinearDecoder::new(formats),
            qr: formats.contains(&QrDecoder::FORMAT).then_some(QrDecoder),
            requested: formats.clone(),
        }
    }

    /// Decode a live frame on plain luminance. At most one symbol.
    pub fn decode_frame(&self, frame: &Frame) -> Vec<DecodedSymbol> {
        self.decode_luma(&luminance(&frame.image))
            .into_iter()
            .collect()
    }

    /// Decode a normalized still from the snapshot path.
    pub fn decode_snapshot(&self, bitmap: &NormalizedBitmap) -> Option<DecodedSymbol> {
        self.decode_luma(&bitmap.image)
    }

    /// Linear codes first, then QR.
    pub fn decode_luma(&self, gray: &GrayImage) -> Option<DecodedSymbol> {
        if let Some(found) = self.linear.decode(gray) {
            return Some(DecodedSymbol::new(
                found.text,
                found.format,
                BackendSource::Fallback,
            ));
        }
        self.qr
            .as_ref()
            .and_then(|qr| qr.decode(gray))
            .map(|text| DecodedSymbol::new(text, QrDecoder::FORMAT, BackendSource::Fallback))
    }

    fn can_read(format: SymbolFormat) -> bool {
        format == QrDecoder::FORMAT || LinearDecoder::SUPPORTED.contains(&format)
    }

    /// Requested formats this decoder cannot read.
    pub fn unsupported_formats(&self) -> Vec<SymbolFormat> {
        self.requested
            .iter()
            .copied()
            .filter(|format| !Self::can_read(*format))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::matrix::tests::{render_qr, QR_MB_CODE};

    #[test]
    fn unsupported_formats_lists_what_software_cannot_read() {
        let decoder = FallbackDecoder::new(&SymbolFormat::retail_defaults());
        assert_eq!(decoder.unsupported_formats(), vec![SymbolFormat::UpcE]);

        let linear_only: BTreeSet<_> = [SymbolFormat::Ean13, SymbolFormat::Ean8]
            .into_iter()
            .collect();
        assert!(FallbackDecoder::new(&linear_only)
            .unsupported_formats()
            .is_empty());
    }

    #[test]
    fn qr_is_read_only_when_requested() {
        let image = render_qr(&QR_MB_CODE, 5);

        let with_qr: BTreeSet<_> = [SymbolFormat::Ean13, SymbolFormat::QrCode]
            .into_iter()
            .collect();
        let decoder = FallbackDecoder::new(&with_qr);
        assert!(decoder.unsupported_formats().is_empty());
        let symbol = decoder.decode_luma(&image).unwrap();
        assert_eq!(symbol.value, "MB:7791234567898");
        assert_eq!(symbol.format, SymbolFormat::QrCode);
        assert_eq!(symbol.source, BackendSource::Fallback);

        let retail = FallbackDecoder::new(&SymbolFormat::retail_defaults());
        assert!(retail.decode_luma(&image).is_none());
    }

    #[test]
    fn blank_frame_yields_nothing() {
        let decoder = FallbackDecoder::new(&SymbolFormat::retail_defaults());
        let frame = Frame::new(1, image::RgbImage::from_pixel(64, 16, image::Rgb([240, 240, 240])));
        assert!(decoder.decode_frame(&frame).is_empty());
    }
}
