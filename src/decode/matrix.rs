//! QR code reader for the optional 2D format, built on `rqrr`.

use image::GrayImage;

use super::SymbolFormat;

const ENABLE_LOGS: bool = true;

use crate::log_debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct QrDecoder;

impl QrDecoder {
    pub const FORMAT: SymbolFormat = SymbolFormat::QrCode;

    /// Text of the first grid that decodes cleanly.
    pub fn decode(&self, gray: &GrayImage) -> Option<String> {
        let (width, height) = (gray.width() as usize, gray.height() as usize);
        if width == 0 || height == 0 {
            return None;
        }

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| {
            gray.get_pixel(x as u32, y as u32).0[0]
        });
        prepared
            .detect_grids()
            .into_iter()
            .find_map(|grid| match grid.decode() {
                Ok((_, content)) => Some(content),
                Err(err) => {
                    log_debug!("qr grid found but not decoded: {err:?}");
                    None
                }
            })
    }
}
