//! Single-frame capture and normalization for the snapshot decode path.
//!
//! Continuous decoding runs on plain luminance. When it stalls (soft focus,
//! dim aisles, glare) the caller can grab one still and retry on a
//! contrast-stretched, noise-clipped bitmap instead.

use image::{GrayImage, Luma, RgbImage};

use crate::camera::FrameSource;
use crate::error::{Result, ScanError};

/// Frame as captured, RGB at the stream's current resolution.
pub type RawBitmap = RgbImage;

/// Perceptual luma weights (ITU-R BT.601).
const WEIGHT_R: f32 = 0.299;
const WEIGHT_G: f32 = 0.587;
const WEIGHT_B: f32 = 0.114;

/// Stretched values below this snap to black.
pub const NOISE_FLOOR: u8 = 30;

/// Grayscale bitmap stretched to the full 0..=255 range.
#[derive(Debug, Clone)]
pub struct NormalizedBitmap {
    pub image: GrayImage,
    /// Luminance range observed before stretching.
    pub source_min: f32,
    pub source_max: f32,
}

impl NormalizedBitmap {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Grab exactly one frame from the active stream.
pub fn capture(source: &FrameSource) -> Result<RawBitmap> {
    match source.grab()? {
        Some(frame) => Ok(frame.image.clone()),
        None => Err(ScanError::DecodeFault(
            "camera has not produced a frame yet".to_string(),
        )),
    }
}

fn luma(pixel: &image::Rgb<u8>) -> f32 {
    let [r, g, b] = pixel.0;
    WEIGHT_R * f32::from(r) + WEIGHT_G * f32::from(g) + WEIGHT_B * f32::from(b)
}

/// Plain weighted luminance, used by the continuous path.
pub fn luminance(raw: &RawBitmap) -> GrayImage {
    GrayImage::from_fn(raw.width(), raw.height(), |x, y| {
        Luma([luma(raw.get_pixel(x, y)).round().clamp(0.0, 255.0) as u8])
    })
}

/// Luminance, then a linear stretch of [min, max] onto [0, 255], then a hard
/// clip of everything under [`NOISE_FLOOR`] to 0.
///
/// A flat image (max == min) uses a range of 1 and comes out all black.
pub fn normalize(raw: &RawBitmap) -> NormalizedBitmap {
    let lumas: Vec<f32> = raw.pixels().map(luma).collect();

    let (min, max) = lumas
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &value| (lo.min(value), hi.max(value)));
    let (min, max) = if lumas.is_empty() { (0.0, 0.0) } else { (min, max) };

    let range = if max - min < f32::EPSILON { 1.0 } else { max - min };

    let stretched = lumas
        .iter()
        .map(|&value| {
            let scaled = ((value - min) * 255.0 / range).round().clamp(0.0, 255.0) as u8;
            if scaled < NOISE_FLOOR {
                0
            } else {
                scaled
            }
        })
        .collect::<Vec<u8>>();

    let image = GrayImage::from_raw(raw.width(), raw.height(), stretched)
        .unwrap_or_else(|| GrayImage::new(raw.width(), raw.height()));

    NormalizedBitmap {
        image,
        source_min: min,
        source_max: max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn all_white_input_does_not_divide_by_zero() {
        let raw = RgbImage::from_pixel(16, 8, Rgb([255, 255, 255]));
        let normalized = normalize(&raw);
        assert_eq!(normalized.width(), 16);
        assert!(normalized.image.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn empty_input_is_handled() {
        let normalized = normalize(&RgbImage::new(0, 0));
        assert_eq!(normalized.image.len(), 0);
    }

    #[test]
    fn low_contrast_range_is_stretched_to_full_scale() {
        let mut raw = RgbImage::new(3, 1);
        raw.put_pixel(0, 0, Rgb([100, 100, 100]));
        raw.put_pixel(1, 0, Rgb([115, 115, 115]));
        raw.put_pixel(2, 0, Rgb([160, 160, 160]));

        let normalized = normalize(&raw);
        let values: Vec<u8> = normalized.image.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![0, 64, 255]);
    }

    #[test]
    fn near_black_noise_is_clipped() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut raw = RgbImage::new(64, 1);
        for x in 0..32 {
            let noise = rng.gen_range(60..70);
            raw.put_pixel(x, 0, Rgb([noise, noise, noise]));
        }
        for x in 32..64 {
            raw.put_pixel(x, 0, Rgb([200, 200, 200]));
        }

        let normalized = normalize(&raw);
        for x in 0..32 {
            // Noise spans at most 9 of 140 levels, i.e. < 17 after stretching.
            assert_eq!(normalized.image.get_pixel(x, 0).0[0], 0, "pixel {x}");
        }
        for x in 32..64 {
            assert_eq!(normalized.image.get_pixel(x, 0).0[0], 255);
        }
    }

    #[test]
    fn luminance_uses_perceptual_weights() {
        let raw = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        assert_eq!(luminance(&raw).get_pixel(0, 0).0[0], 76);
        let raw = RgbImage::from_pixel(1, 1, Rgb([0, 255, 0]));
        assert_eq!(luminance(&raw).get_pixel(0, 0).0[0], 150);
    }
}
