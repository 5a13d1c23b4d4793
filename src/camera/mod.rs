//! Camera acquisition: device enumeration, selection and stream lifecycle.
//!
//! Providers sit behind [`CameraProvider`]/[`CameraStream`] so the session can
//! run against the webview bridge in the app and against synthetic devices in
//! tests.

#[cfg(feature = "app")]
pub mod commands;

pub mod bridge;
pub mod selection;
pub mod source;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::{DynamicImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

pub use bridge::{CameraBridge, PermissionState};
pub use selection::select_preferred_device;
pub use source::{FrameSource, StreamInfo};

/// Which way the camera should point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub enum Facing {
    /// Rear camera, the one pointed at products.
    #[default]
    Environment,
    User,
    Any,
}

/// Requested capture size. Providers treat it as "ideal", not "exact".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionHint {
    pub width: u32,
    pub height: u32,
}

impl Default for ResolutionHint {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// One enumerated capture device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureDevice {
    pub id: String,
    /// Empty until the platform has granted camera access on some browsers.
    #[serde(default)]
    pub label: String,
    /// Facing reported by platform metadata, when there is any.
    #[serde(default)]
    pub facing: Option<Facing>,
}

impl CaptureDevice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            facing: None,
        }
    }

    pub fn with_facing(mut self, facing: Facing) -> Self {
        self.facing = Some(facing);
        self
    }
}

/// A single RGB frame from a live stream.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic per-provider counter; the scheduler never decodes a sequence twice.
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(sequence: u64, image: RgbImage) -> Self {
        Self {
            sequence,
            captured_at: Utc::now(),
            image,
        }
    }

    /// Build a frame from a tightly packed RGBA buffer (canvas `ImageData` layout).
    pub fn from_rgba(sequence: u64, width: u32, height: u32, rgba: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        let actual = rgba.len();
        let buffer = RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
            ScanError::DecodeFault(format!(
                "frame buffer has {actual} bytes, expected {expected} for {width}x{height} RGBA"
            ))
        })?;
        Ok(Self::new(sequence, DynamicImage::ImageRgba8(buffer).to_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Source of capture devices.
#[async_trait]
pub trait CameraProvider: Send + Sync {
    async fn enumerate(&self) -> Result<Vec<CaptureDevice>>;

    /// Acquire a live stream. May wait on a user permission prompt.
    async fn open(
        &self,
        device: &CaptureDevice,
        resolution: ResolutionHint,
    ) -> Result<Box<dyn CameraStream>>;
}

/// An acquired camera stream holding a hardware handle until [`stop`](Self::stop).
pub trait CameraStream: Send {
    fn device_id(&self) -> &str;

    fn resolution(&self) -> ResolutionHint;

    /// Latest frame produced since the stream was opened, if any.
    ///
    /// Fails with `HardwareDisconnected` once the device has gone away.
    fn grab(&self) -> Result<Option<Arc<Frame>>>;

    /// Stop every underlying track. Calling it again must be a no-op.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba_frames_drop_alpha() {
        let rgba = vec![10, 20, 30, 255, 40, 50, 60, 0];
        let frame = Frame::from_rgba(7, 2, 1, rgba).unwrap();
        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.image.get_pixel(0, 0).0, [10, 20, 30]);
        assert_eq!(frame.image.get_pixel(1, 0).0, [40, 50, 60]);
    }

    #[test]
    fn short_rgba_buffer_is_rejected() {
        let err = Frame::from_rgba(1, 4, 4, vec![0; 10]).unwrap_err();
        assert!(matches!(err, ScanError::DecodeFault(_)));
    }

    #[test]
    fn facing_uses_camel_case_on_the_wire() {
        let json = serde_json::to_string(&Facing::Environment).unwrap();
        assert_eq!(json, "\"environment\"");
        let parsed: Facing = serde_json::from_str("\"any\"").unwrap();
        assert_eq!(parsed, Facing::Any);
    }
}
