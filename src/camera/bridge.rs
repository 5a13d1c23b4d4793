//! Host-fed camera provider.
//!
//! The actual `getUserMedia` stream lives in the webview (or a platform
//! plugin). The host publishes the device list, answers the permission prompt
//! and pushes frames; the scanning core consumes them through the regular
//! [`CameraProvider`] contract. Only the latest frame is kept, so a slow
//! decoder skips frames instead of queueing them.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard,
};

use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{Result, ScanError};

use super::{CameraProvider, CameraStream, CaptureDevice, Frame, ResolutionHint};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// State of the platform camera permission prompt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PermissionState {
    /// Not answered yet; `open` waits.
    Prompt,
    Granted,
    Denied,
}

struct Holder {
    handle_id: u64,
    device_id: String,
}

struct BridgeShared {
    devices: Mutex<Vec<CaptureDevice>>,
    permission: watch::Sender<PermissionState>,
    frames: watch::Sender<Option<Arc<Frame>>>,
    sequence: AtomicU64,
    holder: Mutex<Option<Holder>>,
    disconnected: Mutex<Option<String>>,
    next_handle: AtomicU64,
    opened: AtomicUsize,
    released: AtomicUsize,
}

/// Cheaply cloneable handle; clones share the same devices and frames.
#[derive(Clone)]
pub struct CameraBridge {
    shared: Arc<BridgeShared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl CameraBridge {
    pub fn new() -> Self {
        let (permission, _) = watch::channel(PermissionState::Prompt);
        let (frames, _) = watch::channel(None);
        Self {
            shared: Arc::new(BridgeShared {
                devices: Mutex::new(Vec::new()),
                permission,
                frames,
                sequence: AtomicU64::new(0),
                holder: Mutex::new(None),
                disconnected: Mutex::new(None),
                next_handle: AtomicU64::new(1),
                opened: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_devices(&self, devices: Vec<CaptureDevice>) {
        log_info!("camera bridge: {} capture device(s) published", devices.len());
        *lock(&self.shared.devices) = devices;
    }

    pub fn set_permission(&self, state: PermissionState) {
        log_info!("camera bridge: permission is now {:?}", state);
        self.shared.permission.send_replace(state);
    }

    pub fn permission(&self) -> PermissionState {
        *self.shared.permission.borrow()
    }

    /// Publish a new frame, replacing any frame not yet consumed.
    pub fn push_frame(&self, image: RgbImage) -> u64 {
        let sequence = self.shared.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared
            .frames
            .send_replace(Some(Arc::new(Frame::new(sequence, image))));
        sequence
    }

    /// Publish a frame given as canvas RGBA bytes.
    pub fn push_rgba(&self, width: u32, height: u32, rgba: Vec<u8>) -> Result<u64> {
        let sequence = self.shared.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        let frame = Frame::from_rgba(sequence, width, height, rgba)?;
        self.shared.frames.send_replace(Some(Arc::new(frame)));
        Ok(sequence)
    }

    /// The host lost the active track (unplugged, revoked, OS reclaimed it).
    pub fn report_disconnected(&self, reason: impl Into<String>) {
        let reason = reason.into();
        log_warn!("camera bridge: device disconnected: {}", reason);
        *lock(&self.shared.disconnected) = Some(reason);
    }

    /// Device currently held by an open stream.
    pub fn active_device(&self) -> Option<String> {
        lock(&self.shared.holder)
            .as_ref()
            .map(|holder| holder.device_id.clone())
    }

    /// Number of hardware handles currently held (0 or 1).
    pub fn active_handles(&self) -> usize {
        usize::from(lock(&self.shared.holder).is_some())
    }

    pub fn open_count(&self) -> usize {
        self.shared.opened.load(Ordering::Acquire)
    }

    pub fn release_count(&self) -> usize {
        self.shared.released.load(Ordering::Acquire)
    }

    async fn wait_for_permission(&self) -> Result<()> {
        let mut rx = self.shared.permission.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                PermissionState::Granted => return Ok(()),
                PermissionState::Denied => {
                    return Err(ScanError::PermissionDenied(
                        "camera access was denied".to_string(),
                    ))
                }
                PermissionState::Prompt => {
                    if rx.changed().await.is_err() {
                        return Err(ScanError::NoCameraAvailable);
                    }
                }
            }
        }
    }
}

impl Default for CameraBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraProvider for CameraBridge {
    async fn enumerate(&self) -> Result<Vec<CaptureDevice>> {
        Ok(lock(&self.shared.devices).clone())
    }

    async fn open(
        &self,
        device: &CaptureDevice,
        resolution: ResolutionHint,
    ) -> Result<Box<dyn CameraStream>> {
        self.wait_for_permission().await?;

        let known = lock(&self.shared.devices)
            .iter()
            .any(|candidate| candidate.id == device.id);
        if !known {
            return Err(ScanError::NoCameraAvailable);
        }

        let handle_id = {
            let mut holder = lock(&self.shared.holder);
            if let Some(current) = holder.as_ref() {
                return Err(ScanError::DeviceBusy(format!(
                    "{} is held by another stream",
                    current.device_id
                )));
            }
            let handle_id = self.shared.next_handle.fetch_add(1, Ordering::AcqRel);
            *holder = Some(Holder {
                handle_id,
                device_id: device.id.clone(),
            });
            handle_id
        };

        *lock(&self.shared.disconnected) = None;
        self.shared.opened.fetch_add(1, Ordering::AcqRel);

        log_info!(
            "camera bridge: opened {} at {}x{} (handle {})",
            device.id,
            resolution.width,
            resolution.height,
            handle_id
        );

        Ok(Box::new(BridgeStream {
            shared: Arc::clone(&self.shared),
            handle_id,
            device_id: device.id.clone(),
            resolution,
            opened_after: self.shared.sequence.load(Ordering::Acquire),
            live: AtomicBool::new(true),
        }))
    }
}

struct BridgeStream {
    shared: Arc<BridgeShared>,
    handle_id: u64,
    device_id: String,
    resolution: ResolutionHint,
    /// Frames at or below this sequence belong to a previous stream.
    opened_after: u64,
    live: AtomicBool,
}

impl CameraStream for BridgeStream {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn resolution(&self) -> ResolutionHint {
        self.shared
            .frames
            .borrow()
            .as_ref()
            .filter(|frame| frame.sequence > self.opened_after)
            .map(|frame| ResolutionHint {
                width: frame.width(),
                height: frame.height(),
            })
            .unwrap_or(self.resolution)
    }

    fn grab(&self) -> Result<Option<Arc<Frame>>> {
        if !self.live.load(Ordering::Acquire) {
            return Ok(None);
        }
        if let Some(reason) = lock(&self.shared.disconnected).clone() {
            return Err(ScanError::HardwareDisconnected(reason));
        }
        Ok(self
            .shared
            .frames
            .borrow()
            .as_ref()
            .filter(|frame| frame.sequence > self.opened_after)
            .cloned())
    }

    fn stop(&mut self) {
        if !self.live.swap(false, Ordering::AcqRel) {
            return;
        }
        let mut holder = lock(&self.shared.holder);
        if holder
            .as_ref()
            .is_some_and(|current| current.handle_id == self.handle_id)
        {
            *holder = None;
        }
        self.shared.released.fetch_add(1, Ordering::AcqRel);
        log_info!("camera bridge: released {} (handle {})", self.device_id, self.handle_id);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

impl Drop for BridgeStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge_with(devices: &[&str]) -> CameraBridge {
        let bridge = CameraBridge::new();
        bridge.set_devices(
            devices
                .iter()
                .map(|label| CaptureDevice::new(*label, *label))
                .collect(),
        );
        bridge
    }

    #[tokio::test]
    async fn denied_permission_fails_open() {
        let bridge = bridge_with(&["back"]);
        bridge.set_permission(PermissionState::Denied);
        let device = CaptureDevice::new("back", "back");
        let err = bridge
            .open(&device, ResolutionHint::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ScanError::PermissionDenied(_)));
        assert_eq!(bridge.active_handles(), 0);
    }

    #[tokio::test]
    async fn open_waits_for_pending_prompt() {
        let bridge = bridge_with(&["back"]);
        let opener = bridge.clone();
        let task = tokio::spawn(async move {
            let device = CaptureDevice::new("back", "back");
            opener.open(&device, ResolutionHint::default()).await.map(|_| ())
        });

        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        bridge.set_permission(PermissionState::Granted);
        task.await.unwrap().unwrap();
        // The stream was dropped inside the task, which releases the handle.
        assert_eq!(bridge.release_count(), 1);
    }

    #[tokio::test]
    async fn second_open_is_busy_and_stop_is_idempotent() {
        let bridge = bridge_with(&["back"]);
        bridge.set_permission(PermissionState::Granted);
        let device = CaptureDevice::new("back", "back");

        let mut first = bridge.open(&device, ResolutionHint::default()).await.unwrap();
        let busy = bridge.open(&device, ResolutionHint::default()).await.err().unwrap();
        assert!(matches!(busy, ScanError::DeviceBusy(_)));

        first.stop();
        first.stop();
        assert_eq!(bridge.release_count(), 1);
        assert_eq!(bridge.active_handles(), 0);
    }

    #[tokio::test]
    async fn streams_ignore_frames_pushed_before_open() {
        let bridge = bridge_with(&["back"]);
        bridge.set_permission(PermissionState::Granted);
        bridge.push_frame(RgbImage::new(4, 4));

        let device = CaptureDevice::new("back", "back");
        let stream = bridge.open(&device, ResolutionHint::default()).await.unwrap();
        assert!(stream.grab().unwrap().is_none());

        let sequence = bridge.push_frame(RgbImage::new(8, 6));
        let frame = stream.grab().unwrap().unwrap();
        assert_eq!(frame.sequence, sequence);
        assert_eq!(stream.resolution(), ResolutionHint { width: 8, height: 6 });
    }

    #[tokio::test]
    async fn disconnect_surfaces_on_grab() {
        let bridge = bridge_with(&["back"]);
        bridge.set_permission(PermissionState::Granted);
        let device = CaptureDevice::new("back", "back");
        let stream = bridge.open(&device, ResolutionHint::default()).await.unwrap();

        bridge.report_disconnected("usb unplugged");
        let err = stream.grab().unwrap_err();
        assert_eq!(err, ScanError::HardwareDisconnected("usb unplugged".into()));
    }
}
