use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::error::{Result, ScanError};

use super::{select_preferred_device, CameraProvider, CameraStream, Facing, Frame, ResolutionHint};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Description of the stream a [`FrameSource`] currently holds.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub device_id: String,
    pub label: String,
    pub facing: Facing,
    pub resolution: ResolutionHint,
}

struct ActiveStream {
    stream: Box<dyn CameraStream>,
    info: StreamInfo,
}

/// Owns at most one live camera stream.
///
/// `close` is synchronous and idempotent so it can run from drop paths and
/// from `ScanSession::close` without awaiting.
pub struct FrameSource {
    provider: Arc<dyn CameraProvider>,
    active: Mutex<Option<ActiveStream>>,
}

impl FrameSource {
    pub fn new(provider: Arc<dyn CameraProvider>) -> Self {
        Self {
            provider,
            active: Mutex::new(None),
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveStream>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Enumerate, pick a device for `facing` and acquire it.
    ///
    /// Any stream already held is closed before the provider is asked for a
    /// new one.
    pub async fn open(&self, facing: Facing, resolution: ResolutionHint) -> Result<StreamInfo> {
        self.close();

        let devices = self.provider.enumerate().await?;
        let device = select_preferred_device(&devices, facing)
            .cloned()
            .ok_or(ScanError::NoCameraAvailable)?;

        let stream = self.provider.open(&device, resolution).await?;
        let info = StreamInfo {
            device_id: stream.device_id().to_string(),
            label: device.label.clone(),
            facing: device.facing.unwrap_or(facing),
            resolution: stream.resolution(),
        };

        let mut active = self.active();
        if let Some(mut raced) = active.take() {
            log_warn!(
                "frame source: replacing stream {} opened concurrently",
                raced.info.device_id
            );
            raced.stream.stop();
        }
        log_info!(
            "frame source: streaming from {} ({:?}, label {:?})",
            info.device_id,
            info.facing,
            info.label
        );
        *active = Some(ActiveStream {
            stream,
            info: info.clone(),
        });
        Ok(info)
    }

    /// Stop every track of the active stream and drop it.
    ///
    /// Returns `false` when there was nothing to release.
    pub fn close(&self) -> bool {
        let Some(mut active) = self.active().take() else {
            return false;
        };
        active.stream.stop();
        log_info!("frame source: closed {}", active.info.device_id);
        true
    }

    /// Latest frame of the active stream; `None` when closed or still warming up.
    pub fn grab(&self) -> Result<Option<Arc<Frame>>> {
        match self.active().as_ref() {
            Some(active) => active.stream.grab(),
            None => Ok(None),
        }
    }

    pub fn info(&self) -> Option<StreamInfo> {
        self.active().as_ref().map(|active| active.info.clone())
    }

    pub fn is_live(&self) -> bool {
        self.active()
            .as_ref()
            .is_some_and(|active| active.stream.is_live())
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.close();
    }
}
