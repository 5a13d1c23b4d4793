//! Error taxonomy for the scanning core.
//!
//! `NotFound` is deliberately absent: an empty decode is the normal state of
//! the loop while nothing is in view and is modelled as
//! [`DetectionAttempt::NotFound`](crate::decode::DetectionAttempt::NotFound).

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

/// Errors surfaced by the camera, the decoders and the session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScanError {
    /// The user (or platform policy) refused camera access.
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    /// No capture device could be enumerated or selected.
    #[error("no camera available")]
    NoCameraAvailable,

    /// The selected device is held by another session or process.
    #[error("camera busy: {0}")]
    DeviceBusy(String),

    /// Backend-internal decode failure. The loop keeps running.
    #[error("decode fault: {0}")]
    DecodeFault(String),

    /// The active device went away mid-stream.
    #[error("camera disconnected: {0}")]
    HardwareDisconnected(String),

    #[error("invalid scan configuration: {0}")]
    InvalidConfig(String),

    /// Operation requires a live session.
    #[error("scan session is not active ({0})")]
    SessionInactive(String),
}

/// Serializable error kind handed to `on_error` listeners and the webview.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PermissionDenied,
    NoCameraAvailable,
    DeviceBusy,
    DecodeFault,
    HardwareDisconnected,
    InvalidConfig,
    SessionInactive,
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            ScanError::NoCameraAvailable => ErrorKind::NoCameraAvailable,
            ScanError::DeviceBusy(_) => ErrorKind::DeviceBusy,
            ScanError::DecodeFault(_) => ErrorKind::DecodeFault,
            ScanError::HardwareDisconnected(_) => ErrorKind::HardwareDisconnected,
            ScanError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            ScanError::SessionInactive(_) => ErrorKind::SessionInactive,
        }
    }

    /// Whether the error ends the session (moves it to `Errored`).
    ///
    /// Open-time failures are terminal for the session instance as well; only
    /// decode faults leave the loop running.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            ScanError::DecodeFault(_) | ScanError::InvalidConfig(_) | ScanError::SessionInactive(_)
        )
    }
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::NoCameraAvailable => "NoCameraAvailable",
            ErrorKind::DeviceBusy => "DeviceBusy",
            ErrorKind::DecodeFault => "DecodeFault",
            ErrorKind::HardwareDisconnected => "HardwareDisconnected",
            ErrorKind::InvalidConfig => "InvalidConfig",
            ErrorKind::SessionInactive => "SessionInactive",
        }
    }
}
