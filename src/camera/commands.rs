use tauri::State;

use crate::{
    camera::{CaptureDevice, PermissionState},
    AppState,
};

/// The webview publishes `enumerateDevices()` results here.
#[tauri::command]
pub fn set_camera_devices(state: State<'_, AppState>, devices: Vec<CaptureDevice>) {
    state.camera.set_devices(devices);
}

/// Answer to the `getUserMedia` permission prompt.
#[tauri::command]
pub fn set_camera_permission(state: State<'_, AppState>, permission: PermissionState) {
    state.camera.set_permission(permission);
}

/// One canvas frame as RGBA bytes. Returns its sequence number.
#[tauri::command]
pub fn push_camera_frame(
    state: State<'_, AppState>,
    width: u32,
    height: u32,
    rgba: Vec<u8>,
) -> Result<u64, String> {
    state
        .camera
        .push_rgba(width, height, rgba)
        .map_err(|e| e.to_string())
}

/// The track ended (`ended` event, device unplugged, permission revoked).
#[tauri::command]
pub fn report_camera_disconnected(state: State<'_, AppState>, reason: String) {
    state.camera.report_disconnected(reason);
}
