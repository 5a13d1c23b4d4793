use std::sync::Arc;

use serde::Serialize;
use tauri::{AppHandle, Emitter, State};

use crate::{
    camera::{Facing, StreamInfo},
    decode::DecodedSymbol,
    error::ErrorKind,
    guidance::GuidanceHint,
    history::HistoryRecorder,
    session::{
        ScanConfig, ScanDeps, ScanListener, ScanSession, ScanSessionState, SessionDiagnostics,
        SnapshotOutcome,
    },
    AppState,
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct ScanDetectedEvent<'a> {
    session_id: &'a str,
    symbol: &'a DecodedSymbol,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct ScanErrorEvent<'a> {
    session_id: &'a str,
    kind: ErrorKind,
    message: &'a str,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct ScanHintEvent<'a> {
    session_id: &'a str,
    hint: &'a GuidanceHint,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct ScanStateChangedEvent<'a> {
    session_id: &'a str,
    state: &'a ScanSessionState,
}

/// Re-emits session callbacks as webview events.
struct EventForwarder {
    app_handle: AppHandle,
    session_id: String,
}

impl EventForwarder {
    fn emit<S: Serialize + Clone>(&self, event: &str, payload: S) {
        if let Err(err) = self.app_handle.emit(event, payload) {
            log_warn!("failed to emit {event} for session {}: {err}", self.session_id);
        }
    }
}

impl ScanListener for EventForwarder {
    fn on_detected(&self, symbol: &DecodedSymbol) {
        self.emit(
            "scan-detected",
            ScanDetectedEvent {
                session_id: &self.session_id,
                symbol,
            },
        );
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        self.emit(
            "scan-error",
            ScanErrorEvent {
                session_id: &self.session_id,
                kind,
                message,
            },
        );
    }

    fn on_hint(&self, hint: &GuidanceHint) {
        self.emit(
            "scan-hint",
            ScanHintEvent {
                session_id: &self.session_id,
                hint,
            },
        );
    }

    fn on_state_changed(&self, state: &ScanSessionState) {
        self.emit(
            "scan-state-changed",
            ScanStateChangedEvent {
                session_id: &self.session_id,
                state,
            },
        );
    }
}

async fn current_session(state: &AppState) -> Result<ScanSession, String> {
    state
        .scan
        .lock()
        .await
        .clone()
        .ok_or_else(|| "no scan session".to_string())
}

/// Replace any running session with a new one and open the camera.
///
/// `config` falls back to the stored preferences. The previous session is
/// closed, and its camera released, before the new one opens.
#[tauri::command]
pub async fn start_scan(
    state: State<'_, AppState>,
    app_handle: AppHandle,
    config: Option<ScanConfig>,
) -> Result<SessionDiagnostics, String> {
    let settings = state.settings.scan();
    let config = match config {
        Some(config) => config,
        None => settings.to_config(),
    };
    let deps = ScanDeps {
        camera: Arc::new(state.camera.clone()),
        native: None,
    };
    let session = ScanSession::new(config, deps).map_err(|e| e.to_string())?;

    session.subscribe(Arc::new(EventForwarder {
        app_handle,
        session_id: session.id().to_string(),
    }));
    if settings.record_history {
        session.subscribe(Arc::new(HistoryRecorder::for_session(
            state.history.clone(),
            session.id(),
        )));
    }

    {
        let mut slot = state.scan.lock().await;
        if let Some(previous) = slot.replace(session.clone()) {
            previous.close();
        }
    }

    log_info!("starting scan session {}", session.id());
    // Open failures are reported through `scan-error`; the caller reads the
    // resulting state from the diagnostics.
    let _ = session.open().await;
    Ok(session.diagnostics())
}

#[tauri::command]
pub async fn close_scan(state: State<'_, AppState>) -> Result<(), String> {
    if let Some(session) = state.scan.lock().await.take() {
        session.close();
    }
    Ok(())
}

#[tauri::command]
pub async fn force_camera(
    state: State<'_, AppState>,
    facing: Facing,
) -> Result<StreamInfo, String> {
    let session = current_session(&state).await?;
    session.force_facing(facing).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn resume_scan(state: State<'_, AppState>) -> Result<bool, String> {
    Ok(current_session(&state).await?.resume())
}

#[tauri::command]
pub async fn dismiss_scan_hint(state: State<'_, AppState>) -> Result<(), String> {
    current_session(&state).await?.dismiss_hint();
    Ok(())
}

/// The "Capturar" button: decode one preprocessed still.
#[tauri::command]
pub async fn request_snapshot_decode(
    state: State<'_, AppState>,
) -> Result<SnapshotOutcome, String> {
    let session = current_session(&state).await?;
    session
        .request_snapshot_decode()
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_scan_diagnostics(
    state: State<'_, AppState>,
) -> Result<Option<SessionDiagnostics>, String> {
    Ok(state
        .scan
        .lock()
        .await
        .as_ref()
        .map(ScanSession::diagnostics))
}
