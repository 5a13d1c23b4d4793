pub mod camera;
pub mod decode;
pub mod dedup;
pub mod error;
pub mod guidance;
pub mod history;
pub mod preprocess;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod utils;

pub use error::{ErrorKind, ScanError};
pub use session::{ScanConfig, ScanDeps, ScanListener, ScanSession, ScanSessionState};
pub use utils::init_logging;

#[cfg(feature = "app")]
mod app {
    use tauri::{Emitter, Manager, State};
    use tokio::sync::Mutex;

    use crate::camera::commands::{
        push_camera_frame, report_camera_disconnected, set_camera_devices, set_camera_permission,
    };
    use crate::camera::CameraBridge;
    use crate::history::commands::{
        clear_scan_history, count_scan_history, delete_scan_history_entry, list_scan_history,
    };
    use crate::history::ScanHistory;
    use crate::session::commands::{
        close_scan, dismiss_scan_hint, force_camera, get_scan_diagnostics,
        request_snapshot_decode, resume_scan, start_scan,
    };
    use crate::session::ScanSession;
    use crate::settings::{ScanSettings, SettingsStore};

    pub(crate) struct AppState {
        pub(crate) camera: CameraBridge,
        pub(crate) scan: Mutex<Option<ScanSession>>,
        pub(crate) history: ScanHistory,
        pub(crate) settings: SettingsStore,
    }

    #[tauri::command]
    fn get_scan_settings(state: State<AppState>) -> Result<ScanSettings, String> {
        Ok(state.settings.scan())
    }

    #[tauri::command]
    fn set_scan_settings(
        settings: ScanSettings,
        state: State<AppState>,
        app_handle: tauri::AppHandle,
    ) -> Result<(), String> {
        state
            .settings
            .update_scan(settings.clone())
            .map_err(|e| format!("{e:#}"))?;

        app_handle
            .emit("scan-settings-updated", &settings)
            .map_err(|e| e.to_string())?;

        Ok(())
    }

    #[cfg_attr(mobile, tauri::mobile_entry_point)]
    pub fn run() {
        crate::init_logging();

        log::info!("MasBarato starting up...");

        tauri::Builder::default()
            .plugin(tauri_plugin_opener::init())
            .setup(|app| {
                let result = (|| -> anyhow::Result<()> {
                    let app_data_dir = app
                        .path()
                        .app_data_dir()
                        .map_err(|err| anyhow::anyhow!(err))?;
                    std::fs::create_dir_all(&app_data_dir)?;

                    let history = ScanHistory::new(app_data_dir.join("history.sqlite3"))?;
                    let settings = SettingsStore::new(app_data_dir.join("settings.json"))?;

                    app.manage(AppState {
                        camera: CameraBridge::new(),
                        scan: Mutex::new(None),
                        history,
                        settings,
                    });

                    Ok(())
                })();

                result.map_err(|err| err.into())
            })
            .invoke_handler(tauri::generate_handler![
                start_scan,
                close_scan,
                force_camera,
                resume_scan,
                dismiss_scan_hint,
                request_snapshot_decode,
                get_scan_diagnostics,
                set_camera_devices,
                set_camera_permission,
                push_camera_frame,
                report_camera_disconnected,
                list_scan_history,
                delete_scan_history_entry,
                clear_scan_history,
                count_scan_history,
                get_scan_settings,
                set_scan_settings,
            ])
            .run(tauri::generate_context!())
            .unwrap_or_else(|err| log::error!("error while running tauri application: {err}"));
    }
}

#[cfg(feature = "app")]
pub(crate) use app::AppState;

#[cfg(feature = "app")]
pub use app::run;
