use tauri::State;

use crate::{history::HistoryEntry, AppState};

#[tauri::command]
pub async fn list_scan_history(
    state: State<'_, AppState>,
    limit: Option<u32>,
) -> Result<Vec<HistoryEntry>, String> {
    state.history.list(limit).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn delete_scan_history_entry(
    state: State<'_, AppState>,
    entry_id: String,
) -> Result<bool, String> {
    state
        .history
        .remove(&entry_id)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn clear_scan_history(state: State<'_, AppState>) -> Result<usize, String> {
    state.history.clear().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn count_scan_history(state: State<'_, AppState>) -> Result<u64, String> {
    state.history.count().await.map_err(|e| e.to_string())
}
