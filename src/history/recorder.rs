use crate::decode::DecodedSymbol;
use crate::session::ScanListener;

use super::{HistoryEntry, ScanHistory};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Persists every accepted detection of the session it is subscribed to.
pub struct HistoryRecorder {
    history: ScanHistory,
    session_id: Option<String>,
}

impl HistoryRecorder {
    pub fn new(history: ScanHistory) -> Self {
        Self {
            history,
            session_id: None,
        }
    }

    pub fn for_session(history: ScanHistory, session_id: impl Into<String>) -> Self {
        Self {
            history,
            session_id: Some(session_id.into()),
        }
    }
}

impl ScanListener for HistoryRecorder {
    fn on_detected(&self, symbol: &DecodedSymbol) {
        let entry = HistoryEntry::from_symbol(symbol, self.session_id.as_deref());
        if let Err(err) = self.history.record_detached(entry) {
            log_warn!("could not queue history entry for {}: {err:#}", symbol.value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{BackendSource, SymbolFormat};

    #[tokio::test]
    async fn detections_are_persisted_with_session_id() {
        let history = ScanHistory::in_memory().unwrap();
        let recorder = HistoryRecorder::for_session(history.clone(), "s-42");

        recorder.on_detected(&DecodedSymbol::new(
            "7791234567890",
            SymbolFormat::Ean13,
            BackendSource::Native,
        ));

        let entries = history.list(None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value, "7791234567890");
        assert_eq!(entries[0].session_id.as_deref(), Some("s-42"));
        assert_eq!(entries[0].source, BackendSource::Native);
    }
}
