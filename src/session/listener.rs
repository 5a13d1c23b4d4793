use std::sync::{Arc, Mutex};

use crate::decode::DecodedSymbol;
use crate::error::ErrorKind;
use crate::guidance::GuidanceHint;

use super::ScanSessionState;

/// Caller-side callbacks of a session.
///
/// Invoked outside the session lock, from whichever task produced the event
/// (usually the detection loop). Keep them short.
pub trait ScanListener: Send + Sync {
    /// At most once per accepted (non-suppressed) detection.
    fn on_detected(&self, symbol: &DecodedSymbol);

    fn on_error(&self, _kind: ErrorKind, _message: &str) {}

    fn on_hint(&self, _hint: &GuidanceHint) {}

    fn on_state_changed(&self, _state: &ScanSessionState) {}
}

pub(crate) enum SessionEvent {
    Detected(DecodedSymbol),
    Error(ErrorKind, String),
    Hint(GuidanceHint),
    StateChanged(ScanSessionState),
}

#[derive(Default)]
pub(crate) struct ListenerGroup {
    listeners: Mutex<Vec<Arc<dyn ScanListener>>>,
}

impl ListenerGroup {
    pub fn add(&self, listener: Arc<dyn ScanListener>) {
        self.lock().push(listener);
    }

    pub fn dispatch(&self, events: Vec<SessionEvent>) {
        if events.is_empty() {
            return;
        }
        let listeners = self.lock().clone();
        for event in &events {
            for listener in &listeners {
                match event {
                    SessionEvent::Detected(symbol) => listener.on_detected(symbol),
                    SessionEvent::Error(kind, message) => listener.on_error(*kind, message),
                    SessionEvent::Hint(hint) => listener.on_hint(hint),
                    SessionEvent::StateChanged(state) => listener.on_state_changed(state),
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn ScanListener>>> {
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
