use std::collections::BTreeSet;

use serde::Serialize;

use crate::camera::StreamInfo;
use crate::decode::{BackendSource, SymbolFormat};
use crate::error::{ErrorKind, ScanError};
use crate::scheduler::SchedulerStats;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ScanSessionState {
    #[default]
    Initializing,
    Scanning,
    Paused,
    Closed,
    #[serde(rename_all = "camelCase")]
    Errored { kind: ErrorKind, message: String },
}

impl ScanSessionState {
    pub fn errored(err: &ScanError) -> Self {
        ScanSessionState::Errored {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Holding a camera and a running (possibly paused) loop.
    pub fn is_active(&self) -> bool {
        matches!(self, ScanSessionState::Scanning | ScanSessionState::Paused)
    }

    /// No transition leaves this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanSessionState::Closed | ScanSessionState::Errored { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScanSessionState::Initializing => "initializing",
            ScanSessionState::Scanning => "scanning",
            ScanSessionState::Paused => "paused",
            ScanSessionState::Closed => "closed",
            ScanSessionState::Errored { .. } => "errored",
        }
    }
}

/// Snapshot of a session for debugging panels and tests.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDiagnostics {
    pub session_id: String,
    pub state: ScanSessionState,
    pub source: BackendSource,
    pub required_formats: BTreeSet<SymbolFormat>,
    /// Required formats the active backend cannot read.
    pub unsupported_formats: Vec<SymbolFormat>,
    pub stream: Option<StreamInfo>,
    pub consecutive_failures: u32,
    pub hint_active: bool,
    pub cooldown_entries: usize,
    pub detections: u64,
    pub suppressed: u64,
    pub backend_errors: u64,
    pub scheduler: SchedulerStats,
}
