//! Scan session: the state machine composing camera, backend, scheduler,
//! cooldown table and guidance.

#[cfg(feature = "app")]
pub mod commands;

pub mod config;
pub mod controller;
pub mod listener;
pub mod state;

pub use config::ScanConfig;
pub use controller::{ScanDeps, ScanSession, SnapshotOutcome};
pub use listener::ScanListener;
pub use state::{ScanSessionState, SessionDiagnostics};
