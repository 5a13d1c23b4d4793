//! Continuous detection loop driver.
//!
//! One tokio task per running scheduler. It ticks at the backend's cadence,
//! decodes the newest frame on the blocking pool and hands every attempt to an
//! [`AttemptSink`]. At most one decode is outstanding; ticks arriving while
//! one runs are skipped, never queued.

mod loop_worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::camera::FrameSource;
use crate::decode::DecodeBackend;
use crate::error::{Result, ScanError};

pub use loop_worker::AttemptSink;

use loop_worker::{detection_loop, LoopContext};

const ENABLE_LOGS: bool = true;

use crate::log_info;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub ticks: u64,
    pub attempts: u64,
    pub skipped_ticks: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
}

/// Loop timing for one run.
#[derive(Debug, Clone, Copy)]
pub struct LoopTiming {
    pub cadence: Duration,
    pub decode_timeout: Duration,
}

struct Running {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
    paused_tx: watch::Sender<bool>,
    live: Arc<AtomicBool>,
}

pub struct DetectionScheduler {
    running: Option<Running>,
    stats: Arc<Mutex<SchedulerStats>>,
}

impl DetectionScheduler {
    pub fn new() -> Self {
        Self {
            running: None,
            stats: Arc::new(Mutex::new(SchedulerStats::default())),
        }
    }

    /// Spawn the loop. Must be called from within a tokio runtime.
    pub fn start(
        &mut self,
        session_id: String,
        frames: Arc<FrameSource>,
        backend: Arc<DecodeBackend>,
        sink: Arc<dyn AttemptSink>,
        timing: LoopTiming,
    ) -> Result<()> {
        if self.running.is_some() {
            return Err(ScanError::InvalidConfig("detection already running".into()));
        }
        if timing.cadence.is_zero() {
            return Err(ScanError::InvalidConfig("loop cadence must be non-zero".into()));
        }

        // A fresh flag per run so a late result from a previous run can
        // never pass the check of this one.
        let live = Arc::new(AtomicBool::new(true));
        let cancel_token = CancellationToken::new();
        let (paused_tx, paused_rx) = watch::channel(false);

        let ctx = LoopContext {
            session_id,
            frames,
            backend,
            sink,
            cadence: timing.cadence,
            decode_timeout: timing.decode_timeout,
            live: Arc::clone(&live),
            stats: Arc::clone(&self.stats),
        };
        let handle = tokio::spawn(detection_loop(ctx, cancel_token.clone(), paused_rx));

        self.running = Some(Running {
            handle,
            cancel_token,
            paused_tx,
            live,
        });
        Ok(())
    }

    pub fn pause(&self) {
        if let Some(running) = &self.running {
            running.paused_tx.send_replace(true);
        }
    }

    pub fn resume(&self) {
        if let Some(running) = &self.running {
            running.paused_tx.send_replace(false);
        }
    }

    /// Synchronous stop. After this returns no attempt reaches the sink.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.live.store(false, Ordering::Release);
        running.cancel_token.cancel();
        running.handle.abort();
        log_info!("detection scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| running.live.load(Ordering::Acquire) && !running.handle.is_finished())
    }

    pub fn is_paused(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| *running.paused_tx.borrow())
    }

    pub fn stats(&self) -> SchedulerStats {
        match self.stats.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for DetectionScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DetectionScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
