use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::camera::FrameSource;
use crate::decode::{DecodeBackend, DetectionAttempt};
use crate::error::ScanError;

use super::SchedulerStats;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Receives every attempt the loop produces.
///
/// Called from the loop task; implementations must not block for long.
pub trait AttemptSink: Send + Sync {
    fn deliver(&self, attempt: DetectionAttempt);
}

pub(super) struct LoopContext {
    pub session_id: String,
    pub frames: Arc<FrameSource>,
    pub backend: Arc<DecodeBackend>,
    pub sink: Arc<dyn AttemptSink>,
    pub cadence: Duration,
    pub decode_timeout: Duration,
    pub live: Arc<AtomicBool>,
    pub stats: Arc<Mutex<SchedulerStats>>,
}

/// Clears the in-flight flag when the blocking decode finishes, even if the
/// loop stopped waiting for it.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(super) async fn detection_loop(
    ctx: LoopContext,
    cancel_token: CancellationToken,
    mut paused_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(ctx.cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let in_flight = Arc::new(AtomicBool::new(false));
    let mut last_sequence: Option<u64> = None;

    log_info!(
        "detection loop started for session {} ({:?} cadence, {:?} backend)",
        ctx.session_id,
        ctx.cadence,
        ctx.backend.source()
    );

    loop {
        if *paused_rx.borrow_and_update() {
            // Suspended: no ticks, no decode requests until resumed.
            tokio::select! {
                changed = paused_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    ticker.reset();
                    continue;
                }
                _ = cancel_token.cancelled() => break,
            }
        }

        tokio::select! {
            _ = cancel_token.cancelled() => break,
            changed = paused_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if !ctx.live.load(Ordering::Acquire) {
                    break;
                }
                record_tick(&ctx.stats);

                if in_flight.load(Ordering::Acquire) {
                    update_stats(&ctx.stats, |stats| stats.skipped_ticks += 1);
                    log_debug!("previous decode still running, skipping tick");
                    continue;
                }

                let frame = match ctx.frames.grab() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => continue,
                    Err(err) => {
                        let terminal = err.is_terminal();
                        deliver(&ctx, &paused_rx, DetectionAttempt::BackendError(err));
                        if terminal {
                            log_warn!("detection loop for session {} stopping on terminal frame error", ctx.session_id);
                            break;
                        }
                        continue;
                    }
                };
                if last_sequence == Some(frame.sequence) {
                    continue;
                }
                last_sequence = Some(frame.sequence);

                in_flight.store(true, Ordering::Release);
                let guard = InFlight(Arc::clone(&in_flight));
                let backend = Arc::clone(&ctx.backend);
                let task = tokio::task::spawn_blocking(move || {
                    let _guard = guard;
                    backend.detect(&frame)
                });
                update_stats(&ctx.stats, |stats| stats.attempts += 1);

                let outcome = tokio::select! {
                    outcome = tokio::time::timeout(ctx.decode_timeout, task) => outcome,
                    _ = cancel_token.cancelled() => break,
                };

                let attempts = match outcome {
                    Ok(Ok(Ok(symbols))) if symbols.is_empty() => vec![DetectionAttempt::NotFound],
                    Ok(Ok(Ok(symbols))) => symbols.into_iter().map(DetectionAttempt::Success).collect(),
                    Ok(Ok(Err(err))) => vec![DetectionAttempt::BackendError(err)],
                    Ok(Err(join_err)) => vec![DetectionAttempt::BackendError(ScanError::DecodeFault(
                        format!("decoder task failed: {join_err}"),
                    ))],
                    Err(_) => {
                        log_warn!(
                            "decode exceeded {:?} for session {}",
                            ctx.decode_timeout,
                            ctx.session_id
                        );
                        vec![DetectionAttempt::BackendError(ScanError::DecodeFault(format!(
                            "decode timed out after {} ms",
                            ctx.decode_timeout.as_millis()
                        )))]
                    }
                };
                for attempt in attempts {
                    deliver(&ctx, &paused_rx, attempt);
                }
            }
        }
    }

    log_info!("detection loop for session {} shutting down", ctx.session_id);
}

/// Late results (loop stopped or paused while decoding) are dropped here.
fn deliver(ctx: &LoopContext, paused_rx: &watch::Receiver<bool>, attempt: DetectionAttempt) {
    if !ctx.live.load(Ordering::Acquire) {
        log_debug!("dropping attempt delivered after stop");
        return;
    }
    if *paused_rx.borrow() {
        log_debug!("dropping attempt delivered while paused");
        return;
    }
    ctx.sink.deliver(attempt);
}

fn record_tick(stats: &Mutex<SchedulerStats>) {
    update_stats(stats, |stats| {
        stats.ticks += 1;
        stats.last_tick_at = Some(Utc::now());
    });
}

fn update_stats(stats: &Mutex<SchedulerStats>, apply: impl FnOnce(&mut SchedulerStats)) {
    let mut guard = match stats.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    apply(&mut guard);
}
