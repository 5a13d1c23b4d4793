use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::camera::{CameraProvider, Facing, FrameSource, StreamInfo};
use crate::decode::{DecodeBackend, DecodedSymbol, DetectionAttempt, NativeDetector};
use crate::dedup::Deduplicator;
use crate::error::{Result, ScanError};
use crate::guidance::GuidanceEscalation;
use crate::preprocess;
use crate::scheduler::{AttemptSink, DetectionScheduler, LoopTiming};

use super::listener::{ListenerGroup, SessionEvent};
use super::{ScanConfig, ScanListener, ScanSessionState, SessionDiagnostics};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Platform collaborators a session runs against.
#[derive(Clone)]
pub struct ScanDeps {
    pub camera: Arc<dyn CameraProvider>,
    /// `None` when the platform has no native barcode detection.
    pub native: Option<Arc<dyn NativeDetector>>,
}

/// Result of [`ScanSession::request_snapshot_decode`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SnapshotOutcome {
    Detected { symbol: DecodedSymbol },
    /// Decoded, but the value is still cooling down.
    Suppressed { value: String },
    NotFound,
}

enum Verdict {
    Accepted { generation: u64 },
    Suppressed,
}

struct SessionCore {
    state: ScanSessionState,
    facing: Facing,
    dedup: Deduplicator,
    guidance: GuidanceEscalation,
    /// Bumped on every pause/resume so a stale auto-resume timer does nothing.
    pause_generation: u64,
    detections: u64,
    suppressed: u64,
    backend_errors: u64,
}

impl SessionCore {
    fn accept(&mut self, symbol: &DecodedSymbol, now: Instant, events: &mut Vec<SessionEvent>) -> Verdict {
        if !self.dedup.accept(&symbol.value, now) {
            self.suppressed += 1;
            return Verdict::Suppressed;
        }
        self.detections += 1;
        self.guidance.record_success();
        self.pause_generation += 1;
        events.push(SessionEvent::Detected(symbol.clone()));
        if self.state != ScanSessionState::Paused {
            self.state = ScanSessionState::Paused;
            events.push(SessionEvent::StateChanged(ScanSessionState::Paused));
        }
        Verdict::Accepted {
            generation: self.pause_generation,
        }
    }

    fn miss(&mut self, now: Instant, events: &mut Vec<SessionEvent>) {
        if let Some(hint) = self.guidance.record_failure(now) {
            events.push(SessionEvent::Hint(hint));
        }
    }
}

struct SessionInner {
    id: String,
    config: ScanConfig,
    frames: Arc<FrameSource>,
    backend: Arc<DecodeBackend>,
    listeners: ListenerGroup,
    core: Mutex<SessionCore>,
    scheduler: Mutex<DetectionScheduler>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Bridges the detection loop back into the session without keeping it alive.
struct SessionSink(Weak<SessionInner>);

impl AttemptSink for SessionSink {
    fn deliver(&self, attempt: DetectionAttempt) {
        if let Some(inner) = self.0.upgrade() {
            inner.handle_attempt(attempt);
        }
    }
}

impl SessionInner {
    fn core(&self) -> MutexGuard<'_, SessionCore> {
        lock(&self.core)
    }

    fn scheduler(&self) -> MutexGuard<'_, DetectionScheduler> {
        lock(&self.scheduler)
    }

    fn start_loop(self: &Arc<Self>) -> Result<()> {
        let sink: Arc<dyn AttemptSink> = Arc::new(SessionSink(Arc::downgrade(self)));
        let timing = LoopTiming {
            cadence: self.config.cadence(self.backend.source()),
            decode_timeout: self.config.decode_timeout(),
        };
        let mut scheduler = self.scheduler();
        scheduler.stop();
        scheduler.start(
            self.id.clone(),
            Arc::clone(&self.frames),
            Arc::clone(&self.backend),
            sink,
            timing,
        )
    }

    /// Stop the loop and release the camera. Safe to repeat.
    fn teardown(&self) {
        self.scheduler().stop();
        self.frames.close();
    }

    /// Move to `Errored`, release everything and tell the listeners.
    fn fail(&self, err: ScanError) {
        {
            let mut core = self.core();
            if core.state.is_terminal() {
                return;
            }
            core.state = ScanSessionState::errored(&err);
            core.pause_generation += 1;
        }
        self.teardown();
        log_error!("session {}: {}", self.id, err);
        self.listeners.dispatch(vec![
            SessionEvent::Error(err.kind(), err.to_string()),
            SessionEvent::StateChanged(ScanSessionState::errored(&err)),
        ]);
    }

    /// Start the loop over a freshly opened stream and enter `Scanning`.
    fn go_live(self: &Arc<Self>, info: StreamInfo) -> Result<StreamInfo> {
        if let Err(err) = self.start_loop() {
            self.fail(err.clone());
            return Err(err);
        }

        let events = {
            let mut core = self.core();
            if core.state.is_terminal() {
                drop(core);
                self.teardown();
                return Err(ScanError::SessionInactive(format!(
                    "session {} ended while the camera was opening",
                    self.id
                )));
            }
            core.pause_generation += 1;
            if core.state == ScanSessionState::Scanning {
                Vec::new()
            } else {
                core.state = ScanSessionState::Scanning;
                vec![SessionEvent::StateChanged(ScanSessionState::Scanning)]
            }
        };

        log_info!(
            "session {}: scanning on {} with {:?} backend",
            self.id,
            info.device_id,
            self.backend.source()
        );
        self.listeners.dispatch(events);
        Ok(info)
    }

    fn handle_attempt(self: &Arc<Self>, attempt: DetectionAttempt) {
        let now = Instant::now();
        let mut events = Vec::new();
        let mut paused_generation = None;
        {
            let mut core = self.core();
            if core.state != ScanSessionState::Scanning {
                return;
            }
            match attempt {
                DetectionAttempt::Success(symbol) => match core.accept(&symbol, now, &mut events) {
                    Verdict::Accepted { generation } => paused_generation = Some(generation),
                    Verdict::Suppressed => log_debug!("session {}: {} suppressed", self.id, symbol.value),
                },
                DetectionAttempt::NotFound => core.miss(now, &mut events),
                DetectionAttempt::BackendError(err) if err.is_terminal() => {
                    drop(core);
                    self.fail(err);
                    return;
                }
                DetectionAttempt::BackendError(err) => {
                    core.backend_errors += 1;
                    log_warn!("session {}: {}", self.id, err);
                    events.push(SessionEvent::Error(err.kind(), err.to_string()));
                    core.miss(now, &mut events);
                }
            }
        }

        if let Some(generation) = paused_generation {
            self.pause_for_acknowledgement(generation);
        }
        self.listeners.dispatch(events);
    }

    fn pause_for_acknowledgement(self: &Arc<Self>, generation: u64) {
        self.scheduler().pause();
        let weak = Arc::downgrade(self);
        let delay = self.config.detection_pause();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.resume_if(Some(generation));
            }
        });
    }

    /// Paused → Scanning. With a generation, only if no other pause/resume
    /// happened since.
    fn resume_if(&self, generation: Option<u64>) -> bool {
        {
            let mut core = self.core();
            if core.state != ScanSessionState::Paused {
                return false;
            }
            if generation.is_some_and(|generation| generation != core.pause_generation) {
                return false;
            }
            core.state = ScanSessionState::Scanning;
            core.pause_generation += 1;
        }
        self.scheduler().resume();
        self.listeners
            .dispatch(vec![SessionEvent::StateChanged(ScanSessionState::Scanning)]);
        true
    }

    fn process_snapshot(
        self: &Arc<Self>,
        decoded: Option<DecodedSymbol>,
    ) -> Result<SnapshotOutcome> {
        let now = Instant::now();
        let mut events = Vec::new();
        let (outcome, paused_generation) = {
            let mut core = self.core();
            if !core.state.is_active() {
                return Err(ScanError::SessionInactive(core.state.label().to_string()));
            }
            match decoded {
                Some(symbol) => match core.accept(&symbol, now, &mut events) {
                    Verdict::Accepted { generation } => {
                        (SnapshotOutcome::Detected { symbol }, Some(generation))
                    }
                    Verdict::Suppressed => (
                        SnapshotOutcome::Suppressed {
                            value: symbol.value,
                        },
                        None,
                    ),
                },
                None => {
                    core.miss(now, &mut events);
                    (SnapshotOutcome::NotFound, None)
                }
            }
        };

        if let Some(generation) = paused_generation {
            self.pause_for_acknowledgement(generation);
        }
        self.listeners.dispatch(events);
        Ok(outcome)
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.frames.close();
    }
}

/// One scanning session: camera, backend, loop and the state machine tying
/// them together.
///
/// Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct ScanSession {
    inner: Arc<SessionInner>,
}

impl ScanSession {
    /// Validate `config` and probe the backend. The camera is not touched
    /// until [`open`](Self::open).
    pub fn new(config: ScanConfig, deps: ScanDeps) -> Result<Self> {
        config.validate()?;

        let id = Uuid::new_v4().to_string();
        let backend = DecodeBackend::select(deps.native, &config.required_formats);
        let unsupported = backend.unsupported_formats();
        if !unsupported.is_empty() {
            log_warn!(
                "session {}: {:?} backend cannot read {:?}",
                id,
                backend.source(),
                unsupported
            );
        }

        let core = SessionCore {
            state: ScanSessionState::default(),
            facing: config.preferred_facing,
            dedup: Deduplicator::new(
                config.cooldown(),
                config.cooldown_retention(),
                config.cooldown_table_limit,
            ),
            guidance: GuidanceEscalation::new(
                config.failure_hint_threshold,
                config.hint_reprompt(),
            ),
            pause_generation: 0,
            detections: 0,
            suppressed: 0,
            backend_errors: 0,
        };

        Ok(Self {
            inner: Arc::new(SessionInner {
                id,
                frames: Arc::new(FrameSource::new(deps.camera)),
                backend: Arc::new(backend),
                listeners: ListenerGroup::default(),
                core: Mutex::new(core),
                scheduler: Mutex::new(DetectionScheduler::new()),
                config,
            }),
        })
    }

    /// Create, subscribe `listeners` and open the camera.
    ///
    /// Only an invalid config is an `Err`. Open failures are reported through
    /// `on_error` and leave the returned session `Errored`.
    pub async fn start(
        config: ScanConfig,
        deps: ScanDeps,
        listeners: Vec<Arc<dyn ScanListener>>,
    ) -> Result<Self> {
        let session = Self::new(config, deps)?;
        for listener in listeners {
            session.subscribe(listener);
        }
        if let Err(err) = session.open().await {
            log_warn!("session {}: start failed: {}", session.id(), err);
        }
        Ok(session)
    }

    pub fn subscribe(&self, listener: Arc<dyn ScanListener>) {
        self.inner.listeners.add(listener);
    }

    /// Initializing → Scanning, or → Errored on a camera failure.
    ///
    /// May wait on the user's permission answer; the session stays
    /// `Initializing` meanwhile.
    pub async fn open(&self) -> Result<StreamInfo> {
        let facing = {
            let core = self.inner.core();
            if core.state != ScanSessionState::Initializing {
                return Err(ScanError::SessionInactive(core.state.label().to_string()));
            }
            core.facing
        };

        log_info!("session {}: opening camera ({:?})", self.inner.id, facing);
        match self.inner.frames.open(facing, self.inner.config.resolution).await {
            Ok(info) => self.inner.go_live(info),
            Err(err) => {
                self.inner.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Stop the loop and release the camera before returning.
    ///
    /// Idempotent: closing a closed or errored session does nothing.
    pub fn close(&self) {
        {
            let mut core = self.inner.core();
            if core.state.is_terminal() {
                log_debug!("session {}: close on {} session ignored", self.inner.id, core.state.label());
                return;
            }
            core.state = ScanSessionState::Closed;
            core.pause_generation += 1;
        }
        self.inner.teardown();
        log_info!("session {}: closed", self.inner.id);
        self.inner
            .listeners
            .dispatch(vec![SessionEvent::StateChanged(ScanSessionState::Closed)]);
    }

    /// Reopen the camera with another facing, replacing the active handle.
    pub async fn force_facing(&self, facing: Facing) -> Result<StreamInfo> {
        {
            let mut core = self.inner.core();
            if !core.state.is_active() {
                return Err(ScanError::SessionInactive(core.state.label().to_string()));
            }
            core.facing = facing;
        }
        self.inner.scheduler().stop();

        log_info!("session {}: switching camera to {:?}", self.inner.id, facing);
        match self.inner.frames.open(facing, self.inner.config.resolution).await {
            Ok(info) => self.inner.go_live(info),
            Err(err) => {
                self.inner.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Leave the post-detection pause early. `false` if not paused.
    pub fn resume(&self) -> bool {
        self.inner.resume_if(None)
    }

    pub fn dismiss_hint(&self) {
        self.inner.core().guidance.dismiss();
    }

    /// Capture one frame, normalize it and run the software decoder on it.
    ///
    /// Allowed while scanning or paused. The result goes through the same
    /// cooldown and guidance bookkeeping as live detections.
    pub async fn request_snapshot_decode(&self) -> Result<SnapshotOutcome> {
        {
            let core = self.inner.core();
            if !core.state.is_active() {
                return Err(ScanError::SessionInactive(core.state.label().to_string()));
            }
        }

        let raw = match preprocess::capture(&self.inner.frames) {
            Ok(raw) => raw,
            Err(err) => {
                if err.is_terminal() {
                    self.inner.fail(err.clone());
                }
                return Err(err);
            }
        };

        let backend = Arc::clone(&self.inner.backend);
        let decoded = tokio::task::spawn_blocking(move || {
            let bitmap = preprocess::normalize(&raw);
            backend.decode_snapshot(&bitmap)
        })
        .await
        .map_err(|err| ScanError::DecodeFault(format!("snapshot decode task failed: {err}")))?;

        log_info!(
            "session {}: snapshot decode {}",
            self.inner.id,
            if decoded.is_some() { "found a symbol" } else { "found nothing" }
        );
        self.inner.process_snapshot(decoded)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn config(&self) -> &ScanConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ScanSessionState {
        self.inner.core().state.clone()
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        let scheduler = self.inner.scheduler().stats();
        let core = self.inner.core();
        SessionDiagnostics {
            session_id: self.inner.id.clone(),
            state: core.state.clone(),
            source: self.inner.backend.source(),
            required_formats: self.inner.config.required_formats.clone(),
            unsupported_formats: self.inner.backend.unsupported_formats(),
            stream: self.inner.frames.info(),
            consecutive_failures: core.guidance.consecutive_failures(),
            hint_active: core.guidance.is_prompting(),
            cooldown_entries: core.dedup.len(),
            detections: core.detections,
            suppressed: core.suppressed,
            backend_errors: core.backend_errors,
            scheduler,
        }
    }
}
