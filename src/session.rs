// SPDX-License-Identifier: GPL-3.0-only

//! Scan session lifecycle
//!
//! A [`SessionController`] drives one scan attempt from permission request to
//! a single terminal outcome:
//!
//! ```text
//! Uninitialized ─► PermissionPending ─┬─► Blocked
//!        │                            ├─► Streaming ─┬─► Matched
//!        │                            │              ├─► Failed
//!        └──────────────► Stopped ◄───┴──────────────┘
//! ```
//!
//! The terminal outcome is decided by the [`Session`] gate, a single atomic
//! that moves from open to either matched (the scan coordinator's claim) or
//! closed (stop, failure, denial). Whichever gets there first wins; the
//! state machine only records what the gate decided.

use crate::backends::camera::{
    BoundSource, CaptureLoopController, FrameSource, LoopAction, frame_loop::InitReceiver,
};
use crate::backends::permission::{PermissionProvider, PermissionState, StaticPermission};
use crate::config::ScanConfig;
use crate::constants::pipeline::{
    CAPTURE_ERROR_BACKOFF, CAPTURE_LOOP_NAME, DEFAULT_MAX_CONSECUTIVE_CAPTURE_ERRORS,
};
use crate::errors::{CameraError, SessionError};
use crate::pipeline::coordinator::ScanCoordinator;
use crate::pipeline::frame_slot::FrameSlot;
use crate::pipeline::recognizer::{RecognitionEngine, RecognizerAdapter};
use crate::pipeline::types::{AcceptPolicy, ScanResult, ValuePolicy};
use chrono::{DateTime, Local};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle state of a scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Uninitialized,
    PermissionPending,
    /// Permission was denied; the frame source was never bound
    Blocked,
    Streaming,
    Matched,
    /// The frame source failed to bind or died mid-stream
    Failed,
    Stopped,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Blocked | Self::Matched | Self::Failed | Self::Stopped
        )
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Uninitialized, PermissionPending)
                | (Uninitialized, Stopped)
                | (PermissionPending, Blocked)
                | (PermissionPending, Streaming)
                | (PermissionPending, Stopped)
                | (Streaming, Matched)
                | (Streaming, Failed)
                | (Streaming, Stopped)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::PermissionPending => "permission-pending",
            Self::Blocked => "blocked",
            Self::Streaming => "streaming",
            Self::Matched => "matched",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

const GATE_OPEN: u8 = 0;
const GATE_MATCHED: u8 = 1;
const GATE_CLOSED: u8 = 2;

/// One scan attempt
///
/// Shared read-only with the pipeline; only the controller moves its state.
pub struct Session {
    id: Uuid,
    created_at: DateTime<Local>,
    gate: AtomicU8,
    state: watch::Sender<SessionState>,
    result: OnceLock<ScanResult>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Self {
            id: Uuid::new_v4(),
            created_at: Local::now(),
            gate: AtomicU8::new(GATE_OPEN),
            state,
            result: OnceLock::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receive every state change from now on
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Move to `next` if the state machine allows it
    pub(crate) fn transition(&self, next: SessionState) -> bool {
        let mut from = None;
        self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                from = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });

        match from {
            Some(from) => {
                info!(session = %self.id, %from, to = %next, "Session state changed");
                true
            }
            None => {
                debug!(session = %self.id, current = %self.state(), rejected = %next, "Ignoring state change");
                false
            }
        }
    }

    /// Claim the session's one result
    ///
    /// Succeeds for exactly one caller, and only while the session is open.
    pub fn try_claim(&self) -> bool {
        self.gate
            .compare_exchange(GATE_OPEN, GATE_MATCHED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Close the session to any result
    ///
    /// Returns false if it was already claimed or closed.
    pub fn close(&self) -> bool {
        self.gate
            .compare_exchange(GATE_OPEN, GATE_CLOSED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_open(&self) -> bool {
        self.gate.load(Ordering::SeqCst) == GATE_OPEN
    }

    pub fn is_matched(&self) -> bool {
        self.gate.load(Ordering::SeqCst) == GATE_MATCHED
    }

    /// Store the result of a successful claim
    pub(crate) fn record_result(&self, result: ScanResult) {
        if self.result.set(result).is_err() {
            warn!(session = %self.id, "Result already recorded");
        }
    }

    pub fn result(&self) -> Option<&ScanResult> {
        self.result.get()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("state", &self.state())
            .field("result", &self.result())
            .finish()
    }
}

/// Receives the terminal outcome of a session
///
/// Exactly one of `on_result`, `on_denied` and `on_failed` fires per
/// session, or none if the caller stops it first. Callbacks run on whichever
/// task settled the session and must not block.
pub trait ScanListener: Send + Sync {
    /// The one accepted value
    fn on_result(&self, raw_value: &str);

    /// Camera permission was refused
    fn on_denied(&self) {}

    /// The frame source could not be bound or died
    fn on_failed(&self, _reason: &str) {}

    /// Every state change, terminal or not
    fn on_state(&self, _state: SessionState) {}
}

/// Resources that exist only while streaming
struct Stream {
    slot: Arc<FrameSlot>,
    capture: CaptureLoopController,
    recognizer: Arc<RecognizerAdapter>,
    coordinator: JoinHandle<()>,
}

struct Inner {
    session: Arc<Session>,
    permission: Arc<dyn PermissionProvider>,
    engine: Arc<dyn RecognitionEngine>,
    policy: Arc<dyn AcceptPolicy>,
    listeners: Vec<Arc<dyn ScanListener>>,
    max_consecutive_capture_errors: u32,
    source: Mutex<Option<Box<dyn FrameSource>>>,
    started: AtomicBool,
    permission_state: Mutex<PermissionState>,
    stream: Mutex<Option<Stream>>,
    draining: Mutex<Option<CaptureLoopController>>,
}

impl Inner {
    fn stream(&self) -> MutexGuard<'_, Option<Stream>> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: SessionState) -> bool {
        if !self.session.transition(next) {
            return false;
        }
        for listener in &self.listeners {
            listener.on_state(next);
        }
        true
    }

    /// Bind the source and start the pipeline
    ///
    /// Returns `None` if the session was closed before anything was spawned.
    fn begin_streaming(self: &Arc<Self>) -> Option<InitReceiver> {
        let mut stream = self.stream();
        if !self.session.is_open() {
            return None;
        }
        let source = self
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        let slot = Arc::new(FrameSlot::new());
        let recognizer = Arc::new(RecognizerAdapter::new(Arc::clone(&self.engine)));
        let (fatal_tx, fatal_rx) = oneshot::channel();

        let (capture, init) = CaptureLoopController::start_with_init(
            CAPTURE_LOOP_NAME,
            move || BoundSource::bind(source),
            produce_frames(
                Arc::clone(&slot),
                self.max_consecutive_capture_errors,
                fatal_tx,
            ),
        );

        let coordinator = ScanCoordinator::new(
            Arc::clone(&self.session),
            Arc::clone(&slot),
            Arc::clone(&recognizer),
            Arc::clone(&self.policy),
        );
        let weak = Arc::downgrade(self);
        let coordinator = tokio::spawn(async move {
            if let Some(result) = coordinator.run().await {
                if let Some(inner) = Weak::upgrade(&weak) {
                    inner.complete_match(result);
                }
            }
        });

        // Mid-stream capture failures arrive here rather than being handled
        // on the producer thread, which cannot join itself
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            if let Ok(error) = fatal_rx.await {
                if let Some(inner) = Weak::upgrade(&weak) {
                    inner.fail(&error.to_string());
                }
            }
        });

        *stream = Some(Stream {
            slot,
            capture,
            recognizer,
            coordinator,
        });
        Some(init)
    }

    fn draining(&self) -> MutexGuard<'_, Option<CaptureLoopController>> {
        self.draining.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close the slot, shut the recognizer down and signal the producer
    ///
    /// Never blocks on the producer thread; it is parked in `draining` until
    /// [`Inner::join_capture`] waits for it.
    fn release(&self, abort_coordinator: bool) {
        let mut draining = self.draining();
        let Some(stream) = self.stream().take() else {
            return;
        };
        let Stream {
            slot,
            capture,
            recognizer,
            coordinator,
        } = stream;

        slot.close();
        capture.request_stop();
        recognizer.shutdown();
        if abort_coordinator {
            coordinator.abort();
        }
        *draining = Some(capture);

        let stats = slot.stats();
        debug!(
            session = %self.session.id(),
            published = stats.published,
            evicted = stats.evicted,
            taken = stats.taken,
            engine_calls = recognizer.engine_calls(),
            "Pipeline released"
        );
    }

    /// Wait for the producer thread to exit and the source to be unbound
    fn join_capture(&self) {
        // Held across the join so a concurrent stop() waits for it too
        let mut draining = self.draining();
        if let Some(mut capture) = draining.take() {
            capture.join();
            debug!(session = %self.session.id(), "Frame source released");
        }
    }

    /// Join the producer on the blocking pool when called from a runtime task
    fn join_capture_detached(self: &Arc<Self>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(self);
                handle.spawn_blocking(move || inner.join_capture());
            }
            Err(_) => self.join_capture(),
        }
    }

    fn complete_match(self: &Arc<Self>, result: ScanResult) {
        self.transition(SessionState::Matched);
        // Called from the coordinator task, which is about to finish anyway
        self.release(false);
        for listener in &self.listeners {
            listener.on_result(result.raw_value());
        }
        self.join_capture_detached();
    }

    fn fail(self: &Arc<Self>, reason: &str) {
        if !self.session.close() {
            debug!(session = %self.session.id(), reason, "Session already settled, ignoring failure");
            return;
        }
        error!(session = %self.session.id(), reason, "Scan session failed");
        self.transition(SessionState::Failed);
        self.release(true);
        for listener in &self.listeners {
            listener.on_failed(reason);
        }
        self.join_capture_detached();
    }

    fn stop(&self) {
        if self.session.close() {
            self.transition(SessionState::Stopped);
        }
        self.release(true);
        self.join_capture();
    }
}

/// Producer step run on the capture loop thread for every frame
fn produce_frames(
    slot: Arc<FrameSlot>,
    max_consecutive_errors: u32,
    fatal: oneshot::Sender<CameraError>,
) -> impl FnMut(&mut BoundSource) -> LoopAction + Send + 'static {
    let max_consecutive_errors = max_consecutive_errors.max(1);
    let mut consecutive_errors = 0u32;
    let mut fatal = Some(fatal);

    move |source: &mut BoundSource| {
        if slot.is_closed() {
            return LoopAction::Stop;
        }

        match source.next_frame() {
            Ok(Some(frame)) => {
                consecutive_errors = 0;
                slot.publish(frame);
                LoopAction::Continue
            }
            Ok(None) => {
                info!(source = source.name(), "Frame source ended");
                LoopAction::Stop
            }
            Err(e) => {
                consecutive_errors += 1;
                if matches!(e, CameraError::Disconnected)
                    || consecutive_errors >= max_consecutive_errors
                {
                    error!(source = source.name(), error = %e, consecutive_errors, "Frame source failed");
                    if let Some(fatal) = fatal.take() {
                        let _ = fatal.send(e);
                    }
                    return LoopAction::Stop;
                }
                warn!(source = source.name(), error = %e, "Capture failed, retrying");
                std::thread::sleep(CAPTURE_ERROR_BACKOFF);
                LoopAction::Continue
            }
        }
    }
}

/// Builder for [`SessionController`]
pub struct SessionControllerBuilder {
    source: Box<dyn FrameSource>,
    engine: Arc<dyn RecognitionEngine>,
    permission: Arc<dyn PermissionProvider>,
    policy: Arc<dyn AcceptPolicy>,
    listeners: Vec<Arc<dyn ScanListener>>,
    max_consecutive_capture_errors: u32,
}

impl SessionControllerBuilder {
    /// Permission collaborator; defaults to always granted
    pub fn permission<P: PermissionProvider + 'static>(mut self, permission: P) -> Self {
        self.permission = Arc::new(permission);
        self
    }

    /// Which decoded values count as a scan; defaults to any non-empty value
    pub fn policy<P: AcceptPolicy + 'static>(mut self, policy: P) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn listener<L: ScanListener + 'static>(mut self, listener: Arc<L>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn max_consecutive_capture_errors(mut self, max: u32) -> Self {
        self.max_consecutive_capture_errors = max;
        self
    }

    /// Apply the policy and limits from a loaded config
    pub fn config(self, config: &ScanConfig) -> Self {
        self.policy(config.value_policy())
            .max_consecutive_capture_errors(config.max_consecutive_capture_errors)
    }

    pub fn build(self) -> SessionController {
        let session = Arc::new(Session::new());
        debug!(session = %session.id(), "Session created");
        SessionController {
            inner: Arc::new(Inner {
                session,
                permission: self.permission,
                engine: self.engine,
                policy: self.policy,
                listeners: self.listeners,
                max_consecutive_capture_errors: self.max_consecutive_capture_errors,
                source: Mutex::new(Some(self.source)),
                started: AtomicBool::new(false),
                permission_state: Mutex::new(PermissionState::Unknown),
                stream: Mutex::new(None),
                draining: Mutex::new(None),
            }),
        }
    }
}

/// Drives one scan session; dropping it stops the session
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn builder<S, E>(source: S, engine: Arc<E>) -> SessionControllerBuilder
    where
        S: FrameSource,
        E: RecognitionEngine + 'static,
    {
        SessionControllerBuilder {
            source: Box::new(source),
            engine,
            permission: Arc::new(StaticPermission::granted()),
            policy: Arc::new(ValuePolicy::default()),
            listeners: Vec::new(),
            max_consecutive_capture_errors: DEFAULT_MAX_CONSECUTIVE_CAPTURE_ERRORS,
        }
    }

    /// Request permission and, if granted, start streaming
    ///
    /// Resolves once the session is streaming or has already reached a
    /// terminal state, and returns the state at that point. May be called
    /// once; must be called from within a tokio runtime.
    pub async fn start(&self) -> Result<SessionState, SessionError> {
        let inner = &self.inner;
        if inner.started.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyStarted);
        }
        if !inner.transition(SessionState::PermissionPending) {
            return Err(SessionError::Stopped);
        }

        let permission = inner.permission.request_camera_permission().await;
        *inner
            .permission_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = permission;

        if permission != PermissionState::Granted {
            // Unknown after asking means the platform never said yes
            if inner.session.close() {
                warn!(session = %inner.session.id(), ?permission, "Camera permission not granted");
                inner.transition(SessionState::Blocked);
                for listener in &inner.listeners {
                    listener.on_denied();
                }
            }
            return Ok(self.state());
        }

        if !inner.transition(SessionState::Streaming) {
            return Ok(self.state());
        }
        let Some(init) = inner.begin_streaming() else {
            return Ok(self.state());
        };

        match init.await {
            Ok(Ok(())) => {
                info!(session = %inner.session.id(), "Frame source bound, scanning");
            }
            Ok(Err(e)) => inner.fail(&e.to_string()),
            Err(_) => inner.fail("frame source exited while binding"),
        }
        Ok(self.state())
    }

    /// Stop the session and release every resource
    ///
    /// On return the frame source is unbound and the recognizer is shut
    /// down. A decode that completes afterwards is discarded. Safe to call
    /// any number of times.
    ///
    /// Blocks until the producer thread has left its current `next_frame`
    /// call. The recognizer worker is not joined: a decode already running
    /// when `stop()` is called finishes on its own, releases its frame, and
    /// the worker thread then exits.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn state(&self) -> SessionState {
        self.inner.session.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.session.subscribe()
    }

    /// The accepted value, once matched
    pub fn result(&self) -> Option<ScanResult> {
        self.inner.session.result().cloned()
    }

    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.inner.session)
    }

    /// Permission as answered by the provider, `Unknown` before `start()`
    pub fn permission(&self) -> PermissionState {
        *self
            .inner
            .permission_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until the session reaches a terminal state
    pub async fn wait_for_terminal(&self) -> SessionState {
        let mut state = self.subscribe();
        match state.wait_for(SessionState::is_terminal).await {
            Ok(terminal) => *terminal,
            Err(_) => self.state(),
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
    }
}
