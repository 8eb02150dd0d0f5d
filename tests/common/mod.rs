// SPDX-License-Identifier: GPL-3.0-only

//! Test doubles shared by the integration tests

#![allow(dead_code)]

use serial_scanner::backends::camera::{Frame, FrameBuffer, FrameSource, PixelFormat};
use serial_scanner::errors::{CameraError, EngineError};
use serial_scanner::pipeline::{BarcodeFormat, Candidate, RecognitionEngine};
use serial_scanner::session::{ScanListener, SessionState};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// How long any double waits on another thread before giving up
pub const WAIT: Duration = Duration::from_secs(5);

/// Release count per frame sequence number
#[derive(Default)]
pub struct ReleaseLog {
    counts: Mutex<HashMap<u64, u32>>,
    released: Condvar,
}

impl ReleaseLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, sequence: u64) {
        *self.counts.lock().unwrap().entry(sequence).or_default() += 1;
        self.released.notify_all();
    }

    pub fn count(&self, sequence: u64) -> u32 {
        self.counts.lock().unwrap().get(&sequence).copied().unwrap_or(0)
    }

    /// Block until `sequence` has been released, or the timeout passes
    pub fn wait_released(&self, sequence: u64, timeout: Duration) -> bool {
        let counts = self.counts.lock().unwrap();
        let (counts, _) = self
            .released
            .wait_timeout_while(counts, timeout, |counts| !counts.contains_key(&sequence))
            .unwrap();
        counts.contains_key(&sequence)
    }

    /// Sequences released more or fewer times than once, out of `1..=produced`
    pub fn violations(&self, produced: u64) -> Vec<(u64, u32)> {
        (1..=produced)
            .map(|sequence| (sequence, self.count(sequence)))
            .filter(|(_, count)| *count != 1)
            .collect()
    }
}

/// Frame buffer that reports its release to a [`ReleaseLog`]
pub struct TrackedBuffer {
    sequence: u64,
    log: Arc<ReleaseLog>,
}

impl FrameBuffer for TrackedBuffer {
    fn width(&self) -> u32 {
        4
    }
    fn height(&self) -> u32 {
        4
    }
    fn stride(&self) -> u32 {
        4
    }
    fn format(&self) -> PixelFormat {
        PixelFormat::Gray8
    }
    fn data(&self) -> &[u8] {
        &[0; 16]
    }
    fn close(&mut self) {
        self.log.record(self.sequence);
    }
}

pub fn tracked_frame(sequence: u64, log: &Arc<ReleaseLog>) -> Frame {
    Frame::new(
        sequence,
        TrackedBuffer {
            sequence,
            log: Arc::clone(log),
        },
    )
}

/// One step of a scripted frame source
pub enum Step {
    Frame,
    Fail(CameraError),
    /// Block inside `next_frame` for a while, then carry on with the script
    Stall(Duration),
}

#[derive(Default)]
pub struct SourceCounters {
    pub binds: AtomicUsize,
    pub unbinds: AtomicUsize,
    pub produced: AtomicUsize,
}

/// Frame source that plays back a fixed script, then ends
pub struct ScriptedSource {
    script: VecDeque<Step>,
    next_sequence: u64,
    lockstep: bool,
    fail_bind: bool,
    interval: Duration,
    log: Arc<ReleaseLog>,
    counters: Arc<SourceCounters>,
}

impl ScriptedSource {
    pub fn frames(count: usize, log: &Arc<ReleaseLog>) -> Self {
        Self::script((0..count).map(|_| Step::Frame).collect(), log)
    }

    pub fn script(script: Vec<Step>, log: &Arc<ReleaseLog>) -> Self {
        Self {
            script: script.into(),
            next_sequence: 1,
            lockstep: false,
            fail_bind: false,
            interval: Duration::ZERO,
            log: Arc::clone(log),
            counters: Arc::new(SourceCounters::default()),
        }
    }

    /// Hold each frame back until the previous one has been released
    pub fn lockstep(mut self) -> Self {
        self.lockstep = true;
        self
    }

    pub fn failing_bind(mut self) -> Self {
        self.fail_bind = true;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn counters(&self) -> Arc<SourceCounters> {
        Arc::clone(&self.counters)
    }
}

impl FrameSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn bind(&mut self) -> Result<(), CameraError> {
        if self.fail_bind {
            return Err(CameraError::BindFailed("surface unavailable".to_string()));
        }
        self.counters.binds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        match self.script.pop_front() {
            None => Ok(None),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Stall(duration)) => {
                std::thread::sleep(duration);
                self.next_frame()
            }
            Some(Step::Frame) => {
                let sequence = self.next_sequence;
                if self.lockstep && sequence > 1 {
                    self.log.wait_released(sequence - 1, WAIT);
                }
                if !self.interval.is_zero() {
                    std::thread::sleep(self.interval);
                }
                self.next_sequence += 1;
                self.counters.produced.fetch_add(1, Ordering::SeqCst);
                Ok(Some(tracked_frame(sequence, &self.log)))
            }
        }
    }

    fn unbind(&mut self) {
        self.counters.unbinds.fetch_add(1, Ordering::SeqCst);
    }
}

/// Which decode call a [`ScriptedEngine`] holds until its gate opens
pub enum GateOn {
    FirstCall,
    Sequence(u64),
}

/// Recognition engine with per-frame scripted outcomes
///
/// Frames without a script entry decode to no candidates.
#[derive(Default)]
pub struct ScriptedEngine {
    outcomes: Mutex<HashMap<u64, Result<Vec<Candidate>, EngineError>>>,
    gate_on: Mutex<Option<GateOn>>,
    gate_open: Mutex<bool>,
    gate_changed: Condvar,
    gate_entered: AtomicBool,
    delay: Mutex<Duration>,
    calls: Mutex<Vec<u64>>,
    concurrent: AtomicUsize,
    max_concurrent: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn decode(&self, sequence: u64, values: &[&str]) {
        let candidates = values
            .iter()
            .map(|v| Candidate::new(*v, BarcodeFormat::Ean13))
            .collect();
        self.outcomes.lock().unwrap().insert(sequence, Ok(candidates));
    }

    pub fn fail(&self, sequence: u64) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(sequence, Err(EngineError::Decode("glare".to_string())));
    }

    pub fn gate(&self, on: GateOn) {
        *self.gate_on.lock().unwrap() = Some(on);
    }

    pub fn open_gate(&self) {
        *self.gate_open.lock().unwrap() = true;
        self.gate_changed.notify_all();
    }

    /// Whether a decode is currently held at the gate (or has passed it)
    pub fn gate_entered(&self) -> bool {
        self.gate_entered.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<u64> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    fn should_gate(&self, sequence: u64, first_call: bool) -> bool {
        match *self.gate_on.lock().unwrap() {
            Some(GateOn::FirstCall) => first_call,
            Some(GateOn::Sequence(gated)) => gated == sequence,
            None => false,
        }
    }

    fn wait_for_gate(&self) {
        self.gate_entered.store(true, Ordering::SeqCst);
        let open = self.gate_open.lock().unwrap();
        let _open = self
            .gate_changed
            .wait_timeout_while(open, WAIT, |open| !*open)
            .unwrap();
    }
}

impl RecognitionEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn recognize(&self, frame: &Frame) -> Result<Vec<Candidate>, EngineError> {
        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);

        let first_call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(frame.sequence);
            calls.len() == 1
        };
        if self.should_gate(frame.sequence, first_call) {
            self.wait_for_gate();
        }

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .get(&frame.sequence)
            .cloned()
            .unwrap_or(Ok(Vec::new()))
    }
}

/// Listener that records every callback
#[derive(Default)]
pub struct RecordingListener {
    results: Mutex<Vec<String>>,
    denied: AtomicUsize,
    failures: Mutex<Vec<String>>,
    states: Mutex<Vec<SessionState>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn results(&self) -> Vec<String> {
        self.results.lock().unwrap().clone()
    }

    pub fn denied(&self) -> usize {
        self.denied.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.states.lock().unwrap().clone()
    }

    /// Number of terminal callbacks received
    pub fn outcomes(&self) -> usize {
        self.results().len() + self.denied() + self.failures().len()
    }
}

impl ScanListener for RecordingListener {
    fn on_result(&self, raw_value: &str) {
        self.results.lock().unwrap().push(raw_value.to_string());
    }

    fn on_denied(&self) {
        self.denied.fetch_add(1, Ordering::SeqCst);
    }

    fn on_failed(&self, reason: &str) {
        self.failures.lock().unwrap().push(reason.to_string());
    }

    fn on_state(&self, state: SessionState) {
        self.states.lock().unwrap().push(state);
    }
}

/// Poll `condition` until it holds or [`WAIT`] passes
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
