// SPDX-License-Identifier: GPL-3.0-only

//! Recognizer adapter
//!
//! Wraps a recognition engine behind one request/response contract: a frame
//! goes in, and the same frame comes back together with the outcome over a
//! one-shot channel. Decoding runs on a single dedicated worker thread owned
//! by the session, so at most one decode is in flight at any time and the
//! frame producer is never slowed down by it.

use crate::backends::camera::types::{Frame, ReleaseReason};
use crate::constants::pipeline::RECOGNIZER_THREAD_NAME;
use crate::errors::{EngineError, RecognizerError};
use crate::pipeline::types::Candidate;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// External decode capability
///
/// Called on the recognizer's worker thread, one frame at a time. The
/// returned candidates keep the engine's own order; the first accepted one
/// wins.
pub trait RecognitionEngine: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &str {
        "engine"
    }

    /// Decode every code visible in the frame
    fn recognize(&self, frame: &Frame) -> Result<Vec<Candidate>, EngineError>;
}

/// Result of one decode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizeOutcome {
    /// The engine found nothing
    NoCandidates,
    /// Decoded values in engine order (never empty)
    Candidates(Vec<Candidate>),
    /// The engine failed on this frame
    Failure(EngineError),
}

impl From<Result<Vec<Candidate>, EngineError>> for RecognizeOutcome {
    fn from(result: Result<Vec<Candidate>, EngineError>) -> Self {
        match result {
            Ok(candidates) if candidates.is_empty() => Self::NoCandidates,
            Ok(candidates) => Self::Candidates(candidates),
            Err(e) => Self::Failure(e),
        }
    }
}

/// A completed request: the frame handed back plus what the engine said
pub type Recognition = (Frame, RecognizeOutcome);

struct Job {
    frame: Frame,
    reply: oneshot::Sender<Recognition>,
}

/// Session-scoped, single-worker front end to a [`RecognitionEngine`]
pub struct RecognizerAdapter {
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shut_down: Arc<AtomicBool>,
    engine_calls: Arc<AtomicU64>,
}

impl RecognizerAdapter {
    /// Spawn the worker thread for `engine`
    pub fn new(engine: Arc<dyn RecognitionEngine>) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let shut_down = Arc::new(AtomicBool::new(false));
        let engine_calls = Arc::new(AtomicU64::new(0));

        let worker = {
            let shut_down = Arc::clone(&shut_down);
            let engine_calls = Arc::clone(&engine_calls);
            thread::Builder::new()
                .name(RECOGNIZER_THREAD_NAME.to_string())
                .spawn(move || run_worker(engine, jobs_rx, shut_down, engine_calls))
        };

        let (jobs, worker) = match worker {
            Ok(handle) => (Some(jobs_tx), Some(handle)),
            Err(e) => {
                // Every request will report ShutDown
                warn!(error = %e, "Failed to spawn recognizer worker");
                shut_down.store(true, Ordering::SeqCst);
                (None, None)
            }
        };

        Self {
            jobs: Mutex::new(jobs),
            worker: Mutex::new(worker),
            shut_down,
            engine_calls,
        }
    }

    fn jobs(&self) -> MutexGuard<'_, Option<mpsc::Sender<Job>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decode `frame` on the worker and hand it back with the outcome
    ///
    /// If the adapter is shut down before the request completes, the frame
    /// is released by the adapter and `RecognizerError::ShutDown` is returned.
    pub async fn recognize(&self, frame: Frame) -> Result<Recognition, RecognizerError> {
        let sender = self.jobs().clone();
        let Some(sender) = sender else {
            frame.release(ReleaseReason::Cancelled);
            return Err(RecognizerError::ShutDown);
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if let Err(mpsc::SendError(job)) = sender.send(Job {
            frame,
            reply: reply_tx,
        }) {
            job.frame.release(ReleaseReason::Cancelled);
            return Err(RecognizerError::ShutDown);
        }
        drop(sender);

        // Dropped without a reply only when the worker skipped the job (and released the frame)
        reply_rx.await.map_err(|_| RecognizerError::ShutDown)
    }

    /// Close the executor to new work
    ///
    /// Returns immediately. A job already queued is skipped and its frame
    /// released; a decode already running finishes on the worker and its
    /// frame is released there once the engine returns.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.jobs().take();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = worker {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                debug!("Recognizer worker still decoding, detaching");
            }
        }
        debug!("Recognizer shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// How many times the engine has been invoked
    pub fn engine_calls(&self) -> u64 {
        self.engine_calls.load(Ordering::SeqCst)
    }
}

impl Drop for RecognizerAdapter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    engine: Arc<dyn RecognitionEngine>,
    jobs: mpsc::Receiver<Job>,
    shut_down: Arc<AtomicBool>,
    engine_calls: Arc<AtomicU64>,
) {
    debug!(engine = engine.name(), "Recognizer worker started");

    while let Ok(Job { frame, reply }) = jobs.recv() {
        if shut_down.load(Ordering::SeqCst) || reply.is_closed() {
            trace!(sequence = frame.sequence, "Skipping decode, request abandoned");
            frame.release(ReleaseReason::Cancelled);
            continue;
        }

        engine_calls.fetch_add(1, Ordering::SeqCst);
        let start = Instant::now();
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| engine.recognize(&frame))) {
            Ok(result) => RecognizeOutcome::from(result),
            Err(_) => {
                warn!(sequence = frame.sequence, "Recognition engine panicked");
                RecognizeOutcome::Failure(EngineError::Panicked)
            }
        };
        trace!(
            sequence = frame.sequence,
            decode_ms = start.elapsed().as_millis(),
            "Decode finished"
        );

        if let Err((frame, _)) = reply.send((frame, outcome)) {
            debug!(sequence = frame.sequence, "Decode result abandoned by requester");
            frame.release(ReleaseReason::Cancelled);
        }
    }

    debug!(engine = engine.name(), "Recognizer worker exiting");
}
