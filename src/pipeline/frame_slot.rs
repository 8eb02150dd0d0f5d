// SPDX-License-Identifier: GPL-3.0-only

//! Keep-latest frame slot
//!
//! Capacity is exactly one. The producer never waits: a new frame replaces
//! the pending one, and the replaced frame is released on the spot. The
//! consumer suspends in [`FrameSlot::take`] until a frame is available or
//! the slot is closed.

use crate::backends::camera::types::{Frame, ReleaseReason};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Counters for diagnostics and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    /// Frames handed to `publish`
    pub published: u64,
    /// Frames replaced before anyone took them (includes stale frames)
    pub evicted: u64,
    /// Frames handed to the consumer
    pub taken: u64,
}

#[derive(Default)]
struct SlotState {
    pending: Option<Frame>,
    last_sequence: Option<u64>,
}

/// Single-capacity, latest-wins buffer between producer and consumer
#[derive(Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    notify: Notify,
    closed: AtomicBool,
    published: AtomicU64,
    evicted: AtomicU64,
    taken: AtomicU64,
}

/// What happened to a published frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The slot was empty
    Stored,
    /// Stored, and the previous pending frame was evicted
    Replaced,
    /// Older than a frame already seen; released immediately
    Stale,
    /// The slot is closed; released immediately
    Closed,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer a frame from the producer; never blocks on the consumer
    pub fn publish(&self, frame: Frame) -> PublishOutcome {
        self.published.fetch_add(1, Ordering::Relaxed);
        let sequence = frame.sequence;

        // Frames leaving the slot are released after the lock is dropped
        let (outcome, released) = {
            let mut state = self.state();
            if self.closed.load(Ordering::SeqCst) {
                (PublishOutcome::Closed, Some(frame))
            } else if state.last_sequence.is_some_and(|last| sequence < last) {
                (PublishOutcome::Stale, Some(frame))
            } else {
                state.last_sequence = Some(sequence);
                match state.pending.replace(frame) {
                    Some(old) => (PublishOutcome::Replaced, Some(old)),
                    None => (PublishOutcome::Stored, None),
                }
            }
        };

        match outcome {
            PublishOutcome::Stored | PublishOutcome::Replaced => {
                if let Some(old) = released {
                    self.evicted.fetch_add(1, Ordering::Relaxed);
                    trace!(evicted = old.sequence, by = sequence, "Frame evicted from slot");
                    old.release(ReleaseReason::Evicted);
                }
                self.notify.notify_one();
            }
            PublishOutcome::Stale => {
                self.evicted.fetch_add(1, Ordering::Relaxed);
                debug!(sequence, "Stale frame dropped");
                if let Some(frame) = released {
                    frame.release(ReleaseReason::Evicted);
                }
            }
            PublishOutcome::Closed => {
                trace!(sequence, "Frame arrived after slot closed");
                if let Some(frame) = released {
                    frame.release(ReleaseReason::Cancelled);
                }
            }
        }

        outcome
    }

    /// Take the pending frame without waiting
    pub fn try_take(&self) -> Option<Frame> {
        let frame = self.state().pending.take();
        if frame.is_some() {
            self.taken.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Wait for the most recent frame not yet taken
    ///
    /// Returns `None` once the slot is closed. Single consumer.
    pub async fn take(&self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.try_take() {
                return Some(frame);
            }
            if self.is_closed() {
                return None;
            }
            // notify_one leaves a permit if nobody is waiting yet, so a
            // publish or close between the checks above and here is not lost
            self.notify.notified().await;
        }
    }

    /// Close the slot, releasing the pending frame
    ///
    /// Frames published afterwards are released immediately. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let pending = self.state().pending.take();
        if let Some(frame) = pending {
            frame.release(ReleaseReason::Cancelled);
        }
        self.notify.notify_one();
        debug!("Frame slot closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SlotStats {
        SlotStats {
            published: self.published.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            taken: self.taken.load(Ordering::Relaxed),
        }
    }
}
