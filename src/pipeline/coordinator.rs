// SPDX-License-Identifier: GPL-3.0-only

//! Scan coordinator
//!
//! Pulls frames from the slot, sends each to the recognizer, and settles the
//! outcome. Settling is the only place a result can come from, and it goes
//! through the session's atomic claim, so two completions racing each other
//! (or a completion racing `stop()`) can never both produce a result.

use crate::backends::camera::types::{Frame, ReleaseReason};
use crate::pipeline::frame_slot::FrameSlot;
use crate::pipeline::recognizer::{RecognizeOutcome, RecognizerAdapter};
use crate::pipeline::types::{AcceptPolicy, ScanResult};
use crate::session::Session;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// What the coordinator decided about one decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Nothing usable; keep scanning
    Continue,
    /// This frame won the session
    Matched(ScanResult),
    /// Usable value, but the session was already matched or closed
    Discarded,
}

/// Consumer side of the pipeline for one session
pub struct ScanCoordinator {
    session: Arc<Session>,
    slot: Arc<FrameSlot>,
    recognizer: Arc<RecognizerAdapter>,
    policy: Arc<dyn AcceptPolicy>,
}

impl ScanCoordinator {
    pub fn new(
        session: Arc<Session>,
        slot: Arc<FrameSlot>,
        recognizer: Arc<RecognizerAdapter>,
        policy: Arc<dyn AcceptPolicy>,
    ) -> Self {
        Self {
            session,
            slot,
            recognizer,
            policy,
        }
    }

    /// Run until a frame wins the session, or the session/slot/recognizer closes
    pub async fn run(&self) -> Option<ScanResult> {
        debug!(session = %self.session.id(), "Scan coordinator started");

        while let Some(frame) = self.slot.take().await {
            if !self.session.is_open() {
                frame.release(ReleaseReason::Cancelled);
                break;
            }

            let (frame, outcome) = match self.recognizer.recognize(frame).await {
                Ok(recognition) => recognition,
                Err(e) => {
                    debug!(error = %e, "Recognizer unavailable, coordinator exiting");
                    break;
                }
            };

            match self.settle(frame, outcome) {
                Settlement::Continue => {}
                Settlement::Matched(result) => return Some(result),
                Settlement::Discarded => break,
            }
        }

        debug!(session = %self.session.id(), "Scan coordinator finished without a match");
        None
    }

    /// Decide what a decode outcome means for the session
    ///
    /// Consumes the frame and releases it on every path.
    pub fn settle(&self, frame: Frame, outcome: RecognizeOutcome) -> Settlement {
        let sequence = frame.sequence;

        let candidates = match outcome {
            RecognizeOutcome::NoCandidates => {
                trace!(sequence, "No candidates");
                frame.release(ReleaseReason::NoCandidates);
                return Settlement::Continue;
            }
            RecognizeOutcome::Failure(e) => {
                warn!(sequence, error = %e, "Decode failed, dropping frame");
                frame.release(ReleaseReason::DecodeFailed);
                return Settlement::Continue;
            }
            RecognizeOutcome::Candidates(candidates) => candidates,
        };

        // Engine order is authoritative: the first acceptable candidate is the one
        let Some(candidate) = candidates.into_iter().find(|c| self.policy.accepts(c)) else {
            debug!(sequence, "Candidates rejected by value policy");
            frame.release(ReleaseReason::Rejected);
            return Settlement::Continue;
        };

        if !self.session.try_claim() {
            debug!(sequence, "Session already settled, discarding candidate");
            frame.release(ReleaseReason::LostClaim);
            return Settlement::Discarded;
        }

        let result = ScanResult::new(candidate, sequence);
        self.session.record_result(result.clone());
        info!(
            session = %self.session.id(),
            sequence,
            format = %result.format(),
            "Scan matched"
        );
        frame.release(ReleaseReason::Matched);
        Settlement::Matched(result)
    }
}
