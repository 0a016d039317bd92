use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, error};

use super::event::{PauseEvent, SessionEvent};
use super::interrupt::InterruptCell;
use super::position::HighlightRange;
use super::stepping::ResumeDecision;
use crate::error::DebugError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Skip,
    Offer,
}

/// Result of a suspension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspension {
    Resumed(ResumeDecision),
    /// The interrupt cell was set while waiting.
    Cancelled,
}

struct Pending {
    seq: u64,
    reply: Sender<ResumeDecision>,
}

type Slot = Arc<Mutex<Option<Pending>>>;

fn lock_slot(slot: &Slot) -> std::sync::MutexGuard<'_, Option<Pending>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Controller-side handle used to resolve the outstanding pause.
#[derive(Clone, Default)]
pub struct GateHandle {
    slot: Slot,
}

impl GateHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number of the outstanding pause, if any.
    pub fn pending(&self) -> Option<u64> {
        lock_slot(&self.slot).as_ref().map(|p| p.seq)
    }

    fn install(&self, seq: u64, reply: Sender<ResumeDecision>) -> Result<PendingGuard, DebugError> {
        let mut slot = lock_slot(&self.slot);
        if let Some(existing) = slot.as_ref() {
            error!(
                target: "step_debugger::gate",
                pending = existing.seq,
                requested = seq,
                "step gate installed while another is pending"
            );
            return Err(DebugError::GateBusy {
                pending: existing.seq,
            });
        }
        *slot = Some(Pending { seq, reply });
        Ok(PendingGuard {
            slot: self.slot.clone(),
            seq,
        })
    }

    /// Deliver `decision` to pause `seq`.
    pub fn resolve(&self, seq: u64, decision: ResumeDecision) -> Result<(), DebugError> {
        let pending = {
            let mut slot = lock_slot(&self.slot);
            match slot.as_ref().map(|p| p.seq) {
                None => return Err(DebugError::NoPendingPause),
                Some(current) if current != seq => {
                    return Err(DebugError::StalePause {
                        requested: seq,
                        pending: current,
                    })
                }
                Some(_) => slot.take(),
            }
        };
        if let Some(pending) = pending {
            debug!(target: "step_debugger::gate", seq, ?decision, "resolving pause");
            if pending.reply.send(decision).is_err() {
                debug!(target: "step_debugger::gate", seq, "interpreter stopped waiting");
            }
        }
        Ok(())
    }
}

/// Clears the slot when the suspended side stops waiting, however it exits.
struct PendingGuard {
    slot: Slot,
    seq: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut slot = lock_slot(&self.slot);
        if slot.as_ref().is_some_and(|p| p.seq == self.seq) {
            *slot = None;
        }
    }
}

/// Interpreter-side suspension primitive.
pub struct StepGate {
    handle: GateHandle,
    interrupt: InterruptCell,
    poll: Duration,
    last_offered: Option<HighlightRange>,
}

impl StepGate {
    pub fn new(handle: GateHandle, interrupt: InterruptCell, poll: Duration) -> Self {
        Self {
            handle,
            interrupt,
            poll,
            last_offered: None,
        }
    }

    pub fn last_offered(&self) -> Option<&HighlightRange> {
        self.last_offered.as_ref()
    }

    /// Decide whether this instruction pauses. A range equal to the last
    /// offered one is skipped.
    pub fn evaluate(&mut self, should_pause: bool, highlight: Option<&HighlightRange>) -> GateDecision {
        let Some(range) = highlight else {
            return GateDecision::Skip;
        };
        if !should_pause || self.last_offered.as_ref() == Some(range) {
            return GateDecision::Skip;
        }
        self.last_offered = Some(*range);
        GateDecision::Offer
    }

    /// Publish `event` and block until the controller resolves it or the
    /// interrupt cell is set.
    pub fn suspend(
        &mut self,
        event: PauseEvent,
        events: &Sender<SessionEvent>,
    ) -> Result<Suspension, DebugError> {
        let seq = event.seq;
        let (reply, decisions) = mpsc::channel();
        let _guard = self.handle.install(seq, reply)?;

        debug!(
            target: "step_debugger::gate",
            seq,
            line = event.highlight.start_line,
            "pausing"
        );
        events
            .send(SessionEvent::Paused(event))
            .map_err(|_| DebugError::ControllerGone)?;

        loop {
            match decisions.recv_timeout(self.poll) {
                Ok(decision) => return Ok(Suspension::Resumed(decision)),
                Err(RecvTimeoutError::Timeout) => {
                    if self.interrupt.is_set() {
                        debug!(target: "step_debugger::gate", seq, "interrupted while paused");
                        return Ok(Suspension::Cancelled);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(DebugError::ControllerGone),
            }
        }
    }
}
