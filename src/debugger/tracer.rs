use std::sync::mpsc::Sender;

use tracing::{debug, trace, warn};

use super::event::{PauseEvent, SessionEvent};
use super::gate::{GateDecision, StepGate, Suspension};
use super::interrupt::InterruptCell;
use super::position::map_position;
use super::resolver::ValueResolver;
use super::snapshot::FrameSnapshot;
use super::stepping::ResumeDecision;
use crate::runtime::{FrameRef, TraceControl, TraceEvent, TraceHook, Value};

/// Trace hook installed for one debug run. Turns opcode events of the target
/// unit into pause offers and blocks on the step gate.
pub struct DebugTracer {
    filename: String,
    line_count: u32,
    resolver: ValueResolver,
    gate: StepGate,
    interrupt: InterruptCell,
    events: Sender<SessionEvent>,
    seq: u64,
}

impl DebugTracer {
    pub fn new(
        filename: impl Into<String>,
        line_count: u32,
        resolver: ValueResolver,
        gate: StepGate,
        interrupt: InterruptCell,
        events: Sender<SessionEvent>,
    ) -> Self {
        Self {
            filename: filename.into(),
            line_count,
            resolver,
            gate,
            interrupt,
            events,
            seq: 0,
        }
    }

    /// Number of pauses offered so far.
    pub fn pauses(&self) -> u64 {
        self.seq
    }

    fn offer(&mut self, frame: &FrameRef<'_>) -> TraceControl {
        let Some(instr) = frame.unit.instruction_at(frame.lasti) else {
            return TraceControl::Continue;
        };
        let (loaded_value, should_pause) = self.resolver.resolve(instr.opcode, instr.arg, frame.unit, frame);
        let highlight = map_position(&**frame.unit, frame.lasti, frame.line);

        if self.gate.evaluate(should_pause, highlight.as_ref()) == GateDecision::Skip {
            trace!(
                target: "step_debugger::gate",
                offset = frame.lasti,
                op = instr.opcode.mnemonic(),
                "skipped"
            );
            return TraceControl::Continue;
        }
        let Some(highlight) = highlight else {
            return TraceControl::Continue;
        };

        let snapshot = match FrameSnapshot::capture(frame) {
            Ok(snapshot) => snapshot,
            Err(err) => return TraceControl::Abort(err.to_string()),
        };
        self.seq += 1;
        let event = PauseEvent {
            seq: self.seq,
            frame: snapshot.clone(),
            highlight,
            loaded_value,
        };

        let result = self.gate.suspend(event, &self.events);
        snapshot.release();

        match result {
            Ok(Suspension::Resumed(ResumeDecision::ContinueStepping)) => TraceControl::Continue,
            Ok(Suspension::Resumed(ResumeDecision::StopDebugging)) => {
                debug!(target: "step_debugger::gate", seq = self.seq, "tracing disabled for this run");
                TraceControl::Untrace
            }
            Ok(Suspension::Cancelled) => TraceControl::Cancel,
            Err(err) => {
                warn!(target: "step_debugger::gate", error = %err, "step gate failed");
                TraceControl::Abort(err.to_string())
            }
        }
    }
}

impl TraceHook for DebugTracer {
    fn trace(&mut self, frame: &FrameRef<'_>, event: TraceEvent, _aux: Option<&Value>) -> TraceControl {
        if event != TraceEvent::Opcode || frame.unit.filename != self.filename {
            return TraceControl::Continue;
        }
        if self.interrupt.is_set() {
            return TraceControl::Cancel;
        }
        if frame.line < 1 || frame.line > self.line_count {
            return TraceControl::Continue;
        }
        self.offer(frame)
    }
}
