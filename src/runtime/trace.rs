use super::frame::FrameRef;
use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// A frame is about to start executing.
    Call,
    /// The first instruction of a new source line.
    Line,
    /// Every instruction, before it executes.
    Opcode,
    /// A frame is about to return; aux carries the return value.
    Return,
}

impl TraceEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            TraceEvent::Call => "call",
            TraceEvent::Line => "line",
            TraceEvent::Opcode => "opcode",
            TraceEvent::Return => "return",
        }
    }
}

/// What the machine does after a hook returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceControl {
    Continue,
    /// Drop the hook for the rest of the run.
    Untrace,
    /// Unwind the run as cancelled.
    Cancel,
    /// Unwind the run as a host fault.
    Abort(String),
}

/// Per-run trace callback, owned by the machine while installed.
///
/// Runs synchronously on the interpreter thread; the machine does not
/// continue until `trace` returns.
pub trait TraceHook: Send {
    fn trace(&mut self, frame: &FrameRef<'_>, event: TraceEvent, aux: Option<&Value>) -> TraceControl;
}

impl<F> TraceHook for F
where
    F: FnMut(&FrameRef<'_>, TraceEvent, Option<&Value>) -> TraceControl + Send,
{
    fn trace(&mut self, frame: &FrameRef<'_>, event: TraceEvent, aux: Option<&Value>) -> TraceControl {
        self(frame, event, aux)
    }
}
