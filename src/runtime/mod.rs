//! Reference guest interpreter the debugger attaches to.

mod builtins;
mod compiler;
mod exception;
mod frame;
mod machine;
mod trace;
mod unit;
mod value;

pub use builtins::{Builtin, Console};
pub use compiler::compile;
pub use exception::{ExceptionKind, FailurePoint, GuestException, TraceEntry, Unwind};
pub use frame::{lock, Frame, FrameArena, FrameId, FrameRef, Scope, SharedArena};
pub use machine::{Limits, Machine};
pub use trace::{TraceControl, TraceEvent, TraceHook};
pub use unit::{CompiledUnit, Instruction, Opcode, PositionEntry, INSTRUCTION_WIDTH};
pub use value::{Function, Value};
