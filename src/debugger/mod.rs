//! Stepping-debugger bridge between the guest interpreter and a controller.

mod console;
mod event;
mod files;
mod gate;
mod interrupt;
mod position;
mod report;
mod resolver;
mod session;
mod snapshot;
mod stepping;
mod tracer;

pub use console::BridgeConsole;
pub use event::{PauseEvent, RunOutcome, SessionEvent};
pub use files::{FileNamespace, SourceFiles};
pub use gate::{GateDecision, GateHandle, StepGate, Suspension};
pub use interrupt::{InterruptCell, SIGINT};
pub use position::{map_position, HighlightRange, PositionTable};
pub use report::{normalize_newlines, paint_error, ErrorKind, ErrorReport};
pub use resolver::{CustomRule, LoadedValue, NameLookup, Rule, ValueResolver, SKIPPED};
pub use session::{RunConfig, SessionController, SessionSettings, SessionState};
pub use snapshot::{FrameSnapshot, StackEntry};
pub use stepping::{ResumeDecision, RunMode};
pub use tracer::DebugTracer;
