use serde::Serialize;

use super::position::HighlightRange;
use super::report::ErrorReport;
use super::resolver::LoadedValue;
use super::snapshot::FrameSnapshot;

/// A pause offered to the controller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseEvent {
    /// 1-based, increasing in program order within a run.
    pub seq: u64,
    #[serde(skip)]
    pub frame: FrameSnapshot,
    pub highlight: HighlightRange,
    pub loaded_value: LoadedValue,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed { error: ErrorReport },
    /// Host-side failure, not caused by the guest program.
    Fault { reason: String },
}

impl RunOutcome {
    pub fn error(&self) -> Option<&ErrorReport> {
        match self {
            RunOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Process exit status for the command-line driver.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::Failed { .. } => 1,
            RunOutcome::Cancelled => 130,
            RunOutcome::Fault { .. } => 2,
        }
    }
}

/// Messages from the interpreter thread to the controller.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Paused(PauseEvent),
    Terminated(RunOutcome),
}
