use std::fmt;
use std::sync::Arc;

use super::unit::CompiledUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    NameError,
    TypeError,
    ValueError,
    ZeroDivisionError,
    OverflowError,
    RecursionError,
    KeyboardInterrupt,
    EOFError,
    RuntimeError,
}

impl ExceptionKind {
    pub fn name(self) -> &'static str {
        match self {
            ExceptionKind::NameError => "NameError",
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::ValueError => "ValueError",
            ExceptionKind::ZeroDivisionError => "ZeroDivisionError",
            ExceptionKind::OverflowError => "OverflowError",
            ExceptionKind::RecursionError => "RecursionError",
            ExceptionKind::KeyboardInterrupt => "KeyboardInterrupt",
            ExceptionKind::EOFError => "EOFError",
            ExceptionKind::RuntimeError => "RuntimeError",
        }
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One line of a traceback, outermost first once unwinding completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub filename: String,
    pub line: u32,
    pub function: String,
}

/// Where the innermost frame was when the exception was raised.
#[derive(Debug, Clone)]
pub struct FailurePoint {
    pub unit: Arc<CompiledUnit>,
    pub offset: usize,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct GuestException {
    pub kind: ExceptionKind,
    pub message: String,
    pub traceback: Vec<TraceEntry>,
    pub failure: Option<FailurePoint>,
}

impl GuestException {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            traceback: Vec::new(),
            failure: None,
        }
    }

    /// `ZeroDivisionError: division by zero`, or just the kind name when the
    /// message is empty.
    pub fn summary(&self) -> String {
        if self.message.is_empty() {
            self.kind.name().to_string()
        } else {
            format!("{}: {}", self.kind, self.message)
        }
    }
}

impl fmt::Display for GuestException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Why a guest frame stopped executing without returning a value.
#[derive(Debug, Clone)]
pub enum Unwind {
    Exception(GuestException),
    /// The interrupt cell was observed set.
    Cancelled,
    /// Host-side failure; the run cannot continue.
    Fault(String),
}

impl Unwind {
    pub fn raise(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Unwind::Exception(GuestException::new(kind, message))
    }
}

impl From<GuestException> for Unwind {
    fn from(exc: GuestException) -> Self {
        Unwind::Exception(exc)
    }
}
