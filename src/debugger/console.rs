use std::sync::Arc;

use super::interrupt::InterruptCell;
use super::report::normalize_newlines;
use crate::runtime::{Console, ExceptionKind, Unwind};
use crate::terminal::{ReadOutcome, Terminal, TerminalBridge};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[3J\x1b[H";

/// Guest console wired to the terminal bridge. Read outcomes become guest
/// exceptions here, except that a signalled interrupt ends the run.
pub struct BridgeConsole {
    terminal: Arc<dyn Terminal>,
    bridge: TerminalBridge,
    interrupt: InterruptCell,
}

impl BridgeConsole {
    pub fn new(bridge: TerminalBridge, interrupt: InterruptCell) -> Self {
        Self {
            terminal: bridge.terminal().clone(),
            bridge,
            interrupt,
        }
    }
}

impl Console for BridgeConsole {
    fn write(&mut self, text: &str) {
        self.terminal.write(&normalize_newlines(text));
    }

    fn clear(&mut self) {
        self.terminal.write(CLEAR_SCREEN);
    }

    fn read_line(&mut self) -> Result<String, Unwind> {
        match self.bridge.read_line(&self.interrupt) {
            ReadOutcome::Line(line) => Ok(line),
            _ if self.interrupt.is_set() => Err(Unwind::Cancelled),
            ReadOutcome::KeyboardInterrupt => Err(Unwind::raise(ExceptionKind::KeyboardInterrupt, "")),
            ReadOutcome::EndOfInput => Err(Unwind::raise(ExceptionKind::EOFError, "EOF when reading a line")),
            ReadOutcome::Cancelled => Err(Unwind::raise(
                ExceptionKind::RuntimeError,
                "input request was superseded",
            )),
        }
    }
}
