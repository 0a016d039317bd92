use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::editor::{EditOutcome, LineEditor};
use super::keys::KeyEvent;
use super::{KeyHandler, ReadOutcome, Subscription, Terminal};
use crate::debugger::InterruptCell;

struct PendingRead {
    id: u64,
    editor: LineEditor,
    done: Sender<ReadOutcome>,
    _subscription: Subscription,
}

struct Inner {
    terminal: Arc<dyn Terminal>,
    pending: Mutex<Option<PendingRead>>,
    next_id: AtomicU64,
    poll: Duration,
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Option<PendingRead>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_key(&self, id: u64, key: KeyEvent) {
        let mut echo = String::new();
        let finished = {
            let mut slot = self.slot();
            let Some(pending) = slot.as_mut().filter(|p| p.id == id) else {
                return;
            };
            let outcome = match pending.editor.apply(&key, &mut echo) {
                EditOutcome::Pending => None,
                EditOutcome::Line(line) => Some(ReadOutcome::Line(line)),
                EditOutcome::KeyboardInterrupt => Some(ReadOutcome::KeyboardInterrupt),
                EditOutcome::EndOfInput => Some(ReadOutcome::EndOfInput),
            };
            outcome.and_then(|outcome| slot.take().map(|read| (read, outcome)))
        };

        if !echo.is_empty() {
            self.terminal.write(&echo);
        }
        if let Some((read, outcome)) = finished {
            let _ = read.done.send(outcome);
        }
    }
}

/// Serves blocking line reads from a key-event terminal. At most one read
/// is pending; a new read cancels the old one first.
#[derive(Clone)]
pub struct TerminalBridge {
    inner: Arc<Inner>,
}

impl TerminalBridge {
    pub fn new(terminal: Arc<dyn Terminal>, poll: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                terminal,
                pending: Mutex::new(None),
                next_id: AtomicU64::new(1),
                poll,
            }),
        }
    }

    pub fn terminal(&self) -> &Arc<dyn Terminal> {
        &self.inner.terminal
    }

    pub fn is_pending(&self) -> bool {
        self.inner.slot().is_some()
    }

    /// Block until a line is entered, the read is superseded or cancelled,
    /// or `interrupt` is set. An interrupt resolves as a keyboard interrupt.
    pub fn read_line(&self, interrupt: &InterruptCell) -> ReadOutcome {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (done, outcomes) = mpsc::channel();

        let weak = Arc::downgrade(&self.inner);
        let handler: KeyHandler = Arc::new(move |key| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_key(id, key);
            }
        });
        let subscription = self.inner.terminal.on_key_event(handler);
        self.inner.terminal.set_cursor_visible(true);

        let superseded = self.inner.slot().replace(PendingRead {
            id,
            editor: LineEditor::new(),
            done,
            _subscription: subscription,
        });
        if let Some(previous) = superseded {
            debug!(target: "step_debugger::terminal", previous = previous.id, id, "read superseded");
            let _ = previous.done.send(ReadOutcome::Cancelled);
        }

        let outcome = loop {
            match outcomes.recv_timeout(self.inner.poll) {
                Ok(outcome) => break outcome,
                Err(RecvTimeoutError::Timeout) => {
                    if interrupt.is_set() {
                        debug!(target: "step_debugger::terminal", id, "read interrupted");
                        break ReadOutcome::KeyboardInterrupt;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break ReadOutcome::Cancelled,
            }
        };

        let (finished, idle) = {
            let mut slot = self.inner.slot();
            let finished = if slot.as_ref().is_some_and(|p| p.id == id) {
                slot.take()
            } else {
                None
            };
            (finished, slot.is_none())
        };
        drop(finished);
        if idle {
            self.inner.terminal.set_cursor_visible(false);
        }
        outcome
    }

    /// Resolve the pending read, if any, as cancelled.
    pub fn cancel_pending(&self) -> bool {
        let pending = self.inner.slot().take();
        match pending {
            Some(read) => {
                let _ = read.done.send(ReadOutcome::Cancelled);
                true
            }
            None => false,
        }
    }
}
