use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::trace;

use super::keys::{decode_keys, KeyEvent};
use super::{KeyHandler, Subscription, Terminal};

#[derive(Default)]
struct Handlers {
    next_id: u64,
    entries: Vec<(u64, KeyHandler)>,
}

/// Fan-out of key events to subscribed handlers.
#[derive(Clone, Default)]
pub struct KeyHub {
    handlers: Arc<Mutex<Handlers>>,
}

impl KeyHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: KeyHandler) -> Subscription {
        let id = {
            let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
            handlers.next_id += 1;
            let id = handlers.next_id;
            handlers.entries.push((id, handler));
            id
        };
        let weak: Weak<Mutex<Handlers>> = Arc::downgrade(&self.handlers);
        Subscription::new(move || {
            if let Some(handlers) = weak.upgrade() {
                let mut handlers = handlers.lock().unwrap_or_else(PoisonError::into_inner);
                handlers.entries.retain(|(entry, _)| *entry != id);
            }
        })
    }

    pub fn subscribers(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Deliver `key` to every handler. Handlers run outside the lock and may
    /// unsubscribe themselves.
    pub fn dispatch(&self, key: KeyEvent) {
        let handlers: Vec<KeyHandler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        trace!(target: "step_debugger::terminal", ?key, handlers = handlers.len(), "key");
        for handler in handlers {
            handler(key.clone());
        }
    }

    /// Decode raw terminal data and dispatch each key.
    pub fn feed(&self, data: &str) {
        for key in decode_keys(data) {
            self.dispatch(key);
        }
    }
}

/// What a [`ChannelTerminal`] was asked to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutput {
    Text(String),
    CursorVisible(bool),
}

/// Terminal whose output goes to a channel and whose keys come from a
/// [`KeyHub`]. Used by the DAP server and by tests.
pub struct ChannelTerminal {
    output: Sender<TerminalOutput>,
    keys: KeyHub,
}

impl ChannelTerminal {
    pub fn new() -> (Self, Receiver<TerminalOutput>) {
        let (output, rx) = mpsc::channel();
        (
            Self {
                output,
                keys: KeyHub::new(),
            },
            rx,
        )
    }

    pub fn keys(&self) -> &KeyHub {
        &self.keys
    }

    pub fn feed(&self, data: &str) {
        self.keys.feed(data);
    }
}

impl Terminal for ChannelTerminal {
    fn write(&self, text: &str) {
        let _ = self.output.send(TerminalOutput::Text(text.to_string()));
    }

    fn on_key_event(&self, handler: KeyHandler) -> Subscription {
        self.keys.subscribe(handler)
    }

    fn set_cursor_visible(&self, visible: bool) {
        let _ = self.output.send(TerminalOutput::CursorVisible(visible));
    }
}
