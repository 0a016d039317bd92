//! Terminal I/O bridge: raw key input in, edited lines out.

mod bridge;
mod channel;
mod editor;
mod keys;
mod stdio;

use std::sync::Arc;

pub use bridge::TerminalBridge;
pub use channel::{ChannelTerminal, KeyHub, TerminalOutput};
pub use editor::{EditOutcome, LineEditor};
pub use keys::{decode_keys, KeyEvent};
pub use stdio::StdioTerminal;

pub type KeyHandler = Arc<dyn Fn(KeyEvent) + Send + Sync>;

/// The physical terminal the bridge drives.
pub trait Terminal: Send + Sync {
    fn write(&self, text: &str);
    /// Register `handler` for key input until the subscription is dropped.
    fn on_key_event(&self, handler: KeyHandler) -> Subscription;
    fn set_cursor_visible(&self, visible: bool);
}

/// Unsubscribes when dropped.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to undo.
    pub fn empty() -> Self {
        Self { cancel: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Result of one `read_line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// Superseded by a newer read or cancelled by the controller.
    Cancelled,
    KeyboardInterrupt,
    EndOfInput,
}
