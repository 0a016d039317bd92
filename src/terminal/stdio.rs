use std::io::{self, Write};

use super::channel::KeyHub;
use super::{KeyHandler, Subscription, Terminal};

const SHOW_CURSOR: &str = "\x1b[?25h";
const HIDE_CURSOR: &str = "\x1b[?25l";

/// Terminal backed by the process stdout. Key input is pushed in through
/// [`StdioTerminal::keys`] by whoever owns stdin.
#[derive(Default)]
pub struct StdioTerminal {
    keys: KeyHub,
}

impl StdioTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> &KeyHub {
        &self.keys
    }
}

impl Terminal for StdioTerminal {
    fn write(&self, text: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn on_key_event(&self, handler: KeyHandler) -> Subscription {
        self.keys.subscribe(handler)
    }

    fn set_cursor_visible(&self, visible: bool) {
        self.write(if visible { SHOW_CURSOR } else { HIDE_CURSOR });
    }
}
