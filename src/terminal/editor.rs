use super::keys::KeyEvent;

/// What a key did to the line being edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Pending,
    Line(String),
    KeyboardInterrupt,
    EndOfInput,
}

/// Line-editing state for one pending read.
///
/// The cursor is kept as a distance from the end of the buffer, so the
/// redrawn tail after an edit is always `buffer[len - cursor_from_end..]`.
#[derive(Debug, Clone, Default)]
pub struct LineEditor {
    buffer: Vec<char>,
    cursor_from_end: usize,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> String {
        self.buffer.iter().collect()
    }

    /// Cursor position counted from the start of the buffer.
    pub fn cursor(&self) -> usize {
        self.buffer.len() - self.cursor_from_end
    }

    pub fn cursor_from_end(&self) -> usize {
        self.cursor_from_end
    }

    fn tail(&self) -> String {
        self.buffer[self.cursor()..].iter().collect()
    }

    /// Apply `key`, appending the terminal echo for it to `echo`.
    pub fn apply(&mut self, key: &KeyEvent, echo: &mut String) -> EditOutcome {
        match key {
            KeyEvent::Enter => {
                echo.push_str("\r\n");
                let line = self.buffer();
                self.reset();
                return EditOutcome::Line(line);
            }
            KeyEvent::CtrlC => {
                echo.push_str("^C\r\n");
                self.reset();
                return EditOutcome::KeyboardInterrupt;
            }
            KeyEvent::CtrlD => {
                echo.push_str("\r\n");
                self.reset();
                return EditOutcome::EndOfInput;
            }
            KeyEvent::Backspace => {
                let at = self.cursor();
                if at > 0 {
                    self.buffer.remove(at - 1);
                    let tail = self.tail();
                    echo.push('\u{8}');
                    echo.push_str(&tail);
                    echo.push(' ');
                    echo.push_str(&cursor_left(tail.chars().count() + 1));
                }
            }
            KeyEvent::Delete => {
                if self.cursor_from_end > 0 {
                    let at = self.cursor();
                    self.buffer.remove(at);
                    self.cursor_from_end -= 1;
                    let tail = self.tail();
                    echo.push_str(&tail);
                    echo.push(' ');
                    echo.push_str(&cursor_left(tail.chars().count() + 1));
                }
            }
            KeyEvent::Left => {
                if self.cursor() > 0 {
                    self.cursor_from_end += 1;
                    echo.push_str("\x1b[D");
                }
            }
            KeyEvent::Right => {
                if self.cursor_from_end > 0 {
                    self.cursor_from_end -= 1;
                    echo.push_str("\x1b[C");
                }
            }
            KeyEvent::Home => {
                let moved = self.cursor();
                if moved > 0 {
                    echo.push_str(&cursor_left(moved));
                    self.cursor_from_end = self.buffer.len();
                }
            }
            KeyEvent::End => {
                let moved = self.cursor_from_end;
                if moved > 0 {
                    echo.push_str(&format!("\x1b[{}C", moved));
                    self.cursor_from_end = 0;
                }
            }
            KeyEvent::Char(c) if *c >= ' ' && *c != '\x7f' => {
                let at = self.cursor();
                self.buffer.insert(at, *c);
                let tail = self.tail();
                echo.push(*c);
                echo.push_str(&tail);
                if !tail.is_empty() {
                    echo.push_str(&cursor_left(tail.chars().count()));
                }
            }
            KeyEvent::Char(_) | KeyEvent::Control(_) | KeyEvent::Unknown(_) => {}
        }
        EditOutcome::Pending
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.cursor_from_end = 0;
    }
}

fn cursor_left(n: usize) -> String {
    format!("\x1b[{}D", n)
}
