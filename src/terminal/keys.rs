/// One unit of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    Char(char),
    Enter,
    Backspace,
    Delete,
    Left,
    Right,
    Home,
    End,
    CtrlC,
    CtrlD,
    /// Any other control character.
    Control(char),
    /// An escape sequence with no editing meaning.
    Unknown(String),
}

/// Split raw terminal data into key events.
///
/// `\r\n` counts as a single Enter. `\x7f` is Backspace, as most terminals
/// send it for that key.
pub fn decode_keys(data: &str) -> Vec<KeyEvent> {
    let chars: Vec<char> = data.chars().collect();
    let mut keys = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        let key = match c {
            '\r' => {
                if chars.get(i) == Some(&'\n') {
                    i += 1;
                }
                KeyEvent::Enter
            }
            '\n' => KeyEvent::Enter,
            '\x7f' | '\x08' => KeyEvent::Backspace,
            '\x03' => KeyEvent::CtrlC,
            '\x04' => KeyEvent::CtrlD,
            '\x1b' => match chars.get(i) {
                Some('[') => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && !('@'..='~').contains(&chars[end]) {
                        end += 1;
                    }
                    let body: String = chars[start..(end + 1).min(chars.len())].iter().collect();
                    i = (end + 1).min(chars.len());
                    csi_key(&body)
                }
                Some('O') => match chars.get(i + 1) {
                    Some(&final_byte) => {
                        i += 2;
                        match final_byte {
                            'H' => KeyEvent::Home,
                            'F' => KeyEvent::End,
                            'D' => KeyEvent::Left,
                            'C' => KeyEvent::Right,
                            other => KeyEvent::Unknown(format!("\x1bO{}", other)),
                        }
                    }
                    None => {
                        i += 1;
                        KeyEvent::Unknown("\x1bO".to_string())
                    }
                },
                _ => KeyEvent::Control('\x1b'),
            },
            c if c < ' ' => KeyEvent::Control(c),
            c => KeyEvent::Char(c),
        };
        keys.push(key);
    }

    keys
}

fn csi_key(body: &str) -> KeyEvent {
    match body {
        "D" => KeyEvent::Left,
        "C" => KeyEvent::Right,
        "H" | "1~" => KeyEvent::Home,
        "F" | "4~" => KeyEvent::End,
        "3~" => KeyEvent::Delete,
        other => KeyEvent::Unknown(format!("\x1b[{}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printable_and_enter() {
        assert_eq!(
            decode_keys("ab\r\n"),
            vec![KeyEvent::Char('a'), KeyEvent::Char('b'), KeyEvent::Enter]
        );
        assert_eq!(decode_keys("\r\r"), vec![KeyEvent::Enter, KeyEvent::Enter]);
    }

    #[test]
    fn test_escape_sequences() {
        assert_eq!(
            decode_keys("\x1b[D\x1b[C\x1b[H\x1bOF\x1b[3~\x1b[4~"),
            vec![
                KeyEvent::Left,
                KeyEvent::Right,
                KeyEvent::Home,
                KeyEvent::End,
                KeyEvent::Delete,
                KeyEvent::End,
            ]
        );
        assert_eq!(decode_keys("\x1b[A"), vec![KeyEvent::Unknown("\x1b[A".to_string())]);
    }

    #[test]
    fn test_control_keys() {
        assert_eq!(
            decode_keys("\x03\x04\x7f\x01"),
            vec![
                KeyEvent::CtrlC,
                KeyEvent::CtrlD,
                KeyEvent::Backspace,
                KeyEvent::Control('\x01'),
            ]
        );
        assert_eq!(decode_keys("\x1b"), vec![KeyEvent::Control('\x1b')]);
    }

    #[test]
    fn test_truncated_sequence_does_not_panic() {
        assert_eq!(decode_keys("\x1b[3"), vec![KeyEvent::Unknown("\x1b[3".to_string())]);
    }
}
