use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use step_debugger::debugger::{InterruptCell, RunConfig, RunOutcome, SessionController, SessionEvent, SessionSettings};
use step_debugger::terminal::{ChannelTerminal, ReadOutcome, TerminalBridge, TerminalOutput};

fn controller() -> (SessionController, Arc<ChannelTerminal>, Receiver<TerminalOutput>) {
    let (terminal, output) = ChannelTerminal::new();
    let terminal = Arc::new(terminal);
    let settings = SessionSettings {
        read_poll: Duration::from_millis(5),
        ..SessionSettings::default()
    };
    (SessionController::new(terminal.clone(), settings), terminal, output)
}

// Start `source`, type `keys` once the guest asks for input, return the outcome
fn run_with_keys(source: &str, keys: &str) -> (RunOutcome, Vec<TerminalOutput>) {
    let (mut session, terminal, output) = controller();
    session.start(RunConfig::normal(source, "main.py")).unwrap();
    while !session.bridge().is_pending() {
        thread::sleep(Duration::from_millis(1));
    }
    terminal.feed(keys);

    let outcome = loop {
        if let SessionEvent::Terminated(outcome) = session.wait_event().unwrap() {
            break outcome;
        }
    };
    (outcome, output.try_iter().collect())
}

fn text(output: &[TerminalOutput]) -> String {
    output
        .iter()
        .filter_map(|o| match o {
            TerminalOutput::Text(text) => Some(text.as_str()),
            TerminalOutput::CursorVisible(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod terminal_tests {
    use super::*;

    #[test]
    fn test_cursor_edit_reaches_guest() {
        let (outcome, output) = run_with_keys("s = input()\nprint(len(s), s)\n", "ab\x1b[Dc\r");

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(text(&output), "ab\x1b[Dcb\x1b[1D\r\n3 acb\r\n");
    }

    #[test]
    fn test_cursor_shown_only_while_reading() {
        let (_, output) = run_with_keys("input()\n", "hi\r");

        let toggles: Vec<bool> = output
            .iter()
            .filter_map(|o| match o {
                TerminalOutput::CursorVisible(visible) => Some(*visible),
                TerminalOutput::Text(_) => None,
            })
            .collect();
        assert_eq!(toggles, vec![true, false]);
    }

    #[test]
    fn test_ctrl_c_discards_partial_line() {
        let (outcome, output) = run_with_keys("s = input()\nprint(s)\n", "x\x03");

        let error = outcome.error().expect("guest should see KeyboardInterrupt");
        assert_eq!(error.name, "KeyboardInterrupt");
        let echoed = text(&output);
        assert!(echoed.starts_with("x^C\r\n"));
        assert!(!echoed.contains("x\r\n"));
    }

    #[test]
    fn test_ctrl_d_is_eof_error() {
        let (outcome, _) = run_with_keys("input('> ')\n", "\x04");
        let error = outcome.error().expect("guest should see EOFError");
        assert_eq!(error.summary, "EOFError: EOF when reading a line");
    }

    #[test]
    fn test_second_read_supersedes_first() {
        let (terminal, _output) = ChannelTerminal::new();
        let terminal = Arc::new(terminal);
        let bridge = TerminalBridge::new(terminal.clone(), Duration::from_millis(5));

        let first = bridge.clone();
        let first = thread::spawn(move || first.read_line(&InterruptCell::new()));
        while !bridge.is_pending() {
            thread::sleep(Duration::from_millis(1));
        }
        terminal.feed("stale");

        let second = bridge.clone();
        let second = thread::spawn(move || second.read_line(&InterruptCell::new()));
        assert_eq!(first.join().unwrap(), ReadOutcome::Cancelled);

        while !bridge.is_pending() {
            thread::sleep(Duration::from_millis(1));
        }
        terminal.feed("fresh\r");
        // the superseded buffer does not leak into the new read
        assert_eq!(second.join().unwrap(), ReadOutcome::Line("fresh".to_string()));
    }
}
