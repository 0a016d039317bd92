use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use step_debugger::debugger::{
    ErrorKind, HighlightRange, LoadedValue, PauseEvent, ResumeDecision, RunConfig, RunOutcome,
    SessionController, SessionEvent, SessionSettings, SessionState,
};
use step_debugger::runtime::Value;
use step_debugger::terminal::{ChannelTerminal, TerminalOutput};

// Helper to build a controller over an in-memory terminal
fn controller() -> (SessionController, Arc<ChannelTerminal>, Receiver<TerminalOutput>) {
    let (terminal, output) = ChannelTerminal::new();
    let terminal = Arc::new(terminal);
    let settings = SessionSettings {
        gate_poll: Duration::from_millis(5),
        read_poll: Duration::from_millis(5),
        ..SessionSettings::default()
    };
    (SessionController::new(terminal.clone(), settings), terminal, output)
}

// Helper to collect everything written to the terminal so far
fn written(output: &Receiver<TerminalOutput>) -> String {
    output
        .try_iter()
        .filter_map(|o| match o {
            TerminalOutput::Text(text) => Some(text),
            TerminalOutput::CursorVisible(_) => None,
        })
        .collect()
}

fn step_all(session: &mut SessionController, source: &str) -> (Vec<PauseEvent>, RunOutcome) {
    let mut pauses = Vec::new();
    let outcome = session
        .run(RunConfig::debug(source, "main.py"), |pause| {
            pauses.push(pause.clone());
            ResumeDecision::ContinueStepping
        })
        .unwrap();
    (pauses, outcome)
}

#[cfg(test)]
mod session_tests {
    use super::*;

    #[test]
    fn test_two_statements_give_two_pauses() {
        let (mut session, _terminal, output) = controller();
        let (pauses, outcome) = step_all(&mut session, "x = 1\nprint(x)");

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(pauses.len(), 2);
        assert_eq!(pauses[0].highlight.start_line, 1);
        assert_eq!(pauses[1].highlight.start_line, 2);
        assert_eq!(pauses[0].loaded_value, LoadedValue::Value(Value::Int(1)));
        assert_eq!(written(&output), "1\r\n");
    }

    #[test]
    fn test_pauses_arrive_in_program_order() {
        let (mut session, _terminal, _output) = controller();
        let source = "def f(a):\n    b = a + 1\n    return b\nx = f(1)\ny = f(x)\n";
        let (pauses, outcome) = step_all(&mut session, source);

        assert_eq!(outcome, RunOutcome::Completed);
        let seqs: Vec<u64> = pauses.iter().map(|p| p.seq).collect();
        let expected: Vec<u64> = (1..=pauses.len() as u64).collect();
        assert_eq!(seqs, expected);
        // the body of f is visited once per call
        let body_pauses = pauses.iter().filter(|p| p.highlight.start_line == 2).count();
        assert!(body_pauses >= 2, "expected f's body twice, got {}", body_pauses);
    }

    #[test]
    fn test_runtime_error_is_highlighted() {
        let (mut session, _terminal, output) = controller();
        let outcome = session
            .run(RunConfig::normal("x = 1\nz = 2\ny = x / 0\n", "main.py"), |_| {
                ResumeDecision::ContinueStepping
            })
            .unwrap();

        let error = outcome.error().expect("run should fail");
        assert_eq!(error.kind, ErrorKind::Runtime);
        assert_eq!(error.name, "ZeroDivisionError");
        assert_eq!(error.highlight, HighlightRange::new(3, 5, 3, 10));
        assert_eq!(outcome.exit_code(), 1);

        let text = written(&output);
        assert!(text.starts_with("\x1b[31m"));
        assert!(text.contains("ZeroDivisionError: division by zero\r\n"));
    }

    #[test]
    fn test_huge_string_repeat_fails_in_guest() {
        let (mut session, _terminal, output) = controller();
        let outcome = session
            .run(RunConfig::normal("x = 'ab' * 9223372036854775807\n", "main.py"), |_| {
                ResumeDecision::ContinueStepping
            })
            .unwrap();

        let error = outcome.error().expect("run should fail");
        assert_eq!(error.name, "OverflowError");
        assert_eq!(error.summary, "OverflowError: repeated string is too long");
        assert_eq!(error.highlight, HighlightRange::new(1, 5, 1, 31));
        assert!(written(&output).contains("OverflowError"));
    }

    #[test]
    fn test_compile_error_has_position() {
        let (mut session, _terminal, _output) = controller();
        let outcome = session
            .run(RunConfig::debug("x = = 2\n", "main.py"), |_| ResumeDecision::ContinueStepping)
            .unwrap();
        let error = outcome.error().expect("compile should fail");
        assert_eq!(error.kind, ErrorKind::Compile);
        assert_eq!(error.highlight, HighlightRange::new(1, 5, 1, 6));
    }

    #[test]
    fn test_stop_debugging_runs_to_completion() {
        let (mut session, _terminal, output) = controller();
        let mut seen = 0;
        let outcome = session
            .run(RunConfig::debug("a = 1\nb = 2\nprint(a + b)\n", "main.py"), |_| {
                seen += 1;
                ResumeDecision::StopDebugging
            })
            .unwrap();
        assert_eq!(seen, 1);
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(written(&output), "3\r\n");
    }

    #[test]
    fn test_interrupt_while_paused_cancels() {
        let (mut session, _terminal, _output) = controller();
        session.start(RunConfig::debug("x = 1\ny = 2\n", "main.py")).unwrap();

        let first = session.wait_event().unwrap();
        assert!(matches!(first, SessionEvent::Paused(_)));
        session.interrupt();

        // no further pause is delivered after the signal
        let next = session.wait_event().unwrap();
        match next {
            SessionEvent::Terminated(outcome) => assert_eq!(outcome, RunOutcome::Cancelled),
            SessionEvent::Paused(pause) => panic!("unexpected pause #{}", pause.seq),
        }
        assert!(matches!(session.state(), SessionState::Terminated(RunOutcome::Cancelled)));
    }

    #[test]
    fn test_interrupt_before_next_instruction() {
        let (mut session, _terminal, _output) = controller();
        session.start(RunConfig::debug("x = 1\ny = 2\nz = 3\n", "main.py")).unwrap();
        assert!(matches!(session.wait_event().unwrap(), SessionEvent::Paused(_)));

        session.interrupt();
        session.resume(ResumeDecision::ContinueStepping).unwrap();
        let next = session.wait_event().unwrap();
        assert!(matches!(next, SessionEvent::Terminated(RunOutcome::Cancelled)));
    }

    #[test]
    fn test_interrupt_stops_untraced_loop() {
        let (mut session, _terminal, _output) = controller();
        session.start(RunConfig::normal("while True:\n    pass\n", "main.py")).unwrap();
        thread::sleep(Duration::from_millis(20));
        session.interrupt();
        let event = session.wait_event().unwrap();
        assert!(matches!(event, SessionEvent::Terminated(RunOutcome::Cancelled)));
    }

    #[test]
    fn test_input_reads_from_terminal() {
        let (mut session, terminal, output) = controller();
        session
            .start(RunConfig::normal("name = input('who? ')\nprint('hi ' + name)\n", "main.py"))
            .unwrap();
        while !session.bridge().is_pending() {
            thread::sleep(Duration::from_millis(1));
        }
        terminal.feed("bob\r");

        let event = session.wait_event().unwrap();
        assert!(matches!(event, SessionEvent::Terminated(RunOutcome::Completed)));
        assert_eq!(written(&output), "who? bob\r\nhi bob\r\n");
    }

    #[test]
    fn test_interrupt_during_input_cancels() {
        let (mut session, _terminal, _output) = controller();
        session.start(RunConfig::normal("input()\n", "main.py")).unwrap();
        while !session.bridge().is_pending() {
            thread::sleep(Duration::from_millis(1));
        }
        session.interrupt();
        let event = session.wait_event().unwrap();
        assert!(matches!(event, SessionEvent::Terminated(RunOutcome::Cancelled)));
    }

    #[test]
    fn test_ctrl_d_raises_eof_error() {
        let (mut session, terminal, _output) = controller();
        session.start(RunConfig::normal("input()\n", "main.py")).unwrap();
        while !session.bridge().is_pending() {
            thread::sleep(Duration::from_millis(1));
        }
        terminal.feed("\x04");
        let SessionEvent::Terminated(outcome) = session.wait_event().unwrap() else {
            panic!("expected termination");
        };
        assert_eq!(outcome.error().map(|e| e.name.as_str()), Some("EOFError"));
    }

    #[test]
    fn test_session_can_run_again() {
        let (mut session, _terminal, _output) = controller();
        session.start(RunConfig::debug("x = 1\n", "main.py")).unwrap();
        assert!(matches!(session.wait_event().unwrap(), SessionEvent::Paused(_)));
        session.interrupt();
        assert!(matches!(
            session.wait_event().unwrap(),
            SessionEvent::Terminated(RunOutcome::Cancelled)
        ));

        // the interrupt cell is cleared by the next start
        let (pauses, outcome) = step_all(&mut session, "x = 1\n");
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(pauses.len(), 1);
    }

    #[test]
    fn test_snapshot_reads_bindings_while_paused() {
        let (mut session, _terminal, _output) = controller();
        let mut looked_up = Vec::new();
        session
            .run(RunConfig::debug("x = 41\ny = x + 1\n", "main.py"), |pause| {
                looked_up.push(pause.frame.lookup("x").unwrap());
                ResumeDecision::ContinueStepping
            })
            .unwrap();
        assert_eq!(looked_up.first(), Some(&None));
        assert_eq!(looked_up.last(), Some(&Some(Value::Int(41))));
    }
}
