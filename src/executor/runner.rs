use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::Config;
use crate::debugger::{
    InterruptCell, PauseEvent, ResumeDecision, RunConfig, RunMode, RunOutcome, SessionController,
    SessionEvent, SIGINT,
};
use crate::error::Result;
use crate::terminal::{KeyHub, StdioTerminal};

const POLL: Duration = Duration::from_millis(20);

/// What the pause prompt decided.
enum Prompt {
    Resume(ResumeDecision),
    Quit,
}

/// Run `path` with guest output on stdout and the pause prompt on stderr.
pub fn run_file(config: &Config, path: &Path, mode: RunMode) -> Result<RunOutcome> {
    let source = std::fs::read_to_string(path)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(&config.unit_name)
        .to_string();

    let terminal = Arc::new(StdioTerminal::new());
    let keys = terminal.keys().clone();
    let mut session = SessionController::new(terminal, config.session_settings());
    forward_ctrl_c(session.interrupt_cell())?;

    let (tx, lines) = mpsc::channel();
    thread::Builder::new()
        .name("stdin-lines".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    drive(
        &mut session,
        &keys,
        RunConfig::new(source, name, mode),
        &lines,
        &mut io::stderr(),
    )
}

/// Route Ctrl-C to `interrupt` so the running guest ends as cancelled
/// instead of the process being killed.
pub fn forward_ctrl_c(interrupt: InterruptCell) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    info!(target: "step_debugger::session", "Ctrl-C received");
                    interrupt.signal_with(SIGINT);
                }
            })
        })?;
    Ok(())
}

/// Drive one run. Lines from `input` answer pause prompts; while the guest
/// is running they are typed into the terminal instead.
pub fn drive<W: Write>(
    session: &mut SessionController,
    keys: &KeyHub,
    config: RunConfig,
    input: &Receiver<String>,
    out: &mut W,
) -> Result<RunOutcome> {
    session.start(config)?;
    let mut input_closed = false;

    loop {
        match session.poll_event(POLL)? {
            Some(SessionEvent::Paused(pause)) => {
                show_pause(session, &pause, out)?;
                let interrupt = session.interrupt_cell();
                match prompt(&pause, input, out, &mut input_closed, &interrupt)? {
                    Prompt::Resume(decision) => session.resume(decision)?,
                    Prompt::Quit => session.interrupt(),
                }
            }
            Some(SessionEvent::Terminated(outcome)) => {
                show_outcome(&outcome, out)?;
                return Ok(outcome);
            }
            None => {
                // lines typed before the guest asks for input wait in the queue
                if !session.bridge().is_pending() {
                    continue;
                }
                if input_closed {
                    keys.feed("\x04");
                    continue;
                }
                match input.try_recv() {
                    Ok(line) => {
                        keys.feed(&line);
                        keys.feed("\r");
                    }
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => input_closed = true,
                }
            }
        }
    }
}

fn show_pause<W: Write>(session: &SessionController, pause: &PauseEvent, out: &mut W) -> io::Result<()> {
    let h = pause.highlight;
    writeln!(
        out,
        "\n🔍 [{}] {}:{}:{}-{}:{}",
        pause.seq,
        pause.frame.filename(),
        h.start_line,
        h.start_column.unwrap_or(1),
        h.end_line,
        h.end_column.unwrap_or(1)
    )?;
    if let Some(line) = session
        .files()
        .get(pause.frame.filename())
        .and_then(|text| text.lines().nth(h.start_line.saturating_sub(1) as usize))
    {
        writeln!(out, "    {}", line)?;
    }
    if !pause.loaded_value.is_no_value() {
        writeln!(out, "    loaded: {}", pause.loaded_value)?;
    }
    Ok(())
}

fn prompt<W: Write>(
    pause: &PauseEvent,
    input: &Receiver<String>,
    out: &mut W,
    input_closed: &mut bool,
    interrupt: &InterruptCell,
) -> io::Result<Prompt> {
    loop {
        write!(out, "> ")?;
        out.flush()?;

        if *input_closed {
            return Ok(Prompt::Quit);
        }
        let line = loop {
            match input.recv_timeout(POLL) {
                Ok(line) => break line,
                Err(RecvTimeoutError::Timeout) => {
                    if interrupt.is_set() {
                        writeln!(out)?;
                        return Ok(Prompt::Quit);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    *input_closed = true;
                    writeln!(out)?;
                    return Ok(Prompt::Quit);
                }
            }
        };

        let words = shlex::split(&line).unwrap_or_default();
        let command = words.first().map(String::as_str).unwrap_or("");
        debug!(target: "step_debugger::session", command, "console command");

        if let Some(decision) = ResumeDecision::from_command(command) {
            return Ok(Prompt::Resume(decision));
        }
        match command {
            "q" | "quit" => return Ok(Prompt::Quit),
            "p" | "print" => match words.get(1) {
                Some(name) => match pause.frame.lookup(name) {
                    Ok(Some(value)) => writeln!(out, "{} = {}", name, value.repr())?,
                    Ok(None) => writeln!(out, "❌ name '{}' is not defined", name)?,
                    Err(err) => writeln!(out, "❌ {}", err)?,
                },
                None => writeln!(out, "usage: p NAME")?,
            },
            "locals" | "globals" => {
                let bindings = if command == "locals" {
                    pause.frame.locals()
                } else {
                    pause.frame.globals()
                };
                match bindings {
                    Ok(bindings) if bindings.is_empty() => writeln!(out, "    <empty>")?,
                    Ok(bindings) => {
                        for (name, value) in bindings {
                            writeln!(out, "    {} = {}", name, value.repr())?;
                        }
                    }
                    Err(err) => writeln!(out, "❌ {}", err)?,
                }
            }
            "where" | "bt" => match pause.frame.stack() {
                Ok(stack) => {
                    for (i, entry) in stack.iter().enumerate() {
                        writeln!(out, "  #{}: {} ({}:{})", i, entry.function, entry.filename, entry.line)?;
                    }
                }
                Err(err) => writeln!(out, "❌ {}", err)?,
            },
            "h" | "help" => {
                writeln!(
                    out,
                    "Commands: (n)ext/(s)tep, (c)ontinue, p NAME, locals, globals, where, (q)uit"
                )?;
            }
            other => writeln!(out, "❓ Unknown command: {}", other)?,
        }
    }
}

fn show_outcome<W: Write>(outcome: &RunOutcome, out: &mut W) -> io::Result<()> {
    match outcome {
        RunOutcome::Completed => writeln!(out, "\n✅ Program finished"),
        RunOutcome::Cancelled => writeln!(out, "\n⏹  Program stopped"),
        RunOutcome::Failed { error } => writeln!(out, "\n❌ {}", error.summary),
        RunOutcome::Fault { reason } => writeln!(out, "\n💥 Debugger fault: {}", reason),
    }
}
