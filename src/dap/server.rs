use std::io::{self, Write};
use std::path::Path;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{debug, info, trace, warn};

use super::protocol::{write_message, DapMessage, DapMessageContent};
use crate::config::Config;
use crate::debugger::{
    PauseEvent, ResumeDecision, RunConfig, RunMode, RunOutcome, SessionController, SessionEvent,
};
use crate::terminal::{ChannelTerminal, TerminalOutput};

const THREAD_ID: u64 = 1;
const LOCALS_REF: u64 = 1;
const GLOBALS_REF: u64 = 2;
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);
const DRAIN_POLL: Duration = Duration::from_millis(5);

/// Debug adapter: answers controller requests and forwards session events.
pub struct DapServer<W: Write> {
    writer: W,
    seq: u64,
    config: Config,
    session: Option<SessionController>,
    terminal: Option<Arc<ChannelTerminal>>,
    output: Option<Receiver<TerminalOutput>>,
    program_path: Option<String>,
}

impl<W: Write> DapServer<W> {
    pub fn new(writer: W, config: Config) -> Self {
        Self {
            writer,
            seq: 0,
            config,
            session: None,
            terminal: None,
            output: None,
            program_path: None,
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn session(&self) -> Option<&SessionController> {
        self.session.as_ref()
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub fn send_response(
        &mut self,
        request_seq: u64,
        command: String,
        success: bool,
        body: Option<Value>,
    ) -> io::Result<()> {
        let msg = DapMessage {
            seq: self.next_seq(),
            msg_type: "response".to_string(),
            content: DapMessageContent::Response {
                request_seq,
                success,
                command,
                message: None,
                body,
            },
        };
        self.send_message(&msg)
    }

    pub fn send_error(&mut self, request_seq: u64, command: String, message: String) -> io::Result<()> {
        warn!(target: "step_debugger::dap", %command, %message, "request failed");
        let msg = DapMessage {
            seq: self.next_seq(),
            msg_type: "response".to_string(),
            content: DapMessageContent::Response {
                request_seq,
                success: false,
                command,
                message: Some(message),
                body: None,
            },
        };
        self.send_message(&msg)
    }

    pub fn send_event(&mut self, event: &str, body: Option<Value>) -> io::Result<()> {
        let msg = DapMessage {
            seq: self.next_seq(),
            msg_type: "event".to_string(),
            content: DapMessageContent::Event {
                event: event.to_string(),
                body,
            },
        };
        self.send_message(&msg)
    }

    fn send_message(&mut self, msg: &DapMessage) -> io::Result<()> {
        write_message(&mut self.writer, msg)?;
        trace!(target: "step_debugger::dap", seq = msg.seq, "sent");
        Ok(())
    }

    /// Dispatch one incoming message. Returns `false` once the client has
    /// disconnected.
    pub fn handle(&mut self, msg: DapMessage) -> io::Result<bool> {
        let DapMessageContent::Request { command, arguments } = msg.content else {
            debug!(target: "step_debugger::dap", seq = msg.seq, "ignoring non-request message");
            return Ok(true);
        };
        debug!(target: "step_debugger::dap", seq = msg.seq, %command, "request");

        match command.as_str() {
            "initialize" => self.handle_initialize(msg.seq, command)?,
            "launch" => self.handle_launch(msg.seq, command, arguments)?,
            "configurationDone" => self.send_response(msg.seq, command, true, None)?,
            "threads" => self.handle_threads(msg.seq, command)?,
            "stackTrace" => self.handle_stack_trace(msg.seq, command)?,
            "scopes" => self.handle_scopes(msg.seq, command)?,
            "variables" => self.handle_variables(msg.seq, command, arguments)?,
            "next" | "stepIn" => self.handle_resume(msg.seq, command, ResumeDecision::ContinueStepping)?,
            "continue" => self.handle_resume(msg.seq, command, ResumeDecision::StopDebugging)?,
            "terminate" | "pause" => self.handle_terminate(msg.seq, command)?,
            "terminalInput" => self.handle_terminal_input(msg.seq, command, arguments)?,
            "disconnect" => {
                self.handle_disconnect(msg.seq, command)?;
                return Ok(false);
            }
            _ => {
                warn!(target: "step_debugger::dap", %command, "unhandled command");
                self.send_error(msg.seq, command.clone(), format!("unsupported request '{}'", command))?;
            }
        }
        Ok(true)
    }

    /// Forward pending terminal output and session events to the client.
    pub fn pump(&mut self) -> io::Result<()> {
        self.flush_output()?;
        loop {
            let Some(session) = self.session.as_mut() else {
                return Ok(());
            };
            let event = match session.poll_event(Duration::ZERO) {
                Ok(Some(event)) => event,
                Ok(None) | Err(_) => return Ok(()),
            };
            match event {
                SessionEvent::Paused(pause) => self.send_stopped(&pause)?,
                SessionEvent::Terminated(outcome) => {
                    self.flush_output()?;
                    self.send_terminated(&outcome)?;
                }
            }
        }
    }

    fn flush_output(&mut self) -> io::Result<()> {
        loop {
            let Some(output) = self.output.as_ref() else {
                return Ok(());
            };
            match output.try_recv() {
                Ok(TerminalOutput::Text(text)) => {
                    self.send_event("output", Some(json!({"category": "stdout", "output": text})))?;
                }
                Ok(TerminalOutput::CursorVisible(visible)) => {
                    trace!(target: "step_debugger::dap", visible, "cursor visibility");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
    }

    fn send_stopped(&mut self, pause: &PauseEvent) -> io::Result<()> {
        self.send_event(
            "stopped",
            Some(json!({
                "reason": "step",
                "threadId": THREAD_ID,
                "allThreadsStopped": true,
                "pause": pause.seq,
                "highlight": pause.highlight,
                "loadedValue": pause.loaded_value,
            })),
        )
    }

    fn send_terminated(&mut self, outcome: &RunOutcome) -> io::Result<()> {
        let body = serde_json::to_value(outcome)?;
        self.send_event("terminated", Some(body))?;
        self.send_event("exited", Some(json!({"exitCode": outcome.exit_code()})))
    }

    pub fn handle_initialize(&mut self, seq: u64, command: String) -> io::Result<()> {
        let body = json!({
            "supportsConfigurationDoneRequest": true,
            "supportsTerminateRequest": true,
            "supportsStepBack": false,
            "supportsFunctionBreakpoints": false,
            "supportsConditionalBreakpoints": false,
            "supportsSetVariable": false,
        });
        self.send_response(seq, command, true, Some(body))?;
        self.send_event("initialized", None)
    }

    pub fn handle_launch(&mut self, seq: u64, command: String, args: Option<Value>) -> io::Result<()> {
        let args = args.unwrap_or(Value::Null);
        let no_debug = args.get("noDebug").and_then(Value::as_bool).unwrap_or(false);
        let program = args.get("program").and_then(Value::as_str);

        let (source, name) = match (program, args.get("source").and_then(Value::as_str)) {
            (_, Some(source)) => {
                let name = args
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(&self.config.unit_name)
                    .to_string();
                (source.to_string(), name)
            }
            (Some(program), None) => match std::fs::read_to_string(program) {
                Ok(source) => {
                    let name = Path::new(program)
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or(&self.config.unit_name)
                        .to_string();
                    self.program_path = Some(program.to_string());
                    (source, name)
                }
                Err(err) => return self.send_error(seq, command, format!("cannot read {}: {}", program, err)),
            },
            (None, None) => {
                return self.send_error(seq, command, "launch needs 'program' or 'source'".to_string())
            }
        };

        if self.session.as_ref().is_some_and(|s| s.state().is_active()) {
            return self.send_error(seq, command, "a run is already active".to_string());
        }

        let (terminal, output) = ChannelTerminal::new();
        let terminal = Arc::new(terminal);
        let mut session = SessionController::new(terminal.clone(), self.config.session_settings());
        let mode = if no_debug { RunMode::Normal } else { RunMode::Debug };

        info!(target: "step_debugger::dap", unit = %name, ?mode, "launching");
        if let Err(err) = session.start(RunConfig::new(source, name, mode)) {
            return self.send_error(seq, command, err.to_string());
        }
        self.session = Some(session);
        self.terminal = Some(terminal);
        self.output = Some(output);
        self.send_response(seq, command, true, None)
    }

    pub fn handle_threads(&mut self, seq: u64, command: String) -> io::Result<()> {
        self.send_response(
            seq,
            command,
            true,
            Some(json!({
                "threads": [
                    {
                        "id": THREAD_ID,
                        "name": "main"
                    }
                ]
            })),
        )
    }

    fn current_pause(&self) -> Option<&PauseEvent> {
        self.session.as_ref().and_then(|s| s.state().pause())
    }

    pub fn handle_stack_trace(&mut self, seq: u64, command: String) -> io::Result<()> {
        let Some(pause) = self.current_pause() else {
            return self.send_error(seq, command, "not paused".to_string());
        };
        let highlight = pause.highlight;
        let stack = match pause.frame.stack() {
            Ok(stack) => stack,
            Err(err) => return self.send_error(seq, command, err.to_string()),
        };

        let program_path = self.program_path.clone();
        let frames: Vec<Value> = stack
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let path = program_path.clone().unwrap_or_else(|| entry.filename.clone());
                let mut frame = json!({
                    "id": i,
                    "name": entry.function,
                    "line": entry.line,
                    "column": 1,
                    "source": {
                        "name": entry.filename,
                        "path": path
                    }
                });
                if i == 0 {
                    frame["line"] = json!(highlight.start_line);
                    frame["column"] = json!(highlight.start_column.unwrap_or(1));
                    frame["endLine"] = json!(highlight.end_line);
                    frame["endColumn"] = json!(highlight.end_column.unwrap_or(1));
                }
                frame
            })
            .collect();

        let total = frames.len();
        self.send_response(
            seq,
            command,
            true,
            Some(json!({
                "stackFrames": frames,
                "totalFrames": total
            })),
        )
    }

    pub fn handle_scopes(&mut self, seq: u64, command: String) -> io::Result<()> {
        self.send_response(
            seq,
            command,
            true,
            Some(json!({
                "scopes": [
                    {
                        "name": "Locals",
                        "variablesReference": LOCALS_REF,
                        "expensive": false
                    },
                    {
                        "name": "Globals",
                        "variablesReference": GLOBALS_REF,
                        "expensive": false
                    }
                ]
            })),
        )
    }

    pub fn handle_variables(&mut self, seq: u64, command: String, args: Option<Value>) -> io::Result<()> {
        let var_ref = args
            .as_ref()
            .and_then(|v| v.get("variablesReference"))
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let Some(pause) = self.current_pause() else {
            return self.send_error(seq, command, "not paused".to_string());
        };
        let bindings = match var_ref {
            LOCALS_REF => pause.frame.locals(),
            GLOBALS_REF => pause.frame.globals(),
            _ => Ok(Vec::new()),
        };
        let bindings = match bindings {
            Ok(bindings) => bindings,
            Err(err) => return self.send_error(seq, command, err.to_string()),
        };

        let variables: Vec<Value> = bindings
            .iter()
            .map(|(name, value)| {
                json!({
                    "name": name,
                    "value": value.repr(),
                    "type": value.type_name(),
                    "variablesReference": 0
                })
            })
            .collect();

        self.send_response(seq, command, true, Some(json!({ "variables": variables })))
    }

    pub fn handle_resume(&mut self, seq: u64, command: String, decision: ResumeDecision) -> io::Result<()> {
        let result = match self.session.as_mut() {
            Some(session) => session.resume(decision).map_err(|e| e.to_string()),
            None => Err("no run is active".to_string()),
        };
        match result {
            Ok(()) => {
                let body = (decision == ResumeDecision::StopDebugging).then(|| json!({"allThreadsContinued": true}));
                self.send_response(seq, command, true, body)
            }
            Err(message) => self.send_error(seq, command, message),
        }
    }

    pub fn handle_terminate(&mut self, seq: u64, command: String) -> io::Result<()> {
        match self.session.as_ref() {
            Some(session) if session.state().is_active() => {
                session.interrupt();
                self.send_response(seq, command, true, None)
            }
            _ => self.send_error(seq, command, "no run is active".to_string()),
        }
    }

    pub fn handle_terminal_input(&mut self, seq: u64, command: String, args: Option<Value>) -> io::Result<()> {
        let data = args
            .as_ref()
            .and_then(|v| v.get("data"))
            .and_then(Value::as_str)
            .unwrap_or("");
        match self.terminal.as_ref() {
            Some(terminal) => {
                terminal.feed(data);
                self.send_response(seq, command, true, None)
            }
            None => self.send_error(seq, command, "no terminal is attached".to_string()),
        }
    }

    pub fn handle_disconnect(&mut self, seq: u64, command: String) -> io::Result<()> {
        if let Some(session) = self.session.as_ref() {
            if session.state().is_active() {
                session.interrupt();
            }
        }
        self.drain(DISCONNECT_GRACE)?;
        self.send_response(seq, command, true, None)
    }

    /// Pump until the active run has terminated or `grace` has passed.
    fn drain(&mut self, grace: Duration) -> io::Result<()> {
        let deadline = Instant::now() + grace;
        self.pump()?;
        while self.session.as_ref().is_some_and(|s| s.state().is_active()) {
            if Instant::now() >= deadline {
                warn!(target: "step_debugger::dap", "run did not stop before disconnect");
                break;
            }
            thread::sleep(DRAIN_POLL);
            self.pump()?;
        }
        Ok(())
    }
}
