use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::console::BridgeConsole;
use super::event::{PauseEvent, RunOutcome, SessionEvent};
use super::files::{FileNamespace, SourceFiles};
use super::gate::{GateHandle, StepGate};
use super::interrupt::InterruptCell;
use super::report::{paint_error, ErrorReport};
use super::resolver::ValueResolver;
use super::stepping::{ResumeDecision, RunMode};
use super::tracer::DebugTracer;
use crate::error::{Result, SessionError};
use crate::runtime::{compile, Limits, Machine, Unwind};
use crate::terminal::{Terminal, TerminalBridge};

const WORKER_STACK_SIZE: usize = 64 * 1024 * 1024;
const EVENT_POLL: Duration = Duration::from_millis(50);

/// Runtime knobs for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub recursion_limit: usize,
    /// How often a paused interpreter checks the interrupt cell.
    pub gate_poll: Duration,
    /// How often a pending read checks the interrupt cell.
    pub read_poll: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            recursion_limit: 1000,
            gate_poll: Duration::from_millis(20),
            read_poll: Duration::from_millis(20),
        }
    }
}

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub source: String,
    pub unit_name: String,
    pub mode: RunMode,
}

impl RunConfig {
    pub fn new(source: impl Into<String>, unit_name: impl Into<String>, mode: RunMode) -> Self {
        Self {
            source: source.into(),
            unit_name: unit_name.into(),
            mode,
        }
    }

    pub fn normal(source: impl Into<String>, unit_name: impl Into<String>) -> Self {
        Self::new(source, unit_name, RunMode::Normal)
    }

    pub fn debug(source: impl Into<String>, unit_name: impl Into<String>) -> Self {
        Self::new(source, unit_name, RunMode::Debug)
    }
}

#[derive(Debug, Clone)]
pub enum SessionState {
    Idle,
    /// `traced` is false for normal runs and after `StopDebugging`.
    Running { traced: bool },
    Paused(PauseEvent),
    Terminated(RunOutcome),
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Running { .. } | SessionState::Paused(_))
    }

    pub fn pause(&self) -> Option<&PauseEvent> {
        match self {
            SessionState::Paused(event) => Some(event),
            _ => None,
        }
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        match self {
            SessionState::Terminated(outcome) => Some(outcome),
            _ => None,
        }
    }
}

/// Owns one interpreter run at a time and the state transitions around it.
///
/// The interpreter runs on a worker thread; pauses and termination arrive as
/// [`SessionEvent`]s, and resume decisions go back through the gate handle.
pub struct SessionController {
    terminal: Arc<dyn Terminal>,
    bridge: TerminalBridge,
    settings: SessionSettings,
    interrupt: InterruptCell,
    gate: GateHandle,
    files: SourceFiles,
    resolver: ValueResolver,
    state: SessionState,
    events: Option<Receiver<SessionEvent>>,
    worker: Option<JoinHandle<()>>,
}

impl SessionController {
    pub fn new(terminal: Arc<dyn Terminal>, settings: SessionSettings) -> Self {
        let bridge = TerminalBridge::new(terminal.clone(), settings.read_poll);
        Self {
            terminal,
            bridge,
            settings,
            interrupt: InterruptCell::new(),
            gate: GateHandle::new(),
            files: SourceFiles::new(),
            resolver: ValueResolver::standard(),
            state: SessionState::Idle,
            events: None,
            worker: None,
        }
    }

    /// Replace the opcode table used for pause decisions.
    pub fn with_resolver(mut self, resolver: ValueResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn files(&self) -> &SourceFiles {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut SourceFiles {
        &mut self.files
    }

    pub fn bridge(&self) -> &TerminalBridge {
        &self.bridge
    }

    /// Shared handle to the interrupt cell, e.g. for a signal handler.
    pub fn interrupt_cell(&self) -> InterruptCell {
        self.interrupt.clone()
    }

    /// Begin a run on a worker thread.
    pub fn start(&mut self, config: RunConfig) -> Result<()> {
        if self.state.is_active() {
            return Err(SessionError::AlreadyActive);
        }
        self.join_worker();

        self.interrupt.clear();
        self.files.open(config.unit_name.clone(), &config.source);
        let namespace = self.files.sync();

        let (tx, rx) = mpsc::channel();
        let job = Job {
            config: config.clone(),
            namespace,
            bridge: self.bridge.clone(),
            interrupt: self.interrupt.clone(),
            gate: self.gate.clone(),
            resolver: self.resolver.clone(),
            settings: self.settings,
            events: tx,
        };

        let worker = thread::Builder::new()
            .name("step-debugger-vm".to_string())
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || job.run())
            .map_err(SessionError::Spawn)?;

        info!(
            target: "step_debugger::session",
            unit = %config.unit_name,
            mode = ?config.mode,
            "run started"
        );
        self.worker = Some(worker);
        self.events = Some(rx);
        self.state = SessionState::Running {
            traced: config.mode.is_debug(),
        };
        Ok(())
    }

    /// Wait up to `timeout` for the next event and apply it to the state.
    pub fn poll_event(&mut self, timeout: Duration) -> Result<Option<SessionEvent>> {
        let events = self.events.as_ref().ok_or(SessionError::NotActive)?;
        let event = match events.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => return Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                warn!(target: "step_debugger::session", "interpreter thread exited without a result");
                SessionEvent::Terminated(RunOutcome::Fault {
                    reason: "interpreter thread exited unexpectedly".to_string(),
                })
            }
        };

        match &event {
            SessionEvent::Paused(pause) => {
                debug!(
                    target: "step_debugger::session",
                    seq = pause.seq,
                    line = pause.highlight.start_line,
                    "paused"
                );
                self.state = SessionState::Paused(pause.clone());
            }
            SessionEvent::Terminated(outcome) => {
                info!(target: "step_debugger::session", ?outcome, "run terminated");
                self.state = SessionState::Terminated(outcome.clone());
                self.events = None;
                self.join_worker();
            }
        }
        Ok(Some(event))
    }

    /// Block until the next event.
    pub fn wait_event(&mut self) -> Result<SessionEvent> {
        loop {
            if let Some(event) = self.poll_event(EVENT_POLL)? {
                return Ok(event);
            }
        }
    }

    /// Answer the current pause. The pause's snapshot is released first.
    pub fn resume(&mut self, decision: ResumeDecision) -> Result<()> {
        let SessionState::Paused(event) = &self.state else {
            return Err(SessionError::NotPaused);
        };
        event.frame.release();
        self.gate.resolve(event.seq, decision)?;
        debug!(target: "step_debugger::session", seq = event.seq, ?decision, "resumed");
        self.state = SessionState::Running {
            traced: decision == ResumeDecision::ContinueStepping,
        };
        Ok(())
    }

    /// Signal the interrupt cell. The run ends at its next suspension point.
    pub fn interrupt(&self) {
        info!(target: "step_debugger::session", "interrupt requested");
        self.interrupt.signal();
    }

    /// Run to completion, answering each pause with `on_pause`.
    pub fn run<F>(&mut self, config: RunConfig, mut on_pause: F) -> Result<RunOutcome>
    where
        F: FnMut(&PauseEvent) -> ResumeDecision,
    {
        self.start(config)?;
        loop {
            match self.wait_event()? {
                SessionEvent::Paused(event) => {
                    let decision = on_pause(&event);
                    self.resume(decision)?;
                }
                SessionEvent::Terminated(outcome) => return Ok(outcome),
            }
        }
    }

    pub fn terminal(&self) -> &Arc<dyn Terminal> {
        &self.terminal
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(target: "step_debugger::session", "interpreter thread panicked");
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.state.is_active() {
            self.interrupt.signal();
        }
        self.events = None;
        self.join_worker();
    }
}

/// Everything the worker thread needs for one run.
struct Job {
    config: RunConfig,
    namespace: FileNamespace,
    bridge: TerminalBridge,
    interrupt: InterruptCell,
    gate: GateHandle,
    resolver: ValueResolver,
    settings: SessionSettings,
    events: Sender<SessionEvent>,
}

impl Job {
    fn run(self) {
        let terminal = self.bridge.terminal().clone();
        let events = self.events.clone();
        let outcome = self.execute();
        if let RunOutcome::Failed { error } = &outcome {
            terminal.write(&paint_error(&error.message));
        }
        let _ = events.send(SessionEvent::Terminated(outcome));
    }

    fn execute(self) -> RunOutcome {
        let name = &self.config.unit_name;
        let unit = match compile(&self.config.source, name) {
            Ok(unit) => unit,
            Err(err) => {
                debug!(target: "step_debugger::session", error = %err, "compile failed");
                return RunOutcome::Failed {
                    error: ErrorReport::from_syntax(&err, name, &self.namespace),
                };
            }
        };

        let console = BridgeConsole::new(self.bridge.clone(), self.interrupt.clone());
        let limits = Limits {
            recursion_limit: self.settings.recursion_limit,
        };
        let mut machine = Machine::new(Box::new(console), self.interrupt.clone(), limits);

        if self.config.mode.is_debug() {
            let line_count = self.namespace.line_count(name).unwrap_or(0);
            let gate = StepGate::new(self.gate.clone(), self.interrupt.clone(), self.settings.gate_poll);
            machine.set_trace(Box::new(DebugTracer::new(
                name.clone(),
                line_count,
                self.resolver.clone(),
                gate,
                self.interrupt.clone(),
                self.events.clone(),
            )));
        }

        match machine.execute(unit) {
            Ok(_) => RunOutcome::Completed,
            Err(Unwind::Cancelled) => RunOutcome::Cancelled,
            Err(Unwind::Exception(exc)) => RunOutcome::Failed {
                error: ErrorReport::from_exception(&exc, &self.namespace),
            },
            Err(Unwind::Fault(reason)) => {
                warn!(target: "step_debugger::session", %reason, "run aborted");
                RunOutcome::Fault { reason }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::ChannelTerminal;

    fn controller() -> SessionController {
        let (terminal, _rx) = ChannelTerminal::new();
        SessionController::new(Arc::new(terminal), SessionSettings::default())
    }

    #[test]
    fn test_resume_requires_pause() {
        let mut session = controller();
        assert!(matches!(
            session.resume(ResumeDecision::ContinueStepping),
            Err(SessionError::NotPaused)
        ));
        assert!(matches!(
            session.poll_event(Duration::from_millis(1)),
            Err(SessionError::NotActive)
        ));
    }

    #[test]
    fn test_second_start_is_rejected() {
        let mut session = controller();
        session.start(RunConfig::debug("x = 1\n", "main.py")).unwrap();
        assert!(matches!(
            session.start(RunConfig::debug("x = 1\n", "main.py")),
            Err(SessionError::AlreadyActive)
        ));
        session.interrupt();
        loop {
            if let SessionEvent::Terminated(outcome) = session.wait_event().unwrap() {
                assert_eq!(outcome, RunOutcome::Cancelled);
                break;
            }
        }
    }

    #[test]
    fn test_state_follows_events() {
        let mut session = controller();
        session.start(RunConfig::debug("x = 1\n", "main.py")).unwrap();
        assert!(matches!(session.state(), SessionState::Running { traced: true }));

        let event = session.wait_event().unwrap();
        assert!(matches!(event, SessionEvent::Paused(_)));
        assert_eq!(session.state().pause().map(|p| p.seq), Some(1));

        session.resume(ResumeDecision::StopDebugging).unwrap();
        assert!(matches!(session.state(), SessionState::Running { traced: false }));

        let event = session.wait_event().unwrap();
        assert!(matches!(event, SessionEvent::Terminated(RunOutcome::Completed)));
        assert_eq!(session.state().outcome(), Some(&RunOutcome::Completed));
    }
}
