use std::sync::Arc;

use tracing::{debug, trace};

use super::builtins::{self, Console};
use super::exception::{ExceptionKind, FailurePoint, TraceEntry, Unwind};
use super::frame::{lock, Frame, FrameArena, FrameId, FrameRef, Scope, SharedArena};
use super::trace::{TraceControl, TraceEvent, TraceHook};
use super::unit::{CompiledUnit, Instruction, Opcode, BINARY_OPS, COMPARE_OPS, INSTRUCTION_WIDTH, UNARY_OPS};
use super::value::{binary_op, compare_op, unary_op, Function, Value};
use crate::debugger::InterruptCell;

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub recursion_limit: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            recursion_limit: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    lasti: usize,
    line: u32,
}

/// Executes compiled units on the calling thread.
///
/// The interrupt cell is polled before every instruction, traced or not.
pub struct Machine {
    arena: SharedArena,
    console: Box<dyn Console>,
    hook: Option<Box<dyn TraceHook>>,
    interrupt: InterruptCell,
    limits: Limits,
    depth: usize,
}

impl Machine {
    pub fn new(console: Box<dyn Console>, interrupt: InterruptCell, limits: Limits) -> Self {
        Self {
            arena: FrameArena::shared(builtins::scope()),
            console,
            hook: None,
            interrupt,
            limits,
            depth: 0,
        }
    }

    pub fn arena(&self) -> &SharedArena {
        &self.arena
    }

    /// Install the hook for the next `execute`. It is dropped when that run
    /// ends, or earlier if it answers `TraceControl::Untrace`.
    pub fn set_trace(&mut self, hook: Box<dyn TraceHook>) {
        self.hook = Some(hook);
    }

    pub fn is_tracing(&self) -> bool {
        self.hook.is_some()
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        lock(&self.arena).globals().get(name).cloned()
    }

    pub fn execute(&mut self, unit: Arc<CompiledUnit>) -> Result<Value, Unwind> {
        debug!(
            target: "step_debugger::vm",
            file = %unit.filename,
            traced = self.hook.is_some(),
            "executing module"
        );
        let id = lock(&self.arena).alloc(Frame::new(unit.clone(), None, Scope::new()));
        self.depth = 1;
        let result = self.run_frame(&unit, id);
        lock(&self.arena).release(id);
        self.depth = 0;
        self.hook = None;
        result
    }

    fn run_frame(&mut self, unit: &Arc<CompiledUnit>, id: FrameId) -> Result<Value, Unwind> {
        let mut cursor = Cursor {
            lasti: 0,
            line: unit.first_line,
        };
        let result = self.eval(unit, id, &mut cursor);

        let returned = result.as_ref().ok().cloned();
        let control = self.fire(unit, id, cursor, TraceEvent::Return, returned.as_ref());

        match result {
            Ok(value) => control.map(|()| value),
            Err(Unwind::Exception(mut exc)) => {
                if exc.failure.is_none() {
                    exc.failure = Some(FailurePoint {
                        unit: unit.clone(),
                        offset: cursor.lasti,
                        line: cursor.line,
                    });
                }
                exc.traceback.insert(
                    0,
                    TraceEntry {
                        filename: unit.filename.clone(),
                        line: cursor.line,
                        function: unit.name.clone(),
                    },
                );
                Err(Unwind::Exception(exc))
            }
            Err(other) => Err(other),
        }
    }

    fn eval(&mut self, unit: &Arc<CompiledUnit>, id: FrameId, cursor: &mut Cursor) -> Result<Value, Unwind> {
        self.fire(unit, id, *cursor, TraceEvent::Call, None)?;

        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0usize;
        let mut last_line = 0u32;

        loop {
            let Some(instr) = unit.instructions.get(pc).copied() else {
                return Ok(Value::None);
            };
            cursor.lasti = pc * INSTRUCTION_WIDTH;
            if let Some(line) = unit.positions.get(pc).and_then(|p| p.start_line) {
                cursor.line = line;
            }
            lock(&self.arena).set_position(id, cursor.lasti, cursor.line);

            if cursor.line != last_line {
                last_line = cursor.line;
                self.fire(unit, id, *cursor, TraceEvent::Line, None)?;
            }
            self.fire(unit, id, *cursor, TraceEvent::Opcode, None)?;

            if self.interrupt.is_set() {
                debug!(target: "step_debugger::vm", line = cursor.line, "interrupt observed");
                return Err(Unwind::Cancelled);
            }

            trace!(
                target: "step_debugger::vm",
                offset = cursor.lasti,
                op = instr.opcode.mnemonic(),
                arg = instr.arg
            );
            pc += 1;

            match instr.opcode {
                Opcode::Nop => {}
                Opcode::PopTop => {
                    pop(&mut stack)?;
                }
                Opcode::ReturnValue => return pop(&mut stack),
                Opcode::PushNull => stack.push(Value::None),
                Opcode::LoadConst => {
                    let value = unit.constant(instr.arg).cloned().ok_or_else(|| bad_operand(instr))?;
                    stack.push(value);
                }
                Opcode::LoadName => {
                    let name = unit.name_at(instr.arg).ok_or_else(|| bad_operand(instr))?;
                    let value = lock(&self.arena).lookup(id, name).ok_or_else(|| {
                        Unwind::raise(
                            ExceptionKind::NameError,
                            format!("name '{}' is not defined", name),
                        )
                    })?;
                    stack.push(value);
                }
                Opcode::StoreName => {
                    let name = unit.name_at(instr.arg).ok_or_else(|| bad_operand(instr))?;
                    let value = pop(&mut stack)?;
                    lock(&self.arena).store(id, name, value);
                }
                Opcode::BinaryOp => {
                    let op = BINARY_OPS.get(instr.arg as usize).ok_or_else(|| bad_operand(instr))?;
                    let right = pop(&mut stack)?;
                    let left = pop(&mut stack)?;
                    stack.push(binary_op(*op, &left, &right)?);
                }
                Opcode::CompareOp => {
                    let op = COMPARE_OPS.get(instr.arg as usize).ok_or_else(|| bad_operand(instr))?;
                    let right = pop(&mut stack)?;
                    let left = pop(&mut stack)?;
                    stack.push(compare_op(*op, &left, &right)?);
                }
                Opcode::UnaryOp => {
                    let op = UNARY_OPS.get(instr.arg as usize).ok_or_else(|| bad_operand(instr))?;
                    let operand = pop(&mut stack)?;
                    stack.push(unary_op(*op, &operand)?);
                }
                Opcode::Call => {
                    let argc = instr.arg as usize;
                    if stack.len() < argc + 2 {
                        return Err(underflow());
                    }
                    let args = stack.split_off(stack.len() - argc);
                    let func = pop(&mut stack)?;
                    pop(&mut stack)?;
                    let value = self.call_value(func, args, id)?;
                    stack.push(value);
                }
                Opcode::MakeFunction => match unit.constant(instr.arg) {
                    Some(Value::Code(code)) => stack.push(Value::Function(Arc::new(Function {
                        name: code.name.clone(),
                        unit: code.clone(),
                    }))),
                    _ => return Err(bad_operand(instr)),
                },
                Opcode::Jump => pc = instr.arg as usize,
                Opcode::PopJumpIfFalse => {
                    if !pop(&mut stack)?.truthy() {
                        pc = instr.arg as usize;
                    }
                }
                Opcode::JumpIfFalseOrPop => {
                    let top = stack.last().ok_or_else(underflow)?;
                    if top.truthy() {
                        stack.pop();
                    } else {
                        pc = instr.arg as usize;
                    }
                }
                Opcode::JumpIfTrueOrPop => {
                    let top = stack.last().ok_or_else(underflow)?;
                    if top.truthy() {
                        pc = instr.arg as usize;
                    } else {
                        stack.pop();
                    }
                }
            }
        }
    }

    fn call_value(&mut self, func: Value, args: Vec<Value>, caller: FrameId) -> Result<Value, Unwind> {
        match func {
            Value::Builtin(builtin) => builtins::call(builtin, args, self.console.as_mut()),
            Value::Function(function) => {
                let unit = function.unit.clone();
                check_arity(&function.name, &unit.params, args.len())?;
                if self.depth >= self.limits.recursion_limit {
                    return Err(Unwind::raise(
                        ExceptionKind::RecursionError,
                        "maximum recursion depth exceeded",
                    ));
                }
                let locals: Scope = unit.params.iter().cloned().zip(args).collect();
                let id = lock(&self.arena).alloc(Frame::new(unit.clone(), Some(caller), locals));
                self.depth += 1;
                let result = self.run_frame(&unit, id);
                self.depth -= 1;
                lock(&self.arena).release(id);
                result
            }
            other => Err(Unwind::raise(
                ExceptionKind::TypeError,
                format!("'{}' object is not callable", other.type_name()),
            )),
        }
    }

    fn fire(
        &mut self,
        unit: &Arc<CompiledUnit>,
        id: FrameId,
        cursor: Cursor,
        event: TraceEvent,
        aux: Option<&Value>,
    ) -> Result<(), Unwind> {
        let Some(hook) = self.hook.as_mut() else {
            return Ok(());
        };
        let frame = FrameRef {
            id,
            unit,
            lasti: cursor.lasti,
            line: cursor.line,
            arena: &self.arena,
        };
        match hook.trace(&frame, event, aux) {
            TraceControl::Continue => Ok(()),
            TraceControl::Untrace => {
                debug!(target: "step_debugger::vm", "trace hook removed");
                self.hook = None;
                Ok(())
            }
            TraceControl::Cancel => Err(Unwind::Cancelled),
            TraceControl::Abort(reason) => Err(Unwind::Fault(reason)),
        }
    }
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, Unwind> {
    stack.pop().ok_or_else(underflow)
}

fn underflow() -> Unwind {
    Unwind::Fault("value stack underflow".to_string())
}

fn bad_operand(instr: Instruction) -> Unwind {
    Unwind::Fault(format!(
        "bad operand {} for {}",
        instr.arg,
        instr.opcode.mnemonic()
    ))
}

fn check_arity(name: &str, params: &[String], given: usize) -> Result<(), Unwind> {
    let expected = params.len();
    if given > expected {
        let plural = if expected == 1 { "" } else { "s" };
        let verb = if given == 1 { "was" } else { "were" };
        return Err(Unwind::raise(
            ExceptionKind::TypeError,
            format!(
                "{}() takes {} positional argument{} but {} {} given",
                name, expected, plural, given, verb
            ),
        ));
    }
    if given < expected {
        let missing: Vec<String> = params[given..].iter().map(|p| format!("'{}'", p)).collect();
        let listed = match missing.as_slice() {
            [one] => one.clone(),
            [first, second] => format!("{} and {}", first, second),
            [init @ .., last] => format!("{}, and {}", init.join(", "), last),
            [] => String::new(),
        };
        let plural = if missing.len() == 1 { "" } else { "s" };
        return Err(Unwind::raise(
            ExceptionKind::TypeError,
            format!(
                "{}() missing {} required positional argument{}: {}",
                name,
                missing.len(),
                plural,
                listed
            ),
        ));
    }
    Ok(())
}
