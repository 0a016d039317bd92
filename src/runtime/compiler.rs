use std::sync::Arc;

use super::unit::{
    operand_index, CompiledUnit, Instruction, Opcode, PositionEntry, BINARY_OPS, COMPARE_OPS,
    UNARY_OPS,
};
use super::value::Value;
use crate::parser::{self, BoolOp, Expr, ExprKind, Span, Stmt, StmtKind, SyntaxError};

/// Compile module source into a unit named `<module>` for `filename`.
///
/// Every instruction is tagged with the span of the statement it belongs to
/// (the header for compound statements). Operators and calls, which can
/// raise, carry their own expression span instead.
pub fn compile(source: &str, filename: &str) -> Result<Arc<CompiledUnit>, SyntaxError> {
    let body = parser::parse(source)?;
    let mut gen = CodeGen::new(filename, "<module>", 1, Vec::new());
    gen.block(&body)?;
    gen.finish(&body);
    Ok(Arc::new(gen.into_unit()))
}

struct CodeGen {
    filename: String,
    name: String,
    first_line: u32,
    params: Vec<String>,
    instructions: Vec<Instruction>,
    positions: Vec<PositionEntry>,
    constants: Vec<Value>,
    names: Vec<String>,
    in_function: bool,
}

impl CodeGen {
    fn new(filename: &str, name: &str, first_line: u32, params: Vec<String>) -> Self {
        Self {
            filename: filename.to_string(),
            name: name.to_string(),
            first_line,
            params,
            instructions: Vec::new(),
            positions: Vec::new(),
            constants: Vec::new(),
            names: Vec::new(),
            in_function: name != "<module>",
        }
    }

    fn into_unit(self) -> CompiledUnit {
        CompiledUnit {
            filename: self.filename,
            name: self.name,
            first_line: self.first_line,
            params: self.params,
            instructions: self.instructions,
            positions: self.positions,
            constants: self.constants,
            names: self.names,
        }
    }

    fn emit(&mut self, opcode: Opcode, arg: u32, span: Option<Span>) -> usize {
        self.instructions.push(Instruction::new(opcode, arg));
        self.positions
            .push(span.map(PositionEntry::from).unwrap_or_default());
        self.instructions.len() - 1
    }

    fn patch(&mut self, at: usize, target: usize) {
        self.instructions[at].arg = target as u32;
    }

    fn here(&self) -> usize {
        self.instructions.len()
    }

    fn constant(&mut self, value: Value) -> u32 {
        let existing = self.constants.iter().position(|c| match (c, &value) {
            (Value::Code(_), _) | (_, Value::Code(_)) => false,
            // Keep 1 and True (and 1.0) apart even though they compare equal.
            (a, b) => a.type_name() == b.type_name() && a == b,
        });
        match existing {
            Some(index) => index as u32,
            None => {
                self.constants.push(value);
                (self.constants.len() - 1) as u32
            }
        }
    }

    fn name(&mut self, name: &str) -> u32 {
        match self.names.iter().position(|n| n == name) {
            Some(index) => index as u32,
            None => {
                self.names.push(name.to_string());
                (self.names.len() - 1) as u32
            }
        }
    }

    /// Implicit `return None` at the end of a body, tagged like its last
    /// statement.
    fn finish(&mut self, body: &[Stmt]) {
        let span = body.last().map(last_span);
        let none = self.constant(Value::None);
        self.emit(Opcode::LoadConst, none, span);
        self.emit(Opcode::ReturnValue, 0, span);
    }

    fn block(&mut self, body: &[Stmt]) -> Result<(), SyntaxError> {
        for stmt in body {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<(), SyntaxError> {
        let span = Some(stmt.span);
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                self.expression(value, stmt.span);
                let index = self.name(target);
                self.emit(Opcode::StoreName, index, span);
            }
            StmtKind::Expr(expr) => {
                self.expression(expr, stmt.span);
                self.emit(Opcode::PopTop, 0, span);
            }
            StmtKind::Pass => {
                self.emit(Opcode::Nop, 0, span);
            }
            StmtKind::Return(value) => {
                if !self.in_function {
                    return Err(SyntaxError::at(stmt.span, "'return' outside function"));
                }
                match value {
                    Some(expr) => self.expression(expr, stmt.span),
                    None => {
                        let none = self.constant(Value::None);
                        self.emit(Opcode::LoadConst, none, span);
                    }
                }
                self.emit(Opcode::ReturnValue, 0, span);
            }
            StmtKind::While { test, body } => {
                let top = self.here();
                self.expression(test, stmt.span);
                let exit = self.emit(Opcode::PopJumpIfFalse, 0, span);
                self.block(body)?;
                self.emit(Opcode::Jump, top as u32, span);
                let end = self.here();
                self.patch(exit, end);
            }
            StmtKind::If { branches, orelse } => {
                let mut to_end = Vec::new();
                for (test, header, body) in branches {
                    self.expression(test, *header);
                    let skip = self.emit(Opcode::PopJumpIfFalse, 0, Some(*header));
                    self.block(body)?;
                    let tail = body.last().map(last_span).unwrap_or(*header);
                    to_end.push(self.emit(Opcode::Jump, 0, Some(tail)));
                    let next = self.here();
                    self.patch(skip, next);
                }
                self.block(orelse)?;
                let end = self.here();
                for jump in to_end {
                    self.patch(jump, end);
                }
            }
            StmtKind::Def { name, params, body } => {
                let mut inner = CodeGen::new(&self.filename, name, stmt.span.line, params.clone());
                inner.block(body)?;
                inner.finish(body);
                let code = Arc::new(inner.into_unit());
                let index = self.constant(Value::Code(code));
                self.emit(Opcode::MakeFunction, index, span);
                let target = self.name(name);
                self.emit(Opcode::StoreName, target, span);
            }
        }
        Ok(())
    }

    fn expression(&mut self, expr: &Expr, stmt: Span) {
        let tag = Some(stmt);
        match &expr.kind {
            ExprKind::Int(v) => self.load_const(Value::Int(*v), tag),
            ExprKind::Float(v) => self.load_const(Value::Float(*v), tag),
            ExprKind::Str(s) => self.load_const(Value::str(s), tag),
            ExprKind::Bool(b) => self.load_const(Value::Bool(*b), tag),
            ExprKind::None => self.load_const(Value::None, tag),
            ExprKind::Name(name) => {
                let index = self.name(name);
                self.emit(Opcode::LoadName, index, tag);
            }
            ExprKind::Unary { op, operand } => {
                self.expression(operand, stmt);
                self.emit(Opcode::UnaryOp, operand_index(&UNARY_OPS, *op), Some(expr.span));
            }
            ExprKind::Binary { op, left, right } => {
                self.expression(left, stmt);
                self.expression(right, stmt);
                self.emit(Opcode::BinaryOp, operand_index(&BINARY_OPS, *op), Some(expr.span));
            }
            ExprKind::Compare { op, left, right } => {
                self.expression(left, stmt);
                self.expression(right, stmt);
                self.emit(Opcode::CompareOp, operand_index(&COMPARE_OPS, *op), Some(expr.span));
            }
            ExprKind::BoolOp { op, left, right } => {
                self.expression(left, stmt);
                let opcode = match op {
                    BoolOp::And => Opcode::JumpIfFalseOrPop,
                    BoolOp::Or => Opcode::JumpIfTrueOrPop,
                };
                let jump = self.emit(opcode, 0, tag);
                self.expression(right, stmt);
                let end = self.here();
                self.patch(jump, end);
            }
            ExprKind::Call { func, args } => {
                self.emit(Opcode::PushNull, 0, tag);
                self.expression(func, stmt);
                for arg in args {
                    self.expression(arg, stmt);
                }
                self.emit(Opcode::Call, args.len() as u32, Some(expr.span));
            }
        }
    }

    fn load_const(&mut self, value: Value, tag: Option<Span>) {
        let index = self.constant(value);
        self.emit(Opcode::LoadConst, index, tag);
    }
}

/// Span of the last simple statement reached when falling off `stmt`.
fn last_span(stmt: &Stmt) -> Span {
    match &stmt.kind {
        StmtKind::If { branches, orelse } => orelse
            .last()
            .or_else(|| branches.last().and_then(|(_, _, body)| body.last()))
            .map(last_span)
            .unwrap_or(stmt.span),
        _ => stmt.span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opcodes(unit: &CompiledUnit) -> Vec<Opcode> {
        unit.instructions.iter().map(|i| i.opcode).collect()
    }

    #[test]
    fn test_assignment_and_call_layout() {
        let unit = compile("x = 1\nprint(x)\n", "main.py").unwrap();
        assert_eq!(
            opcodes(&unit),
            vec![
                Opcode::LoadConst,
                Opcode::StoreName,
                Opcode::PushNull,
                Opcode::LoadName,
                Opcode::LoadName,
                Opcode::Call,
                Opcode::PopTop,
                Opcode::LoadConst,
                Opcode::ReturnValue,
            ]
        );
        assert_eq!(unit.positions.len(), unit.instructions.len());
        assert_eq!(unit.positions[0], PositionEntry::from(Span::new(1, 0, 1, 5)));
        assert_eq!(unit.positions[5], PositionEntry::from(Span::new(2, 0, 2, 8)));
    }

    #[test]
    fn test_binary_op_carries_expression_span() {
        let unit = compile("x = 1\nz = 2\ny = x / 0\n", "main.py").unwrap();
        let index = unit
            .instructions
            .iter()
            .position(|i| i.opcode == Opcode::BinaryOp)
            .unwrap();
        assert_eq!(unit.positions[index], PositionEntry::from(Span::new(3, 4, 3, 9)));
        // Operands are tagged with the whole statement.
        assert_eq!(unit.positions[index - 1], PositionEntry::from(Span::new(3, 0, 3, 9)));
    }

    #[test]
    fn test_while_loop_jumps_back_to_test() {
        let unit = compile("i = 0\nwhile i < 3:\n    i = i + 1\n", "main.py").unwrap();
        let jump = unit
            .instructions
            .iter()
            .find(|i| i.opcode == Opcode::Jump)
            .unwrap();
        assert_eq!(jump.arg, 2);
        let exit = unit
            .instructions
            .iter()
            .find(|i| i.opcode == Opcode::PopJumpIfFalse)
            .unwrap();
        assert_eq!(unit.instructions[exit.arg as usize].opcode, Opcode::LoadConst);
    }

    #[test]
    fn test_def_produces_nested_unit() {
        let unit = compile("def add(a, b):\n    return a + b\n", "main.py").unwrap();
        let code = unit
            .constants
            .iter()
            .find_map(|c| match c {
                Value::Code(code) => Some(code.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(code.name, "add");
        assert_eq!(code.params, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(code.first_line, 1);
        assert_eq!(code.filename, "main.py");
        assert!(!code.is_module());
    }

    #[test]
    fn test_return_outside_function() {
        let err = compile("return 1\n", "main.py").unwrap_err();
        assert_eq!(err.message, "'return' outside function");
    }

    #[test]
    fn test_constants_are_shared() {
        let unit = compile("a = 1\nb = 1\nc = True\n", "main.py").unwrap();
        let ints = unit
            .constants
            .iter()
            .filter(|c| matches!(c, Value::Int(1)))
            .count();
        assert_eq!(ints, 1);
        assert!(unit.constants.iter().any(|c| matches!(c, Value::Bool(true))));
    }

    #[test]
    fn test_empty_module_has_unpositioned_return() {
        let unit = compile("", "main.py").unwrap();
        assert_eq!(opcodes(&unit), vec![Opcode::LoadConst, Opcode::ReturnValue]);
        assert_eq!(unit.positions[0], PositionEntry::default());
    }
}
