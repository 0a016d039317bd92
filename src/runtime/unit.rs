use std::fmt;

use super::value::Value;
use crate::parser::{BinOp, CmpOp, Span, UnaryOp};

/// Width in bytes of one encoded instruction. Trace offsets (`lasti`) are
/// byte offsets, so the table index of an offset is `offset / INSTRUCTION_WIDTH`.
pub const INSTRUCTION_WIDTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    Nop,
    PopTop,
    ReturnValue,
    PushNull,
    LoadConst,
    LoadName,
    StoreName,
    BinaryOp,
    CompareOp,
    UnaryOp,
    Call,
    MakeFunction,
    Jump,
    PopJumpIfFalse,
    JumpIfFalseOrPop,
    JumpIfTrueOrPop,
}

impl Opcode {
    pub const ALL: [Opcode; 16] = [
        Opcode::Nop,
        Opcode::PopTop,
        Opcode::ReturnValue,
        Opcode::PushNull,
        Opcode::LoadConst,
        Opcode::LoadName,
        Opcode::StoreName,
        Opcode::BinaryOp,
        Opcode::CompareOp,
        Opcode::UnaryOp,
        Opcode::Call,
        Opcode::MakeFunction,
        Opcode::Jump,
        Opcode::PopJumpIfFalse,
        Opcode::JumpIfFalseOrPop,
        Opcode::JumpIfTrueOrPop,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::PopTop => "POP_TOP",
            Opcode::ReturnValue => "RETURN_VALUE",
            Opcode::PushNull => "PUSH_NULL",
            Opcode::LoadConst => "LOAD_CONST",
            Opcode::LoadName => "LOAD_NAME",
            Opcode::StoreName => "STORE_NAME",
            Opcode::BinaryOp => "BINARY_OP",
            Opcode::CompareOp => "COMPARE_OP",
            Opcode::UnaryOp => "UNARY_OP",
            Opcode::Call => "CALL",
            Opcode::MakeFunction => "MAKE_FUNCTION",
            Opcode::Jump => "JUMP",
            Opcode::PopJumpIfFalse => "POP_JUMP_IF_FALSE",
            Opcode::JumpIfFalseOrPop => "JUMP_IF_FALSE_OR_POP",
            Opcode::JumpIfTrueOrPop => "JUMP_IF_TRUE_OR_POP",
        }
    }

    pub fn from_mnemonic(name: &str) -> Option<Opcode> {
        Opcode::ALL.iter().copied().find(|op| op.mnemonic() == name)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub arg: u32,
}

impl Instruction {
    pub fn new(opcode: Opcode, arg: u32) -> Self {
        Self { opcode, arg }
    }
}

// Operator operands are indices into these tables.
pub const BINARY_OPS: [BinOp; 6] = [
    BinOp::Add,
    BinOp::Sub,
    BinOp::Mul,
    BinOp::Div,
    BinOp::FloorDiv,
    BinOp::Mod,
];
pub const COMPARE_OPS: [CmpOp; 6] = [
    CmpOp::Eq,
    CmpOp::NotEq,
    CmpOp::Lt,
    CmpOp::LtEq,
    CmpOp::Gt,
    CmpOp::GtEq,
];
pub const UNARY_OPS: [UnaryOp; 2] = [UnaryOp::Neg, UnaryOp::Not];

pub fn operand_index<T: PartialEq>(table: &[T], op: T) -> u32 {
    table.iter().position(|t| *t == op).unwrap_or(0) as u32
}

/// Source position of one instruction. Lines are 1-based, columns 0-based
/// with an exclusive end. Any component may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionEntry {
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub start_col: Option<u32>,
    pub end_col: Option<u32>,
}

impl From<Span> for PositionEntry {
    fn from(span: Span) -> Self {
        Self {
            start_line: Some(span.line),
            end_line: Some(span.end_line),
            start_col: Some(span.col),
            end_col: Some(span.end_col),
        }
    }
}

/// Compiled form of one module or function body.
#[derive(Debug)]
pub struct CompiledUnit {
    pub filename: String,
    pub name: String,
    pub first_line: u32,
    pub params: Vec<String>,
    pub instructions: Vec<Instruction>,
    /// Indexed like `instructions`.
    pub positions: Vec<PositionEntry>,
    pub constants: Vec<Value>,
    pub names: Vec<String>,
}

impl CompiledUnit {
    pub fn is_module(&self) -> bool {
        self.name == "<module>"
    }

    pub fn len_bytes(&self) -> usize {
        self.instructions.len() * INSTRUCTION_WIDTH
    }

    pub fn instruction_at(&self, offset: usize) -> Option<Instruction> {
        self.instructions.get(offset / INSTRUCTION_WIDTH).copied()
    }

    pub fn position_at(&self, offset: usize) -> Option<PositionEntry> {
        self.positions.get(offset / INSTRUCTION_WIDTH).copied()
    }

    pub fn constant(&self, index: u32) -> Option<&Value> {
        self.constants.get(index as usize)
    }

    pub fn name_at(&self, index: u32) -> Option<&str> {
        self.names.get(index as usize).map(String::as_str)
    }

    /// Human-readable listing, one instruction per line.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for (index, instr) in self.instructions.iter().enumerate() {
            let line = self
                .positions
                .get(index)
                .and_then(|p| p.start_line)
                .map(|l| l.to_string())
                .unwrap_or_else(|| "-".to_string());
            let detail = match instr.opcode {
                Opcode::LoadConst | Opcode::MakeFunction => self
                    .constant(instr.arg)
                    .map(|v| format!(" ({})", v.repr()))
                    .unwrap_or_default(),
                Opcode::LoadName | Opcode::StoreName => self
                    .name_at(instr.arg)
                    .map(|n| format!(" ({})", n))
                    .unwrap_or_default(),
                Opcode::BinaryOp => BINARY_OPS
                    .get(instr.arg as usize)
                    .map(|op| format!(" ({})", op.symbol()))
                    .unwrap_or_default(),
                Opcode::CompareOp => COMPARE_OPS
                    .get(instr.arg as usize)
                    .map(|op| format!(" ({})", op.symbol()))
                    .unwrap_or_default(),
                _ => String::new(),
            };
            out.push_str(&format!(
                "{:>4} {:>6} {:<22} {}{}\n",
                line,
                index * INSTRUCTION_WIDTH,
                instr.opcode.mnemonic(),
                instr.arg,
                detail
            ));
        }
        out
    }
}
