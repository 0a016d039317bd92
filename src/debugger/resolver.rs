use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, Serializer};

use super::snapshot::FrameSnapshot;
use crate::runtime::{CompiledUnit, FrameRef, Opcode, Value};

/// The value an instruction is working with, for hint display.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedValue {
    Value(Value),
    /// Nothing is loaded here. Distinct from the guest's `None`.
    NoValue,
}

impl LoadedValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            LoadedValue::Value(v) => Some(v),
            LoadedValue::NoValue => None,
        }
    }

    pub fn is_no_value(&self) -> bool {
        matches!(self, LoadedValue::NoValue)
    }
}

impl fmt::Display for LoadedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadedValue::Value(v) => f.write_str(&v.repr()),
            LoadedValue::NoValue => f.write_str("<no value>"),
        }
    }
}

/// Serialized as `{"repr": ..., "type": ...}`, or `null` for `NoValue`.
impl Serialize for LoadedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LoadedValue::NoValue => serializer.serialize_none(),
            LoadedValue::Value(v) => {
                let body = serde_json::json!({ "repr": v.repr(), "type": v.type_name() });
                body.serialize(serializer)
            }
        }
    }
}

/// Name resolution through local, global, then builtin scope.
pub trait NameLookup {
    fn lookup_name(&self, name: &str) -> Option<Value>;
}

impl NameLookup for FrameRef<'_> {
    fn lookup_name(&self, name: &str) -> Option<Value> {
        self.lookup(name)
    }
}

impl NameLookup for FrameSnapshot {
    fn lookup_name(&self, name: &str) -> Option<Value> {
        self.lookup(name).ok().flatten()
    }
}

pub type CustomRule = Arc<dyn Fn(u32, &CompiledUnit, &dyn NameLookup) -> LoadedValue + Send + Sync>;

/// How one opcode is treated.
#[derive(Clone)]
pub enum Rule {
    /// Never pause here.
    Skip,
    /// Operand indexes the unit's constant table.
    Constant,
    /// Operand indexes the unit's name table; resolved through the scopes.
    Name,
    /// Pause with nothing loaded.
    Nothing,
    Custom(CustomRule),
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Skip => f.write_str("Skip"),
            Rule::Constant => f.write_str("Constant"),
            Rule::Name => f.write_str("Name"),
            Rule::Nothing => f.write_str("Nothing"),
            Rule::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Opcodes that never produce a pause. Stores and jumps are included so a
/// statement pauses once, on the instruction that loads its first value.
pub const SKIPPED: [Opcode; 10] = [
    Opcode::Nop,
    Opcode::PopTop,
    Opcode::ReturnValue,
    Opcode::PushNull,
    Opcode::StoreName,
    Opcode::MakeFunction,
    Opcode::Jump,
    Opcode::PopJumpIfFalse,
    Opcode::JumpIfFalseOrPop,
    Opcode::JumpIfTrueOrPop,
];

/// Table-driven mapping from instruction to `(loaded value, should pause)`.
#[derive(Debug, Clone)]
pub struct ValueResolver {
    rules: HashMap<Opcode, Rule>,
    fallback: Rule,
}

impl Default for ValueResolver {
    fn default() -> Self {
        Self::standard()
    }
}

impl ValueResolver {
    pub fn standard() -> Self {
        let mut rules: HashMap<Opcode, Rule> = SKIPPED.iter().map(|op| (*op, Rule::Skip)).collect();
        rules.insert(Opcode::LoadConst, Rule::Constant);
        rules.insert(Opcode::LoadName, Rule::Name);
        Self {
            rules,
            fallback: Rule::Nothing,
        }
    }

    pub fn with_rule(mut self, opcode: Opcode, rule: Rule) -> Self {
        self.rules.insert(opcode, rule);
        self
    }

    pub fn rule(&self, opcode: Opcode) -> &Rule {
        self.rules.get(&opcode).unwrap_or(&self.fallback)
    }

    pub fn resolve(
        &self,
        opcode: Opcode,
        arg: u32,
        unit: &CompiledUnit,
        scopes: &dyn NameLookup,
    ) -> (LoadedValue, bool) {
        let loaded = match self.rule(opcode) {
            Rule::Skip => return (LoadedValue::NoValue, false),
            Rule::Constant => unit
                .constant(arg)
                .cloned()
                .map(LoadedValue::Value)
                .unwrap_or(LoadedValue::NoValue),
            Rule::Name => unit
                .name_at(arg)
                .and_then(|name| scopes.lookup_name(name))
                .map(LoadedValue::Value)
                .unwrap_or(LoadedValue::NoValue),
            Rule::Nothing => LoadedValue::NoValue,
            Rule::Custom(rule) => rule(arg, unit, scopes),
        };
        (loaded, true)
    }
}
