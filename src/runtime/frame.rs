use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::unit::CompiledUnit;
use super::value::Value;

pub type Scope = BTreeMap<String, Value>;

pub type SharedArena = Arc<Mutex<FrameArena>>;

/// Lock the arena, recovering from a poisoned mutex. Frame data is plain
/// bindings, so a panic elsewhere cannot leave it half-updated.
pub fn lock(arena: &SharedArena) -> MutexGuard<'_, FrameArena> {
    arena.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Generation-checked handle to a frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId {
    index: u32,
    generation: u32,
}

impl FrameId {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
pub struct Frame {
    pub unit: Arc<CompiledUnit>,
    pub parent: Option<FrameId>,
    pub lasti: usize,
    pub line: u32,
    /// Unused for module frames; their locals are the arena globals.
    pub locals: Scope,
}

impl Frame {
    pub fn new(unit: Arc<CompiledUnit>, parent: Option<FrameId>, locals: Scope) -> Self {
        let line = unit.first_line;
        Self {
            unit,
            parent,
            lasti: 0,
            line,
            locals,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    frame: Option<Frame>,
    pins: u32,
    retired: bool,
}

/// Owns every frame of one run, plus the global and builtin scopes.
///
/// A popped frame that is still pinned stays readable (retired) until the
/// last pin goes away; only then is the slot freed and its generation bumped,
/// so ids held past that point stop resolving.
#[derive(Debug, Default)]
pub struct FrameArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    globals: Scope,
    builtins: Scope,
}

impl FrameArena {
    pub fn new(builtins: Scope) -> Self {
        Self {
            builtins,
            ..Self::default()
        }
    }

    pub fn shared(builtins: Scope) -> SharedArena {
        Arc::new(Mutex::new(Self::new(builtins)))
    }

    pub fn alloc(&mut self, frame: Frame) -> FrameId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.frame = Some(frame);
            slot.pins = 0;
            slot.retired = false;
            return FrameId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            frame: Some(frame),
            pins: 0,
            retired: false,
        });
        FrameId {
            index,
            generation: 0,
        }
    }

    fn slot(&self, id: FrameId) -> Option<&Slot> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation && s.frame.is_some())
    }

    fn slot_mut(&mut self, id: FrameId) -> Option<&mut Slot> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation && s.frame.is_some())
    }

    /// True while `id` still names its original frame (active or retired).
    pub fn is_live(&self, id: FrameId) -> bool {
        self.slot(id).is_some()
    }

    /// True once the frame has returned; retired frames are read-only.
    pub fn is_retired(&self, id: FrameId) -> bool {
        self.slot(id).is_some_and(|s| s.retired)
    }

    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.slot(id).and_then(|s| s.frame.as_ref())
    }

    pub fn get_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.slot_mut(id)
            .filter(|s| !s.retired)
            .and_then(|s| s.frame.as_mut())
    }

    /// Called when the activation ends.
    pub fn release(&mut self, id: FrameId) {
        let Some(slot) = self.slot_mut(id) else {
            return;
        };
        if slot.pins > 0 {
            slot.retired = true;
        } else {
            self.free_slot(id.index);
        }
    }

    pub fn pin(&mut self, id: FrameId) -> bool {
        match self.slot_mut(id) {
            Some(slot) => {
                slot.pins += 1;
                true
            }
            None => false,
        }
    }

    pub fn unpin(&mut self, id: FrameId) {
        let Some(slot) = self.slot_mut(id) else {
            return;
        };
        slot.pins = slot.pins.saturating_sub(1);
        if slot.pins == 0 && slot.retired {
            self.free_slot(id.index);
        }
    }

    fn free_slot(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        slot.frame = None;
        slot.pins = 0;
        slot.retired = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
    }

    /// Number of slots currently holding a frame.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.frame.is_some()).count()
    }

    pub fn set_position(&mut self, id: FrameId, lasti: usize, line: u32) {
        if let Some(frame) = self.get_mut(id) {
            frame.lasti = lasti;
            frame.line = line;
        }
    }

    pub fn globals(&self) -> &Scope {
        &self.globals
    }

    pub fn builtins(&self) -> &Scope {
        &self.builtins
    }

    /// The local scope of `id`; for module frames this is the global scope.
    pub fn locals(&self, id: FrameId) -> Option<&Scope> {
        let frame = self.get(id)?;
        if frame.unit.is_module() {
            Some(&self.globals)
        } else {
            Some(&frame.locals)
        }
    }

    /// Resolve `name` through local, then global, then builtin scope.
    pub fn lookup(&self, id: FrameId, name: &str) -> Option<Value> {
        self.locals(id)
            .and_then(|scope| scope.get(name))
            .or_else(|| self.globals.get(name))
            .or_else(|| self.builtins.get(name))
            .cloned()
    }

    pub fn store(&mut self, id: FrameId, name: &str, value: Value) {
        let is_module = match self.get(id) {
            Some(frame) => frame.unit.is_module(),
            None => return,
        };
        if is_module {
            self.globals.insert(name.to_string(), value);
        } else if let Some(frame) = self.get_mut(id) {
            frame.locals.insert(name.to_string(), value);
        }
    }
}

/// View of the executing frame handed to trace hooks.
pub struct FrameRef<'a> {
    pub id: FrameId,
    pub unit: &'a Arc<CompiledUnit>,
    pub lasti: usize,
    pub line: u32,
    pub arena: &'a SharedArena,
}

impl FrameRef<'_> {
    pub fn lookup(&self, name: &str) -> Option<Value> {
        lock(self.arena).lookup(self.id, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::compile;

    fn unit(src: &str) -> Arc<CompiledUnit> {
        compile(src, "main.py").unwrap()
    }

    fn function_unit() -> Arc<CompiledUnit> {
        let module = unit("def f(a):\n    return a\n");
        module
            .constants
            .iter()
            .find_map(|c| match c {
                Value::Code(code) => Some(code.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_release_frees_and_bumps_generation() {
        let mut arena = FrameArena::default();
        let id = arena.alloc(Frame::new(unit("x = 1\n"), None, Scope::new()));
        assert!(arena.is_live(id));
        arena.release(id);
        assert!(!arena.is_live(id));

        let reused = arena.alloc(Frame::new(unit("y = 2\n"), None, Scope::new()));
        assert_eq!(reused.index(), id.index());
        assert_ne!(reused.generation(), id.generation());
        assert!(arena.get(id).is_none());
    }

    #[test]
    fn test_pinned_frame_is_retired_until_unpinned() {
        let mut arena = FrameArena::default();
        let id = arena.alloc(Frame::new(unit("x = 1\n"), None, Scope::new()));
        assert!(arena.pin(id));
        arena.release(id);
        assert!(arena.is_live(id));
        assert!(arena.is_retired(id));
        assert!(arena.get_mut(id).is_none());

        arena.unpin(id);
        assert!(!arena.is_live(id));
        assert_eq!(arena.occupied(), 0);
    }

    #[test]
    fn test_lookup_order_local_global_builtin() {
        let mut builtins = Scope::new();
        builtins.insert("x".into(), Value::Int(3));
        builtins.insert("only_builtin".into(), Value::Int(9));
        let mut arena = FrameArena::new(builtins);

        let module = arena.alloc(Frame::new(unit("pass\n"), None, Scope::new()));
        arena.store(module, "x", Value::Int(2));

        let mut locals = Scope::new();
        locals.insert("x".into(), Value::Int(1));
        let func = arena.alloc(Frame::new(function_unit(), Some(module), locals));

        assert_eq!(arena.lookup(func, "x"), Some(Value::Int(1)));
        assert_eq!(arena.lookup(module, "x"), Some(Value::Int(2)));
        assert_eq!(arena.lookup(func, "only_builtin"), Some(Value::Int(9)));
        assert_eq!(arena.lookup(func, "missing"), None);
    }

    #[test]
    fn test_module_store_goes_to_globals() {
        let mut arena = FrameArena::default();
        let module = arena.alloc(Frame::new(unit("pass\n"), None, Scope::new()));
        arena.store(module, "g", Value::Int(5));
        assert_eq!(arena.globals().get("g"), Some(&Value::Int(5)));
    }
}
