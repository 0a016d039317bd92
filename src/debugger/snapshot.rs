use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::DebugError;
use crate::runtime::{lock, CompiledUnit, FrameId, FrameRef, Instruction, SharedArena, Value};

/// One line of a call stack view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEntry {
    pub function: String,
    pub filename: String,
    pub line: u32,
}

/// Pinned handle to the frame that was active at a pause.
///
/// Identity (unit, offset, line) is copied at capture time. Bindings are
/// read through the arena, guarded by a liveness check. The pin is dropped by
/// [`FrameSnapshot::release`] or when the last clone goes away, whichever
/// comes first.
#[derive(Clone)]
pub struct FrameSnapshot {
    inner: Arc<Inner>,
}

struct Inner {
    id: FrameId,
    arena: SharedArena,
    unit: Arc<CompiledUnit>,
    lasti: usize,
    line: u32,
    released: AtomicBool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            lock(&self.arena).unpin(self.id);
        }
    }
}

impl FrameSnapshot {
    pub fn capture(frame: &FrameRef<'_>) -> Result<Self, DebugError> {
        if !lock(frame.arena).pin(frame.id) {
            return Err(DebugError::StaleFrame);
        }
        Ok(Self {
            inner: Arc::new(Inner {
                id: frame.id,
                arena: frame.arena.clone(),
                unit: frame.unit.clone(),
                lasti: frame.lasti,
                line: frame.line,
                released: AtomicBool::new(false),
            }),
        })
    }

    pub fn frame_id(&self) -> FrameId {
        self.inner.id
    }

    pub fn unit(&self) -> &Arc<CompiledUnit> {
        &self.inner.unit
    }

    pub fn filename(&self) -> &str {
        &self.inner.unit.filename
    }

    pub fn function(&self) -> &str {
        &self.inner.unit.name
    }

    pub fn lasti(&self) -> usize {
        self.inner.lasti
    }

    pub fn line(&self) -> u32 {
        self.inner.line
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Drop the pin. Safe to call more than once and from any clone.
    pub fn release(&self) {
        if !self.inner.released.swap(true, Ordering::SeqCst) {
            lock(&self.inner.arena).unpin(self.inner.id);
        }
    }

    fn check(&self) -> Result<(), DebugError> {
        if self.is_released() {
            return Err(DebugError::SnapshotReleased);
        }
        Ok(())
    }

    pub fn current_instruction(&self) -> Result<Instruction, DebugError> {
        self.check()?;
        self.inner
            .unit
            .instruction_at(self.inner.lasti)
            .ok_or(DebugError::StaleFrame)
    }

    /// Resolve through local, global, then builtin scope.
    pub fn lookup(&self, name: &str) -> Result<Option<Value>, DebugError> {
        self.check()?;
        let arena = lock(&self.inner.arena);
        if !arena.is_live(self.inner.id) {
            return Err(DebugError::StaleFrame);
        }
        Ok(arena.lookup(self.inner.id, name))
    }

    pub fn locals(&self) -> Result<Vec<(String, Value)>, DebugError> {
        self.check()?;
        let arena = lock(&self.inner.arena);
        let scope = arena.locals(self.inner.id).ok_or(DebugError::StaleFrame)?;
        Ok(scope.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    pub fn globals(&self) -> Result<Vec<(String, Value)>, DebugError> {
        self.check()?;
        let arena = lock(&self.inner.arena);
        if !arena.is_live(self.inner.id) {
            return Err(DebugError::StaleFrame);
        }
        Ok(arena
            .globals()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Call stack from the paused frame outwards.
    pub fn stack(&self) -> Result<Vec<StackEntry>, DebugError> {
        self.check()?;
        let arena = lock(&self.inner.arena);
        if !arena.is_live(self.inner.id) {
            return Err(DebugError::StaleFrame);
        }
        let mut entries = vec![StackEntry {
            function: self.inner.unit.name.clone(),
            filename: self.inner.unit.filename.clone(),
            line: self.inner.line,
        }];
        let mut next = arena.get(self.inner.id).and_then(|f| f.parent);
        while let Some(id) = next {
            let Some(frame) = arena.get(id) else {
                break;
            };
            entries.push(StackEntry {
                function: frame.unit.name.clone(),
                filename: frame.unit.filename.clone(),
                line: frame.line,
            });
            next = frame.parent;
        }
        Ok(entries)
    }
}

impl fmt::Debug for FrameSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSnapshot")
            .field("id", &self.inner.id)
            .field("file", &self.inner.unit.filename)
            .field("function", &self.inner.unit.name)
            .field("lasti", &self.inner.lasti)
            .field("line", &self.inner.line)
            .field("released", &self.is_released())
            .finish()
    }
}
