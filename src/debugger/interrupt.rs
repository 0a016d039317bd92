use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Value stored by [`InterruptCell::signal`], matching SIGINT.
pub const SIGINT: i32 = 2;

/// Shared cooperative-cancellation flag. Zero means clear.
///
/// Level-triggered: once signalled it stays set until the controller clears
/// it before the next run. Readers never clear it.
#[derive(Debug, Clone, Default)]
pub struct InterruptCell(Arc<AtomicI32>);

impl InterruptCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        self.signal_with(SIGINT);
    }

    pub fn signal_with(&self, code: i32) {
        self.0.store(code, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(0, Ordering::SeqCst);
    }

    pub fn value(&self) -> i32 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_set(&self) -> bool {
        self.value() != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_is_sticky_until_cleared() {
        let cell = InterruptCell::new();
        assert!(!cell.is_set());
        let shared = cell.clone();
        shared.signal();
        assert!(cell.is_set());
        assert!(cell.is_set());
        assert_eq!(cell.value(), SIGINT);
        cell.clear();
        assert!(!shared.is_set());
    }

    #[test]
    fn test_any_nonzero_value_counts() {
        let cell = InterruptCell::new();
        cell.signal_with(-1);
        assert!(cell.is_set());
    }
}
