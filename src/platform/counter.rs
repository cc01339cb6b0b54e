//! Upstream block counter source

use std::cell::Cell;
use std::rc::Rc;

/// Reports the most recent value of the external block counter.
///
/// `None` means no value is available yet (or the upstream is unreachable);
/// the engine treats that as "no progress this frame".
pub trait CounterSource {
    fn latest(&self) -> Option<u64>;
}

/// A push-fed counter: the host writes, the engine reads.
///
/// Clones share the same slot, so a DOM listener can hold one handle and
/// the engine another.
#[derive(Debug, Clone, Default)]
pub struct SharedCounter {
    value: Rc<Cell<Option<u64>>>,
}

impl SharedCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value reported by the upstream (no ordering enforced here)
    pub fn push(&self, value: u64) {
        self.value.set(Some(value));
    }

    /// Mark the upstream as unavailable
    pub fn clear(&self) {
        self.value.set(None);
    }
}

impl CounterSource for SharedCounter {
    fn latest(&self) -> Option<u64> {
        self.value.get()
    }
}

impl<C: CounterSource + ?Sized> CounterSource for Rc<C> {
    fn latest(&self) -> Option<u64> {
        (**self).latest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_counter_clones_share_slot() {
        let writer = SharedCounter::new();
        let reader = writer.clone();
        assert_eq!(reader.latest(), None);

        writer.push(1000);
        assert_eq!(reader.latest(), Some(1000));

        writer.clear();
        assert_eq!(reader.latest(), None);
    }
}
