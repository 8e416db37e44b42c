// Reference-counted registry of runtime values.
// Independent of evaluation: values stay alive through their `Rc` holders;
// the tracker only records which ones a host has registered and how often.
use std::collections::BTreeMap;

use tracing::trace;

use crate::core::value::Value;

#[derive(Debug)]
struct Allocation {
    value: Value,
    refs: usize,
}

#[derive(Debug)]
pub struct MemoryTracker {
    allocations: BTreeMap<usize, Allocation>,
    next_id: usize,
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self { allocations: BTreeMap::new(), next_id: 1 }
    }
}

impl MemoryTracker {
    pub fn new() -> Self { Self::default() }

    /// Register `value` with a reference count of 1. Ids start at 1 and are never reused.
    pub fn allocate(&mut self, value: Value) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        trace!(id, kind = %value.type_name(), "allocate");
        self.allocations.insert(id, Allocation { value, refs: 1 });
        id
    }

    /// Returns false for unknown ids.
    pub fn retain(&mut self, id: usize) -> bool {
        match self.allocations.get_mut(&id) {
            Some(a) => { a.refs += 1; true }
            None => false,
        }
    }

    /// Decrement the count; true when this release freed the value.
    pub fn release(&mut self, id: usize) -> bool {
        let Some(a) = self.allocations.get_mut(&id) else { return false };
        a.refs -= 1;
        if a.refs == 0 {
            self.allocations.remove(&id);
            trace!(id, "freed");
            return true;
        }
        false
    }

    pub fn get(&self, id: usize) -> Option<&Value> {
        self.allocations.get(&id).map(|a| &a.value)
    }

    pub fn ref_count(&self, id: usize) -> Option<usize> {
        self.allocations.get(&id).map(|a| a.refs)
    }

    /// Drop regardless of count; true if it existed.
    pub fn free(&mut self, id: usize) -> bool {
        self.allocations.remove(&id).is_some()
    }

    pub fn count(&self) -> usize { self.allocations.len() }

    /// Live `(id, value)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Value)> {
        self.allocations.iter().map(|(id, a)| (*id, &a.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_frees_at_zero() {
        let mut mem = MemoryTracker::new();
        let id = mem.allocate(Value::Int(1));
        assert!(mem.retain(id));
        assert!(!mem.release(id));
        assert_eq!(mem.ref_count(id), Some(1));
        assert!(mem.release(id));
        assert!(mem.get(id).is_none());
        assert_eq!(mem.count(), 0);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut mem = MemoryTracker::new();
        assert!(!mem.retain(42));
        assert!(!mem.release(42));
        assert!(!mem.free(42));
        assert!(mem.get(42).is_none());
    }

    #[test]
    fn ids_are_unique_and_iteration_is_ordered() {
        let mut mem = MemoryTracker::new();
        let a = mem.allocate(Value::from("a"));
        let b = mem.allocate(Value::from("b"));
        assert_ne!(a, b);
        assert!(mem.free(a));
        let c = mem.allocate(Value::from("c"));
        assert!(c > b);
        let ids: Vec<usize> = mem.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![b, c]);
    }
}
