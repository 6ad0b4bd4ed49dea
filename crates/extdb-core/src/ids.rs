//! Request id allocation.
//!
//! Ids are dense non-negative integers: `allocate` hands out the smallest
//! currently free id, `free` returns it for reuse once the paged result is
//! fully drained. Every id below the high-water mark is either live or in
//! the free set, so liveness is a set lookup.

use std::collections::BTreeSet;

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct IdState {
    next: u32,
    free: BTreeSet<u32>,
}

/// Thread-safe allocator of recyclable request ids.
#[derive(Debug, Default)]
pub struct IdAllocator {
    state: Mutex<IdState>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest currently free id.
    pub fn allocate(&self) -> u32 {
        let mut state = self.state.lock();
        if let Some(id) = state.free.pop_first() {
            return id;
        }
        let id = state.next;
        state.next += 1;
        id
    }

    /// Return an id to the free set. A no-op unless `id` is live.
    pub fn free(&self, id: u32) {
        let mut state = self.state.lock();
        if id >= state.next {
            return;
        }
        state.free.insert(id);
    }

    /// Number of ids currently live.
    pub fn live(&self) -> usize {
        let state = self.state.lock();
        state.next as usize - state.free.len()
    }
}
