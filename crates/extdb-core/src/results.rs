//! Result store and paging.
//!
//! Oversized or deferred results are parked here keyed by request id and
//! drained chunk by chunk through `5:<id>` polls:
//!
//! 1. `begin` marks the id pending, before the worker can possibly run
//! 2. `complete` swaps in the enveloped payload (`fail` swaps in an error)
//! 3. each `fetch` hands back up to `out_cap - 9` head bytes
//! 4. the fetch after the tail empties returns `""` and frees the id
//!
//! The 9-byte reserve keeps room for the framing the host side adds around
//! a chunk; it is part of the wire contract and never changes.
//!
//! One mutex guards the whole map. Entries are small (a state tag and the
//! remaining tail), critical sections are a lookup and a splice.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::ids::IdAllocator;
use crate::wire;

/// Reserved envelope allowance per chunk.
pub const CHUNK_RESERVE: usize = 9;

#[derive(Debug)]
enum ResultEntry {
    /// Work is in flight; polls answer `[3]`
    Pending,
    /// Remaining tail; empty means drained, next poll answers `""` and frees
    Ready(String),
}

/// Thread-safe map of request id to pending/partial result.
#[derive(Debug)]
pub struct ResultStore {
    entries: Mutex<HashMap<u32, ResultEntry>>,
    ids: Arc<IdAllocator>,
}

impl ResultStore {
    pub fn new(ids: Arc<IdAllocator>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ids,
        }
    }

    /// Mark `id` pending. The id must not already be present.
    pub fn begin(&self, id: u32) {
        let mut entries = self.entries.lock();
        debug_assert!(!entries.contains_key(&id), "begin on live id {}", id);
        entries.insert(id, ResultEntry::Pending);
    }

    /// Store the enveloped payload for `id`, replacing a pending marker.
    ///
    /// Also accepted without a prior `begin`: the synchronous overflow path
    /// stores directly, and a poll racing it sees "nothing to fetch" rather
    /// than `[3]`.
    pub fn complete(&self, id: u32, payload: &str) {
        let mut entries = self.entries.lock();
        entries.insert(id, ResultEntry::Ready(wire::stored(payload)));
    }

    /// Store an error envelope for `id` so the poller gets a terminal
    /// answer instead of `[3]` forever.
    pub fn fail(&self, id: u32, message: &str) {
        let mut entries = self.entries.lock();
        entries.insert(id, ResultEntry::Ready(wire::error(message)));
    }

    /// Whether `id` is pending (work in flight, no bytes yet).
    pub fn is_pending(&self, id: u32) -> bool {
        matches!(self.entries.lock().get(&id), Some(ResultEntry::Pending))
    }

    /// Number of live entries. Test hook.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Produce the next chunk for `id` into a buffer of capacity `out_cap`.
    ///
    /// Absent id: `""`. Pending: `[3]`. Otherwise up to `out_cap - 9` bytes
    /// of the head; the drained entry is removed and the id freed on the
    /// following call.
    pub fn fetch(&self, id: u32, out_cap: usize) -> String {
        let mut free_id = false;
        let chunk = {
            let mut entries = self.entries.lock();
            match entries.get_mut(&id) {
                None => String::new(),
                Some(ResultEntry::Pending) => wire::PENDING.to_string(),
                Some(ResultEntry::Ready(tail)) => {
                    if tail.is_empty() {
                        entries.remove(&id);
                        free_id = true;
                        String::new()
                    } else {
                        let budget = out_cap.saturating_sub(CHUNK_RESERVE);
                        split_head(tail, budget)
                    }
                }
            }
        };
        // the id lock comes after the map lock in the global order, so the
        // map lock is released first
        if free_id {
            self.ids.free(id);
        }
        chunk
    }
}

/// Take up to `budget` bytes off the front of `tail`, never splitting a
/// UTF-8 sequence.
fn split_head(tail: &mut String, budget: usize) -> String {
    let mut cut = budget.min(tail.len());
    while cut > 0 && !tail.is_char_boundary(cut) {
        cut -= 1;
    }
    let rest = tail.split_off(cut);
    std::mem::replace(tail, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ResultStore {
        ResultStore::new(Arc::new(IdAllocator::new()))
    }

    #[test]
    fn test_absent_id_fetches_empty() {
        let s = store();
        assert_eq!(s.fetch(0, 80), "");
    }

    #[test]
    fn test_pending_then_ready() {
        let s = store();
        s.begin(4);
        assert!(s.is_pending(4));
        assert_eq!(s.fetch(4, 80), "[3]");
        s.complete(4, "hi");
        assert!(!s.is_pending(4));
        assert_eq!(s.fetch(4, 80), "[1,hi]");
        assert_eq!(s.fetch(4, 80), "");
        // drained and gone
        assert_eq!(s.fetch(4, 80), "");
        assert!(s.is_empty());
    }

    #[test]
    fn test_chunks_respect_reserve() {
        let s = store();
        let payload = "a".repeat(200);
        s.complete(0, &payload);
        let mut assembled = String::new();
        loop {
            let chunk = s.fetch(0, 80);
            if chunk.is_empty() {
                break;
            }
            assert!(chunk.len() <= 80 - CHUNK_RESERVE);
            assembled.push_str(&chunk);
        }
        assert_eq!(assembled, format!("[1,{}]", payload));
    }

    #[test]
    fn test_id_freed_after_drain() {
        let ids = Arc::new(IdAllocator::new());
        let s = ResultStore::new(ids.clone());
        let id = ids.allocate();
        s.begin(id);
        s.complete(id, "data");
        assert_eq!(ids.live(), 1);
        while !s.fetch(id, 80).is_empty() {}
        assert_eq!(ids.live(), 0);
        // the id is reallocatable
        assert_eq!(ids.allocate(), id);
    }

    #[test]
    fn test_fail_stores_error_envelope() {
        let s = store();
        s.begin(1);
        s.fail(1, "Error");
        assert_eq!(s.fetch(1, 80), "[0,\"Error\"]");
        assert_eq!(s.fetch(1, 80), "");
    }

    #[test]
    fn test_split_never_breaks_utf8() {
        let s = store();
        // multibyte characters straddling the chunk boundary
        s.complete(0, &"é".repeat(50));
        let mut assembled = String::new();
        loop {
            let chunk = s.fetch(0, 16);
            if chunk.is_empty() {
                break;
            }
            assert!(chunk.len() <= 16 - CHUNK_RESERVE);
            assembled.push_str(&chunk);
        }
        assert_eq!(assembled, format!("[1,{}]", "é".repeat(50)));
    }

    #[test]
    fn test_tiny_buffer_makes_no_progress_budget_zero() {
        let s = store();
        s.complete(0, "abc");
        // capacity at or below the reserve yields empty chunks but must not
        // lose data or free the id
        assert_eq!(s.fetch(0, CHUNK_RESERVE), "");
        assert_eq!(s.fetch(0, 80), "[1,abc]");
    }
}
