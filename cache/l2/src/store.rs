//! Per-shard bounded LRU row storage.
//!
//! A `RowStore` owns every row resident in one shard. Rows live in a slot
//! vector threaded onto an intrusive doubly linked LRU list:
//!
//! ```text
//! head (MRU) -> [slot 4] <-> [slot 0] <-> [slot 7] <- tail (LRU)
//! ```
//!
//! Capacity is accounted in row bytes only. Evicted slots go to a free list
//! and keep their buffers, so steady-state puts of same-width rows do not
//! allocate.

use std::collections::HashMap;

use ahash::RandomState;
use smallvec::SmallVec;

use crate::capture::EvictionCapture;
use crate::error::{CacheError, CacheResult};

/// Sentinel for "no slot" in LRU links.
const LRU_NONE: u32 = u32::MAX;

struct Slot {
    key: i64,
    row: Vec<u8>,
    /// Toward the head (more recently used).
    prev: u32,
    /// Toward the tail (less recently used).
    next: u32,
}

/// Bounded LRU store for a single shard.
pub struct RowStore {
    index: HashMap<i64, u32, RandomState>,
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: u32,
    tail: u32,
    capacity: usize,
    used: usize,
}

impl RowStore {
    /// Create an empty store holding at most `capacity` row bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            index: HashMap::with_hasher(RandomState::new()),
            slots: Vec::new(),
            free: Vec::new(),
            head: LRU_NONE,
            tail: LRU_NONE,
            capacity,
            used: 0,
        }
    }

    /// Capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Resident row bytes.
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    /// Bytes available before eviction is needed.
    #[inline]
    pub fn free(&self) -> usize {
        self.capacity - self.used
    }

    /// Number of resident rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if no rows are resident.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns true if `key` is resident. Does not touch recency.
    #[inline]
    pub fn contains(&self, key: i64) -> bool {
        self.index.contains_key(&key)
    }

    /// Look up a row and mark it most recently used.
    pub fn get(&mut self, key: i64) -> Option<&[u8]> {
        self.get_mut(key).map(|row| &*row)
    }

    /// Mutable form of [`get`](Self::get). Used by the cache to map a shard
    /// guard onto a single row.
    pub(crate) fn get_mut(&mut self, key: i64) -> Option<&mut [u8]> {
        let idx = *self.index.get(&key)?;
        self.touch(idx);
        Some(self.slots[idx as usize].row.as_mut_slice())
    }

    /// Look up a row without changing its recency.
    pub fn peek(&self, key: i64) -> Option<&[u8]> {
        let idx = *self.index.get(&key)?;
        Some(self.slots[idx as usize].row.as_slice())
    }

    /// Insert or replace a row, evicting from the LRU tail until it fits.
    ///
    /// When `capture` is set, every evicted row is appended to it before the
    /// new row is stored. The fit and capture room checks run before anything
    /// is evicted, so an error leaves the store unchanged.
    ///
    /// Returns the number of rows evicted.
    pub fn put(
        &mut self,
        key: i64,
        row: &[u8],
        capture: Option<&EvictionCapture>,
    ) -> CacheResult<usize> {
        if row.len() > self.capacity {
            return Err(CacheError::AllocationFailure);
        }

        let existing = self.index.get(&key).copied();
        let mut available = self.free();
        if let Some(idx) = existing {
            available += self.slots[idx as usize].row.len();
        }

        let mut victims: SmallVec<[u32; 8]> = SmallVec::new();
        let mut cursor = self.tail;
        while available < row.len() {
            if cursor == LRU_NONE {
                return Err(CacheError::AllocationFailure);
            }
            let slot = &self.slots[cursor as usize];
            if Some(cursor) != existing {
                available += slot.row.len();
                victims.push(cursor);
            }
            cursor = slot.prev;
        }

        if let Some(capture) = capture
            && !victims.is_empty()
        {
            let mut reservation = capture.reserve(victims.len())?;
            for &idx in &victims {
                let slot = &self.slots[idx as usize];
                reservation.write(slot.key, &slot.row);
                self.evict(idx);
            }
        } else {
            for &idx in &victims {
                self.evict(idx);
            }
        }

        match existing {
            Some(idx) => {
                let slot = &mut self.slots[idx as usize];
                self.used -= slot.row.len();
                slot.row.clear();
                slot.row.extend_from_slice(row);
                self.used += row.len();
                self.touch(idx);
            }
            None => {
                let idx = self.alloc_slot(key, row);
                self.index.insert(key, idx);
                self.push_head(idx);
                self.used += row.len();
            }
        }

        Ok(victims.len())
    }

    /// Key of the least recently used row.
    pub fn lru_key(&self) -> Option<i64> {
        (self.tail != LRU_NONE).then(|| self.slots[self.tail as usize].key)
    }

    fn alloc_slot(&mut self, key: i64, row: &[u8]) -> u32 {
        if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.key = key;
            slot.row.clear();
            slot.row.extend_from_slice(row);
            idx
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Slot {
                key,
                row: row.to_vec(),
                prev: LRU_NONE,
                next: LRU_NONE,
            });
            idx
        }
    }

    fn evict(&mut self, idx: u32) {
        self.unlink(idx);
        let slot = &mut self.slots[idx as usize];
        self.index.remove(&slot.key);
        self.used -= slot.row.len();
        slot.row.clear();
        self.free.push(idx);
    }

    fn touch(&mut self, idx: u32) {
        if self.head == idx {
            return;
        }
        self.unlink(idx);
        self.push_head(idx);
    }

    fn push_head(&mut self, idx: u32) {
        let old_head = self.head;
        {
            let slot = &mut self.slots[idx as usize];
            slot.prev = LRU_NONE;
            slot.next = old_head;
        }
        if old_head != LRU_NONE {
            self.slots[old_head as usize].prev = idx;
        } else {
            self.tail = idx;
        }
        self.head = idx;
    }

    fn unlink(&mut self, idx: u32) {
        let (prev, next) = {
            let slot = &self.slots[idx as usize];
            (slot.prev, slot.next)
        };

        if prev != LRU_NONE {
            self.slots[prev as usize].next = next;
        } else {
            self.head = next;
        }

        if next != LRU_NONE {
            self.slots[next as usize].prev = prev;
        } else {
            self.tail = prev;
        }

        let slot = &mut self.slots[idx as usize];
        slot.prev = LRU_NONE;
        slot.next = LRU_NONE;
    }

    /// Keys from most to least recently used.
    #[cfg(test)]
    fn recency(&self) -> Vec<i64> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while cursor != LRU_NONE {
            let slot = &self.slots[cursor as usize];
            keys.push(slot.key);
            cursor = slot.next;
        }
        keys
    }
}

impl std::fmt::Debug for RowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStore")
            .field("capacity", &self.capacity)
            .field("used", &self.used)
            .field("items", &self.len())
            .finish()
    }
}
