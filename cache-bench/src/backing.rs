//! Simulated backing tier.
//!
//! Holds every row that has been forwarded from the cache. Rows that were
//! never written are synthesized from their id, standing in for the
//! initial embedding table.

use ahash::AHashMap;
use l2_cache::EvictedRows;
use parking_lot::RwLock;

pub struct BackingTier {
    rows: RwLock<AHashMap<i64, Vec<u8>>>,
    row_bytes: usize,
}

impl BackingTier {
    pub fn new(row_bytes: usize) -> Self {
        Self {
            rows: RwLock::new(AHashMap::new()),
            row_bytes,
        }
    }

    /// Copy the row for `key` into `buf`.
    pub fn fetch(&self, key: i64, buf: &mut Vec<u8>) {
        buf.clear();
        if let Some(row) = self.rows.read().get(&key) {
            buf.extend_from_slice(row);
            return;
        }
        let seed = key.to_le_bytes();
        buf.extend((0..self.row_bytes).map(|i| seed[i % 8].wrapping_add(i as u8)));
    }

    /// Store forwarded rows, replacing older versions. Returns the number of
    /// rows absorbed.
    pub fn absorb(&self, evicted: &EvictedRows) -> usize {
        let mut rows = self.rows.write();
        for (key, row) in evicted.iter() {
            match rows.get_mut(&key) {
                Some(existing) => {
                    existing.clear();
                    existing.extend_from_slice(row);
                }
                None => {
                    rows.insert(key, row.to_vec());
                }
            }
        }
        evicted.len()
    }

    /// Rows written back so far.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }
}
