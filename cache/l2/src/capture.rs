//! Eviction capture buffers.
//!
//! An [`EvictionCapture`] is bound to the cache for one collection cycle.
//! Every eviction performed by any shard during the cycle appends the
//! evicted key and row bytes here so the caller can forward them to the
//! backing tier.
//!
//! # Layout
//!
//! ```text
//! keys: [ k0 | k1 | k2 | -1 | -1 | ... ]            capacity entries
//! rows: [ row0 bytes | row1 bytes | row2 bytes | ... ] capacity * stride bytes
//!                                   ^
//!                                   cursor = 3
//! ```
//!
//! Rows are written at the capture stride. A victim shorter than the stride
//! is zero padded and a longer one is truncated, so a resident row of any
//! length can always be evicted.
//!
//! # Concurrency
//!
//! Shards evict concurrently under their own locks, so slots are handed out
//! through a single atomic cursor. A [`CaptureReservation`] owns a disjoint
//! range of slots and is the only writer for them. Reading the buffers
//! ([`EvictionCapture::snapshot`]) and resetting them require `&mut self`,
//! which the cache obtains by taking the write side of the lock guarding the
//! bound capture.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use crate::element::ElementType;
use crate::error::{CacheError, CacheResult};
use crate::metrics::CAPTURE_WIDTH_MISMATCH;

/// Key value for slots that have not been written this cycle.
pub const EMPTY_KEY: i64 = -1;

/// Fixed-size output buffers for rows evicted during one cycle.
pub struct EvictionCapture {
    /// Evicted keys, `EMPTY_KEY` where unwritten.
    keys: Box<[AtomicI64]>,
    /// Evicted row bytes, `stride` bytes per slot.
    rows: Box<UnsafeCell<[u8]>>,
    /// Elements per row.
    row_width: usize,
    /// Bytes per row (`row_width * element.size()`).
    stride: usize,
    element: ElementType,
    /// Next free slot.
    cursor: AtomicUsize,
}

// SAFETY: Row bytes are only written through a `CaptureReservation`, which
// owns a slot range no other reservation can obtain (the cursor hands out
// each index once). Reads of row bytes require `&mut self`.
unsafe impl Sync for EvictionCapture {}

impl EvictionCapture {
    /// Allocate buffers for up to `max_evictions` rows of `row_width`
    /// elements of type `element`.
    ///
    /// Sizes that overflow either buffer are rejected with `InvalidRowWidth`;
    /// an allocator refusal is reported as `AllocationFailure`.
    pub fn new(max_evictions: usize, row_width: usize, element: ElementType) -> CacheResult<Self> {
        if row_width == 0 {
            return Err(CacheError::InvalidRowWidth);
        }
        let stride = element
            .row_bytes(row_width)
            .ok_or(CacheError::InvalidRowWidth)?;
        let total = stride
            .checked_mul(max_evictions)
            .filter(|&bytes| bytes <= isize::MAX as usize)
            .ok_or(CacheError::InvalidRowWidth)?;
        max_evictions
            .checked_mul(size_of::<AtomicI64>())
            .filter(|&bytes| bytes <= isize::MAX as usize)
            .ok_or(CacheError::InvalidRowWidth)?;

        let mut keys: Vec<AtomicI64> = Vec::new();
        keys.try_reserve_exact(max_evictions)
            .map_err(|_| CacheError::AllocationFailure)?;
        keys.extend((0..max_evictions).map(|_| AtomicI64::new(EMPTY_KEY)));

        let mut rows: Vec<u8> = Vec::new();
        rows.try_reserve_exact(total)
            .map_err(|_| CacheError::AllocationFailure)?;
        rows.resize(total, 0);
        let rows = Box::into_raw(rows.into_boxed_slice()) as *mut UnsafeCell<[u8]>;
        // SAFETY: `UnsafeCell<[u8]>` is `repr(transparent)` over `[u8]`, so
        // the pointer and its slice metadata describe the same allocation.
        let rows = unsafe { Box::from_raw(rows) };

        Ok(Self {
            keys: keys.into_boxed_slice(),
            rows,
            row_width,
            stride,
            element,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Maximum number of rows this capture can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.keys.len()
    }

    /// Number of slots written (or reserved) so far this cycle.
    #[inline]
    pub fn len(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Returns true if nothing has been captured this cycle.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots still available this cycle.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Elements per captured row.
    #[inline]
    pub fn row_width(&self) -> usize {
        self.row_width
    }

    /// Bytes per captured row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Element type of captured rows.
    #[inline]
    pub fn element(&self) -> ElementType {
        self.element
    }

    /// Reserve `count` consecutive slots.
    ///
    /// The cursor only advances if every reserved slot is in bounds, so a
    /// failed reservation leaves the capture unchanged.
    pub fn reserve(&self, count: usize) -> CacheResult<CaptureReservation<'_>> {
        let capacity = self.capacity();
        let start = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                cursor.checked_add(count).filter(|&end| end <= capacity)
            })
            .map_err(|_| CacheError::CaptureOverflow)?;

        Ok(CaptureReservation {
            capture: self,
            next: start,
            end: start + count,
        })
    }

    /// Rewind the cursor and clear all keys back to `EMPTY_KEY`.
    pub fn reset(&mut self) {
        *self.cursor.get_mut() = 0;
        for key in self.keys.iter_mut() {
            *key.get_mut() = EMPTY_KEY;
        }
    }

    /// Copy out the rows captured so far.
    ///
    /// Only the written prefix of each buffer is copied.
    pub fn snapshot(&mut self) -> EvictedRows {
        let len = (*self.cursor.get_mut()).min(self.keys.len());
        let keys = self.keys[..len]
            .iter_mut()
            .map(|key| *key.get_mut())
            .collect();
        let rows = self.rows.get_mut()[..len * self.stride].to_vec();

        EvictedRows {
            keys,
            rows,
            capacity: self.keys.len(),
            row_width: self.row_width,
            stride: self.stride,
            element: self.element,
        }
    }

    /// Write one row into a slot owned by a reservation. Returns false if the
    /// row had to be padded or truncated to the stride.
    fn write_slot(&self, slot: usize, key: i64, row: &[u8]) -> bool {
        assert!(slot < self.capacity(), "capture slot out of bounds");

        self.keys[slot].store(key, Ordering::Relaxed);

        let copied = row.len().min(self.stride);
        let offset = slot * self.stride;
        // SAFETY: `slot < capacity` so `offset + stride` is within the
        // `capacity * stride` byte buffer, and the slot belongs to exactly one
        // reservation, so no other thread touches this range.
        unsafe {
            let dst = self.rows.get().cast::<u8>().add(offset);
            std::ptr::copy_nonoverlapping(row.as_ptr(), dst, copied);
            std::ptr::write_bytes(dst.add(copied), 0, self.stride - copied);
        }

        row.len() == self.stride
    }
}

impl std::fmt::Debug for EvictionCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvictionCapture")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("row_width", &self.row_width)
            .field("element", &self.element)
            .finish()
    }
}

/// A range of capture slots reserved by a single eviction pass.
pub struct CaptureReservation<'a> {
    capture: &'a EvictionCapture,
    next: usize,
    end: usize,
}

impl CaptureReservation<'_> {
    /// Append an evicted row to the next reserved slot.
    ///
    /// # Panics
    ///
    /// Panics if more rows are written than were reserved.
    pub fn write(&mut self, key: i64, row: &[u8]) {
        assert!(self.next < self.end, "capture reservation exhausted");
        if !self.capture.write_slot(self.next, key, row) {
            CAPTURE_WIDTH_MISMATCH.increment();
            tracing::warn!(
                key,
                len = row.len(),
                stride = self.capture.stride,
                "Captured row resized to stride"
            );
        }
        self.next += 1;
    }

    /// Slots reserved but not yet written.
    pub fn remaining(&self) -> usize {
        self.end - self.next
    }
}

/// Rows evicted during a cycle, copied out of an [`EvictionCapture`].
///
/// Holds only the written slots. [`into_padded`](Self::into_padded) expands
/// them back to the full capture layout for callers that forward fixed-size
/// tensors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictedRows {
    keys: Vec<i64>,
    rows: Vec<u8>,
    capacity: usize,
    row_width: usize,
    stride: usize,
    element: ElementType,
}

impl EvictedRows {
    /// Number of valid evicted rows.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no rows were evicted.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Capacity of the capture the rows came from, in rows.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Elements per row.
    pub fn row_width(&self) -> usize {
        self.row_width
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Element type of the rows.
    pub fn element(&self) -> ElementType {
        self.element
    }

    /// Keys of the valid evicted rows, in eviction order.
    pub fn keys(&self) -> &[i64] {
        &self.keys
    }

    /// Bytes of the valid evicted rows, concatenated.
    pub fn rows(&self) -> &[u8] {
        &self.rows
    }

    /// Bytes of the `index`-th evicted row.
    pub fn row(&self, index: usize) -> Option<&[u8]> {
        if index < self.len() {
            let offset = index * self.stride;
            Some(&self.rows[offset..offset + self.stride])
        } else {
            None
        }
    }

    /// Iterate over `(key, row)` pairs in eviction order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &[u8])> + '_ {
        self.keys().iter().copied().zip(self.rows().chunks_exact(self.stride))
    }

    /// Consume into the valid keys and row bytes.
    pub fn into_parts(self) -> (Vec<i64>, Vec<u8>) {
        (self.keys, self.rows)
    }

    /// Consume into buffers of the full capture size. Unwritten slots hold
    /// `EMPTY_KEY` and zeroed row bytes.
    pub fn into_padded(self) -> (Vec<i64>, Vec<u8>) {
        let (mut keys, mut rows) = (self.keys, self.rows);
        keys.resize(self.capacity, EMPTY_KEY);
        rows.resize(self.capacity * self.stride, 0);
        (keys, rows)
    }
}
