//! Payload ring - contiguous storage sliced into equal-size slots
//!
//! A single cursor selects the next write slot and wraps modulo the slot
//! count. The ring keeps only the most recent `slot_count` payloads: a slot
//! whose record is still queued is overwritten once the cursor comes back
//! around, and the worker then reads the newer payload.

use std::fmt;

use crate::error::DispatchError;

pub struct PayloadRing {
    storage: Box<[u8]>,
    element_size: usize,
    slot_count: usize,
    /// Next slot to write, always in `[0, slot_count)`
    cursor: usize,
    /// Total accepted writes
    writes: u64,
}

impl fmt::Debug for PayloadRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadRing")
            .field("slot_count", &self.slot_count)
            .field("element_size", &self.element_size)
            .field("cursor", &self.cursor)
            .field("writes", &self.writes)
            .finish()
    }
}

impl PayloadRing {
    /// Allocate `slot_count * element_size` zeroed bytes
    pub fn new(slot_count: usize, element_size: usize) -> Result<Self, DispatchError> {
        if slot_count == 0 {
            return Err(DispatchError::InvalidArgument("ring capacity must be > 0"));
        }
        if element_size == 0 {
            return Err(DispatchError::InvalidArgument("element size must be > 0"));
        }
        let total = slot_count
            .checked_mul(element_size)
            .ok_or(DispatchError::InvalidArgument("ring size overflows usize"))?;

        Ok(Self {
            storage: vec![0u8; total].into_boxed_slice(),
            element_size,
            slot_count,
            cursor: 0,
            writes: 0,
        })
    }

    #[inline]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Slot the next write will land in
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Slot holding the most recent payload, if anything was written
    pub fn last_written(&self) -> Option<usize> {
        (self.writes > 0).then(|| (self.cursor + self.slot_count - 1) % self.slot_count)
    }

    /// Reject payloads that are not exactly one element long
    #[inline]
    pub fn check_payload(&self, value: &[u8]) -> Result<(), DispatchError> {
        if value.len() != self.element_size {
            return Err(DispatchError::PayloadSize {
                expected: self.element_size,
                actual: value.len(),
            });
        }
        Ok(())
    }

    /// Copy `value` into the cursor slot, advance the cursor, return the slot
    pub fn write(&mut self, value: &[u8]) -> Result<usize, DispatchError> {
        self.check_payload(value)?;
        let slot = self.cursor;
        let start = slot * self.element_size;
        self.storage[start..start + self.element_size].copy_from_slice(value);

        self.cursor = (self.cursor + 1) % self.slot_count;
        self.writes += 1;
        Ok(slot)
    }

    /// Borrow one slot's bytes
    pub fn slot(&self, index: usize) -> Option<&[u8]> {
        if index >= self.slot_count {
            return None;
        }
        let start = index * self.element_size;
        Some(&self.storage[start..start + self.element_size])
    }

    /// Copy one slot into `out` (whole element)
    pub fn read_at(&self, index: usize, out: &mut [u8]) -> Result<(), DispatchError> {
        self.check_payload(out)?;
        let bytes = self.slot(index).ok_or(DispatchError::IndexOutOfRange {
            index,
            capacity: self.slot_count,
        })?;
        out.copy_from_slice(bytes);
        Ok(())
    }
}
