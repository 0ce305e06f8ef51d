//! Growable byte accumulator for not-yet-terminated packets.
//!
//! [`GrowableBuffer`] owns its storage and tracks a logical capacity that never
//! passes a fixed ceiling chosen at construction.  Growth is geometric, and a
//! failed growth never mutates the buffer, so callers can keep using the
//! existing bytes after an error.

use crate::error::ReserveError;

/// Smallest capacity the buffer grows to.
pub const MIN_CAPACITY: usize = 4096;

const GROWTH_FACTOR: usize = 2;

/// Resizable byte buffer with an explicit maximum capacity.
///
/// Invariant: `len() <= capacity() <= max_capacity()`.
#[derive(Debug)]
pub struct GrowableBuffer {
    data: Vec<u8>,
    capacity: usize,
    max_capacity: usize,
    /// Makes every growth fail as if the allocator had refused it.
    #[cfg(test)]
    growth_refused: bool,
}

impl GrowableBuffer {
    /// Allocate a buffer holding `initial` bytes of capacity.
    ///
    /// A zero `initial` means [`MIN_CAPACITY`]; either way the capacity is
    /// clamped to `max_capacity`.
    pub fn with_capacity(initial: usize, max_capacity: usize) -> Result<Self, ReserveError> {
        let initial = if initial == 0 { MIN_CAPACITY } else { initial };
        let capacity = initial.min(max_capacity);

        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| ReserveError::OutOfMemory { capacity })?;

        Ok(Self {
            data,
            capacity,
            max_capacity,
            #[cfg(test)]
            growth_refused: false,
        })
    }

    /// Ensure room for at least `need` bytes in total.
    ///
    /// The effective ceiling is the smaller of `max_cap` and the buffer's own
    /// maximum.  Asking for more than that is [`ReserveError::CapacityExceeded`];
    /// an allocator refusal is [`ReserveError::OutOfMemory`].  Existing bytes are
    /// preserved on success and nothing changes on failure.
    pub fn reserve(&mut self, need: usize, max_cap: usize) -> Result<(), ReserveError> {
        let ceiling = max_cap.min(self.max_capacity);
        if need > ceiling {
            return Err(ReserveError::CapacityExceeded { need, max: ceiling });
        }
        if self.capacity >= need {
            return Ok(());
        }

        let capacity = grown_capacity(self.capacity, need, ceiling);
        #[cfg(test)]
        if self.growth_refused {
            return Err(ReserveError::OutOfMemory { capacity });
        }
        self.data
            .try_reserve_exact(capacity - self.data.len())
            .map_err(|_| ReserveError::OutOfMemory { capacity })?;
        self.capacity = capacity;
        Ok(())
    }

    /// Append `bytes` into space already secured by [`reserve`](Self::reserve).
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        assert!(
            self.data.len() + bytes.len() <= self.capacity,
            "extend_from_slice requires reserved capacity"
        );
        self.data.extend_from_slice(bytes);
    }

    /// Forget the contents but keep the storage.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[cfg(test)]
    pub(crate) fn refuse_growth(&mut self) {
        self.growth_refused = true;
    }
}

/// Next capacity for a buffer that currently holds `current` and must hold
/// `need`, never above `ceiling` (callers guarantee `need <= ceiling`).
fn grown_capacity(current: usize, need: usize, ceiling: usize) -> usize {
    let mut capacity = current.max(MIN_CAPACITY);
    while capacity < need {
        match capacity.checked_mul(GROWTH_FACTOR) {
            Some(next) => capacity = next,
            None => {
                // Doubling would wrap; take exactly what was asked for.
                capacity = need;
                break;
            }
        }
    }
    capacity.min(ceiling)
}
