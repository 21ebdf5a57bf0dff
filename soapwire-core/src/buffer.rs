//! Growable byte buffer.
//!
//! The buffer is reused for every message on a session: outgoing requests are
//! accumulated in it, and after the send completes the same storage receives
//! the raw response header block. It only ever grows, always to a multiple of
//! [`BUFFER_GROWTH_STEP`].

use crate::error::CoreError;

/// Growth granularity of [`GrowableBuffer`].
pub const BUFFER_GROWTH_STEP: usize = 4096;

/// Round `value` up to the nearest multiple of `step`.
///
/// Returns `None` on overflow.
pub fn round_up(value: usize, step: usize) -> Option<usize> {
    match value % step {
        0 => Some(value),
        rem => value.checked_add(step - rem),
    }
}

/// A byte buffer that grows in [`BUFFER_GROWTH_STEP`] increments.
///
/// All `capacity()` bytes are initialized, so the whole allocation can be
/// handed to a network layer as an output slice.
#[derive(Debug, Default)]
pub struct GrowableBuffer {
    data: Vec<u8>,
}

impl GrowableBuffer {
    /// Create an empty buffer with zero capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer that can already hold `size` bytes.
    pub fn with_capacity(size: usize) -> Result<Self, CoreError> {
        let mut buffer = Self::new();
        if size > 0 {
            buffer.ensure(size)?;
        }
        Ok(buffer)
    }

    /// Current allocated size in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Guarantee `capacity() >= min_size`.
    ///
    /// When the buffer has to grow it is reallocated to
    /// `round_up(min_size, 4096)` bytes, preserving the existing content. If
    /// the allocation fails the buffer is reset to empty and
    /// [`CoreError::OutOfMemory`] is returned.
    pub fn ensure(&mut self, min_size: usize) -> Result<(), CoreError> {
        debug_assert!(min_size > 0, "ensure() called with a zero size");
        if self.data.len() >= min_size {
            return Ok(());
        }

        let Some(new_size) = round_up(min_size, BUFFER_GROWTH_STEP) else {
            self.data = Vec::new();
            return Err(CoreError::OutOfMemory {
                requested: min_size,
            });
        };

        let additional = new_size - self.data.len();
        if self.data.try_reserve_exact(additional).is_err() {
            self.data = Vec::new();
            return Err(CoreError::OutOfMemory {
                requested: new_size,
            });
        }
        self.data.resize(new_size, 0);
        Ok(())
    }

    /// Copy `bytes` into the buffer at `offset`, growing it as needed.
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<(), CoreError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let end = offset
            .checked_add(bytes.len())
            .ok_or(CoreError::OutOfMemory {
                requested: usize::MAX,
            })?;
        self.ensure(end)?;
        self.data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// The whole allocation.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// The whole allocation, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The first `len` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the capacity.
    pub fn prefix(&self, len: usize) -> &[u8] {
        &self.data[..len]
    }
}
