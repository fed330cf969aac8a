//! Device-facing transfer buffers.

use std::sync::Arc;

use crate::config::{TRANSFER_SIZE, UNIT_SIZE};
use crate::error::{Error, Result};
use crate::request::Direction;

/// Allocation capability the command layer depends on.
pub trait BufferAllocator: Send + Sync {
    /// Returns zero-filled memory of `size` bytes, or `None` when exhausted.
    fn alloc_zeroed(&self, size: usize) -> Option<Box<[u8]>>;

    /// Takes back memory handed out by [`alloc_zeroed`](Self::alloc_zeroed).
    fn free(&self, data: Box<[u8]>) {
        drop(data);
    }
}

static ZEROS: [u8; UNIT_SIZE] = [0; UNIT_SIZE];

/// Allocates from the global heap, failing instead of aborting.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl BufferAllocator for HeapAllocator {
    fn alloc_zeroed(&self, size: usize) -> Option<Box<[u8]>> {
        let mut data = Vec::new();
        data.try_reserve_exact(size).ok()?;
        while data.len() < size {
            let n = (size - data.len()).min(ZEROS.len());
            data.extend_from_slice(&ZEROS[..n]);
        }
        Some(data.into_boxed_slice())
    }
}

/// Staging memory owned by exactly one in-flight command.
///
/// Returned to its allocator on drop.
pub struct TransferBuffer {
    data: Box<[u8]>,
    allocator: Arc<dyn BufferAllocator>,
}

impl TransferBuffer {
    /// Allocates a zeroed buffer of [`TRANSFER_SIZE`] bytes.
    pub fn alloc(allocator: Arc<dyn BufferAllocator>) -> Result<Self> {
        let data = allocator
            .alloc_zeroed(TRANSFER_SIZE)
            .ok_or(Error::OutOfMemory(TRANSFER_SIZE))?;
        Ok(Self { data, allocator })
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// First transfer unit, the only part exchanged with the caller.
    pub fn first_unit(&self) -> &[u8] {
        &self.data[..UNIT_SIZE]
    }

    /// Pre-submission data movement: writes copy the caller page in.
    pub fn stage(&mut self, direction: Direction, payload: &[u8]) {
        if direction == Direction::Write {
            self.data[..UNIT_SIZE].copy_from_slice(&payload[..UNIT_SIZE]);
        }
    }

    /// Post-completion data movement: reads copy the first unit out.
    pub fn commit(&self, direction: Direction, payload: &mut [u8]) {
        if direction == Direction::Read {
            payload[..UNIT_SIZE].copy_from_slice(&self.data[..UNIT_SIZE]);
        }
    }

    /// Stores a little-endian 64-bit word at word `index`.
    pub fn write_word(&mut self, index: usize, value: u64) {
        let at = index * 8;
        self.data[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Loads the little-endian 64-bit word at word `index`.
    pub fn read_word(&self, index: usize) -> u64 {
        let at = index * 8;
        let mut word = [0u8; 8];
        word.copy_from_slice(&self.data[at..at + 8]);
        u64::from_le_bytes(word)
    }
}

impl Drop for TransferBuffer {
    fn drop(&mut self) {
        self.allocator.free(std::mem::take(&mut self.data));
    }
}

impl std::fmt::Debug for TransferBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferBuffer")
            .field("len", &self.data.len())
            .finish()
    }
}
