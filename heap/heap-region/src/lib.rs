//! # Heap Region Provider
//!
//! A heap region is a single contiguous byte range that only ever grows at
//! its high end. The allocator consumes it through the [`HeapRegion`] trait;
//! [`ArenaRegion`] is the default implementation, a fixed-capacity arena
//! reserved up front with a moving break.
//!
//! The region hands out raw addresses. It makes exactly three promises:
//!
//! - [`lo`](HeapRegion::lo) is stable and 8-aligned for the life of the
//!   region, so derived pointers never dangle.
//! - [`extend`](HeapRegion::extend) appends exactly `n` bytes and returns the
//!   address of the first new byte, which is always `hi + 1` of the previous
//!   state.
//! - The region never shrinks and never relocates.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod arena;

pub use arena::ArenaRegion;

/// A contiguous, monotonically-growable byte region.
///
/// Implementations own the backing storage; callers own the contents of every
/// byte handed out through [`extend`](Self::extend).
pub trait HeapRegion {
    /// Lowest valid address of the region.
    #[must_use]
    fn lo(&self) -> *mut u8;

    /// Highest valid address of the region (inclusive).
    ///
    /// One below [`lo`](Self::lo) while the region is still empty.
    #[must_use]
    fn hi(&self) -> *mut u8;

    /// Grow the region by exactly `n > 0` bytes at the high end.
    ///
    /// Returns the address of the first new byte. The new bytes directly
    /// follow the previous `hi`; alignment of the region end is preserved.
    ///
    /// # Errors
    /// [`OutOfMemory`] when the provider cannot supply `n` more bytes. The
    /// region is left unchanged in that case.
    fn extend(&mut self, n: usize) -> Result<*mut u8, OutOfMemory>;
}

/// The provider declined to grow the region.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("out of memory: {requested} bytes requested, {remaining} remaining")]
pub struct OutOfMemory {
    /// Bytes the caller asked for.
    pub requested: usize,
    /// Bytes the provider could still have supplied.
    pub remaining: usize,
}
