//! Fixed-capacity arena with a moving break.

use crate::{HeapRegion, OutOfMemory};
use alloc::boxed::Box;
use alloc::vec;
use log::debug;

/// Default arena capacity when none is given.
const DEFAULT_CAPACITY: usize = 1024 * 1024;

/// A heap region backed by a reservation made once at construction.
///
/// The full capacity is reserved up front as `u64` words, so [`lo`] is
/// 8-aligned and never moves; [`extend`] merely advances the break within the
/// reservation. Exhausting the reservation is the out-of-memory condition,
/// which makes a small arena the natural way to provoke allocation failure in
/// tests.
///
/// [`lo`]: HeapRegion::lo
/// [`extend`]: HeapRegion::extend
pub struct ArenaRegion {
    /// Owns the arena words; all byte access goes through `base`.
    storage: Box<[u64]>,
    /// First byte of the reservation, captured once so that pointers derived
    /// from it stay valid across `extend` calls.
    base: *mut u8,
    /// Bytes handed out so far.
    brk: usize,
}

impl ArenaRegion {
    /// Arena with the default capacity of 1 MiB.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Arena holding at least `bytes` (rounded up to a whole word).
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        let words = bytes.div_ceil(size_of::<u64>()).max(1);
        let mut storage = vec![0_u64; words].into_boxed_slice();
        let base = storage.as_mut_ptr().cast::<u8>();
        Self {
            storage,
            base,
            brk: 0,
        }
    }

    /// Total bytes the arena can ever hand out.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len() * size_of::<u64>()
    }

    /// Bytes handed out so far.
    #[must_use]
    pub const fn used(&self) -> usize {
        self.brk
    }
}

impl Default for ArenaRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapRegion for ArenaRegion {
    fn lo(&self) -> *mut u8 {
        self.base
    }

    fn hi(&self) -> *mut u8 {
        self.base.wrapping_add(self.brk).wrapping_sub(1)
    }

    fn extend(&mut self, n: usize) -> Result<*mut u8, OutOfMemory> {
        debug_assert!(n > 0);
        let remaining = self.capacity() - self.brk;
        if n > remaining {
            debug!("arena exhausted: {n} bytes requested, {remaining} remaining");
            return Err(OutOfMemory {
                requested: n,
                remaining,
            });
        }
        // SAFETY: brk + n <= capacity, so the result stays inside the reservation.
        let first_new = unsafe { self.base.add(self.brk) };
        self.brk += n;
        Ok(first_new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lo_is_aligned_and_stable() {
        let mut arena = ArenaRegion::with_capacity(64);
        let lo = arena.lo();
        assert_eq!(lo as usize % 8, 0);
        arena.extend(16).unwrap();
        arena.extend(8).unwrap();
        assert_eq!(arena.lo(), lo);
    }

    #[test]
    fn extend_is_contiguous() {
        let mut arena = ArenaRegion::with_capacity(64);
        let lo = arena.lo();
        assert_eq!(arena.hi(), lo.wrapping_sub(1));

        let first = arena.extend(16).unwrap();
        assert_eq!(first, lo);
        assert_eq!(arena.hi() as usize, lo as usize + 15);

        let second = arena.extend(8).unwrap();
        assert_eq!(second as usize, lo as usize + 16);
        assert_eq!(arena.hi() as usize, lo as usize + 23);
    }

    #[test]
    fn failed_extend_leaves_region_unchanged() {
        let mut arena = ArenaRegion::with_capacity(16);
        let err = arena.extend(24).unwrap_err();
        assert_eq!(err.requested, 24);
        assert_eq!(err.remaining, 16);
        assert_eq!(arena.used(), 0);
        arena.extend(16).unwrap();
        assert!(arena.extend(8).is_err());
    }

    #[test]
    fn capacity_rounds_up_to_words() {
        let arena = ArenaRegion::with_capacity(13);
        assert_eq!(arena.capacity(), 16);
    }
}
