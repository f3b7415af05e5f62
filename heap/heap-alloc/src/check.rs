//! Heap invariant verification.
//!
//! Development and test aid, not a hot-path facility. The checker walks the
//! whole heap and audits the free list; the first violation is logged and
//! returned. It never mutates and never attempts recovery.

use crate::allocator::BoundaryTagAllocator;
use crate::block::{ALIGNMENT, MIN_BLOCK_SIZE, TAG_SIZE};
use heap_region::HeapRegion;
use log::error;

/// A violation of the heap's structural invariants.
///
/// Any of these means a bug in the allocator or metadata stomped by a
/// caller; the heap contents are not to be trusted afterwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    #[error("prologue tags damaged at {addr:#x}")]
    BadPrologue { addr: usize },
    #[error("epilogue header damaged or misplaced at {addr:#x}")]
    BadEpilogue { addr: usize },
    #[error("misaligned payload at {addr:#x}")]
    Misaligned { addr: usize },
    #[error("header and footer disagree at {addr:#x}")]
    TagMismatch { addr: usize },
    #[error("bad block size {size} at {addr:#x}")]
    BadSize { addr: usize, size: usize },
    #[error("block at {addr:#x} runs past the region end")]
    OutOfBounds { addr: usize },
    #[error("adjacent free blocks at {addr:#x}")]
    AdjacentFree { addr: usize },
    #[error("free-list link {link:#x} out of range at {addr:#x}")]
    LinkOutOfRange { addr: usize, link: usize },
    #[error("free-list cross-links inconsistent at {addr:#x}")]
    BadCrossLink { addr: usize },
    #[error("free list cycles or outruns the free blocks at {addr:#x}")]
    ListRunaway { addr: usize },
    #[error("free list holds {listed} blocks, heap walk found {walked}")]
    CountMismatch { listed: usize, walked: usize },
}

impl<R: HeapRegion> BoundaryTagAllocator<R> {
    /// Verify every structural invariant of the heap.
    ///
    /// Checks, in order: the prologue tags; a forward walk over all blocks
    /// (alignment, tag agreement, size bounds, no adjacent free blocks,
    /// exact termination at the epilogue); and a free-list audit (bounds and
    /// mirror consistency of every link, membership matching the walk). The
    /// sentinel prologue is exempt from the membership rule; its PREV slot
    /// is null exactly when it heads the list.
    ///
    /// # Errors
    /// The first violation found, which is also reported through
    /// [`log::error!`].
    pub fn check(&self) -> Result<(), CheckError> {
        let result = self.check_inner();
        if let Err(violation) = result {
            error!("heap check failed: {violation}");
        }
        result
    }

    #[allow(clippy::too_many_lines)]
    fn check_inner(&self) -> Result<(), CheckError> {
        let lo = self.region.lo() as usize;
        let hi = self.region.hi() as usize;

        // SAFETY: reads stay within [lo, hi]; every probe is bounds-checked
        // before the tag behind it is trusted.
        unsafe {
            let prologue = self.prologue;
            let tag = prologue.header();
            if tag.size() != MIN_BLOCK_SIZE
                || !tag.allocated()
                || tag.into_bits() != prologue.footer().into_bits()
            {
                return Err(CheckError::BadPrologue {
                    addr: prologue.addr(),
                });
            }

            // forward walk
            let mut walked_free = 0_usize;
            let mut prev_was_free = false;
            let mut bp = prologue.next();
            loop {
                let addr = bp.addr();
                if addr - 1 > hi {
                    return Err(CheckError::OutOfBounds { addr });
                }
                let header = bp.header();
                if header.size() == 0 {
                    // the epilogue is allocated and flush with the region end
                    if !header.allocated() || addr - 1 != hi {
                        return Err(CheckError::BadEpilogue { addr });
                    }
                    break;
                }
                if !addr.is_multiple_of(ALIGNMENT) {
                    return Err(CheckError::Misaligned { addr });
                }
                let size = header.size();
                if size < MIN_BLOCK_SIZE || !size.is_multiple_of(ALIGNMENT) {
                    return Err(CheckError::BadSize { addr, size });
                }
                if addr + size - TAG_SIZE - 1 > hi {
                    return Err(CheckError::OutOfBounds { addr });
                }
                if header.into_bits() != bp.footer().into_bits() {
                    return Err(CheckError::TagMismatch { addr });
                }
                let is_free = !header.allocated();
                if is_free && prev_was_free {
                    return Err(CheckError::AdjacentFree { addr });
                }
                walked_free += usize::from(is_free);
                prev_was_free = is_free;
                bp = bp.next();
            }

            // free-list audit, bounded by the number of free blocks the walk
            // found so a cycle cannot hang the checker
            let mut listed = 0_usize;
            let mut node = self.free_list.head();
            while !node.is_allocated() {
                let addr = node.addr();
                if listed == walked_free {
                    return Err(CheckError::ListRunaway { addr });
                }
                listed += 1;

                if !addr.is_multiple_of(ALIGNMENT) {
                    return Err(CheckError::Misaligned { addr });
                }
                if node.header().into_bits() != node.footer().into_bits() {
                    return Err(CheckError::TagMismatch { addr });
                }

                let prev = node.prev_free();
                let next = node.next_free();
                if node == self.free_list.head() {
                    if !prev.is_null() {
                        return Err(CheckError::BadCrossLink { addr });
                    }
                } else {
                    if prev.is_null() || prev.addr() < lo || prev.addr() > hi {
                        return Err(CheckError::LinkOutOfRange {
                            addr,
                            link: prev.addr(),
                        });
                    }
                    if prev.next_free() != node {
                        return Err(CheckError::BadCrossLink { addr });
                    }
                }
                if next.is_null() || next.addr() < lo || next.addr() > hi {
                    return Err(CheckError::LinkOutOfRange {
                        addr,
                        link: next.addr(),
                    });
                }
                if !next.is_allocated() && next.prev_free() != node {
                    return Err(CheckError::BadCrossLink { addr });
                }
                node = next;
            }
            if listed != walked_free {
                return Err(CheckError::CountMismatch {
                    listed,
                    walked: walked_free,
                });
            }
        }
        Ok(())
    }
}
