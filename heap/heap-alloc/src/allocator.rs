//! First-fit placement over boundary-tagged blocks.

use crate::block::{ALIGNMENT, BlockPtr, MIN_BLOCK_SIZE, TAG_SIZE};
use crate::free_list::FreeList;
use core::cmp;
use core::ptr::{copy_nonoverlapping, null_mut};
use heap_region::{HeapRegion, OutOfMemory};
use log::{debug, trace};

/// Minimum growth request sent to the region; specific oversized requests
/// extend by their own size instead.
const CHUNK_SIZE: usize = 16;

/// Round `n` up to the next multiple of `align` (a power of two).
///
/// Saturates near `usize::MAX`; an absurd request then fails at the region
/// instead of wrapping into a small block.
const fn align_up(n: usize, align: usize) -> usize {
    n.saturating_add(align - 1) & !(align - 1)
}

/// Request size plus both tags, rounded to the alignment granule and bumped
/// to the minimum block size.
const fn adjusted_size(size: usize) -> usize {
    let with_tags = align_up(size, ALIGNMENT).saturating_add(2 * TAG_SIZE);
    if with_tags < MIN_BLOCK_SIZE {
        MIN_BLOCK_SIZE
    } else {
        with_tags
    }
}

/// Boundary-tagged first-fit allocator over a [`HeapRegion`].
///
/// Owns the region for its whole life; blocks never move once handed out, so
/// payload pointers stay valid until freed. Failure is never fatal: a denied
/// region extension surfaces as a null return and the heap stays fully
/// usable.
pub struct BoundaryTagAllocator<R> {
    pub(crate) region: R,
    /// Payload of the prologue block; every heap walk starts here.
    pub(crate) prologue: BlockPtr,
    pub(crate) free_list: FreeList,
}

/// Failure to build the initial heap structure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error(transparent)]
    OutOfMemory(#[from] OutOfMemory),
}

/// Point-in-time census of the heap, prologue and epilogue excluded.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct HeapStats {
    /// Bytes the region currently spans.
    pub heap_bytes: usize,
    /// Bytes inside allocated blocks, tags included.
    pub allocated_bytes: usize,
    /// Bytes inside free blocks, tags included.
    pub free_bytes: usize,
    /// Number of allocated blocks.
    pub allocated_blocks: usize,
    /// Number of free blocks.
    pub free_blocks: usize,
}

impl<R: HeapRegion> BoundaryTagAllocator<R> {
    /// Build an allocator over `region`.
    ///
    /// Writes the initial heap structure — alignment padding, the prologue
    /// block anchoring the free list, the epilogue header — and seeds the
    /// heap with one minimum-size chunk of free space. The initial extension
    /// requests exactly the bytes written, so block coverage of the region
    /// is exact from the start.
    ///
    /// Resetting means building a new allocator over a fresh region.
    ///
    /// # Errors
    /// [`InitError::OutOfMemory`] when the region refuses either initial
    /// extension.
    pub fn init(mut region: R) -> Result<Self, InitError> {
        let base = region.extend(2 * TAG_SIZE + MIN_BLOCK_SIZE)?;
        // SAFETY: the 32 bytes just granted hold the padding word, the
        // prologue block and the epilogue header, all within the region.
        let prologue = unsafe {
            base.cast::<u32>().write(0); // padding keeps payloads 8-aligned
            let prologue = BlockPtr::new(base.add(2 * TAG_SIZE));
            prologue.write_tags(MIN_BLOCK_SIZE, true);
            prologue.set_prev_free(BlockPtr::null());
            prologue.set_next_free(BlockPtr::null());
            prologue.next().write_header(0, true); // epilogue
            prologue
        };

        let mut heap = Self {
            region,
            prologue,
            free_list: FreeList::new(prologue),
        };
        // SAFETY: prologue and epilogue are in place; the heap is walkable.
        unsafe {
            heap.extend_heap(CHUNK_SIZE)?;
        }
        debug!("heap initialized at {:#x}", heap.region.lo() as usize);
        Ok(heap)
    }

    /// Allocate at least `size` bytes, 8-aligned.
    ///
    /// Returns null for `size == 0` and when the region cannot grow to cover
    /// a miss; the heap is unchanged in both cases.
    #[must_use]
    pub fn alloc(&mut self, size: usize) -> *mut u8 {
        if size == 0 {
            return null_mut();
        }
        let asize = adjusted_size(size);

        // SAFETY: the heap invariants hold at every public entry.
        unsafe {
            if let Some(bp) = self.find_fit(asize) {
                self.place(bp, asize);
                return bp.as_ptr();
            }

            match self.extend_heap(cmp::max(asize, CHUNK_SIZE)) {
                Ok(bp) => {
                    self.place(bp, asize);
                    bp.as_ptr()
                }
                Err(err) => {
                    debug!("allocation of {size} bytes failed: {err}");
                    null_mut()
                }
            }
        }
    }

    /// Return `ptr`'s block to the free list, merging with free neighbors.
    ///
    /// Null is a no-op.
    ///
    /// # Safety
    /// `ptr` must be null or a pointer obtained from [`alloc`](Self::alloc)
    /// or [`realloc`](Self::realloc) of this allocator and not freed since.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let bp = BlockPtr::new(ptr);
        unsafe {
            let size = bp.size();
            bp.write_tags(size, false);
            self.coalesce(bp);
        }
    }

    /// Resize `ptr`'s block to at least `size` bytes.
    ///
    /// - `size == 0` frees the block and returns null.
    /// - A null `ptr` behaves as [`alloc`](Self::alloc).
    /// - Shrinking stays in place, splitting off the tail as a free block
    ///   when the cut exceeds a minimum block.
    /// - Growing allocates a new block, copies the old payload and frees the
    ///   old block. On failure the original block is untouched and null is
    ///   returned.
    ///
    /// # Safety
    /// As [`free`](Self::free).
    #[must_use]
    pub unsafe fn realloc(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        if size == 0 {
            unsafe { self.free(ptr) };
            return null_mut();
        }
        if ptr.is_null() {
            return self.alloc(size);
        }

        let bp = BlockPtr::new(ptr);
        unsafe {
            let old = bp.size();
            let asize = adjusted_size(size);

            if asize == old {
                return ptr;
            }

            if asize < old {
                if old - asize <= MIN_BLOCK_SIZE {
                    // the cut-off tail could not stand as a block
                    return ptr;
                }
                bp.write_tags(asize, true);
                let tail = bp.next();
                tail.write_tags(old - asize, false);
                self.coalesce(tail);
                return ptr;
            }

            let new = self.alloc(size);
            if new.is_null() {
                return null_mut();
            }
            copy_nonoverlapping(ptr, new, cmp::min(size, old - 2 * TAG_SIZE));
            self.free(ptr);
            new
        }
    }

    /// Walk the heap and count blocks and bytes by state.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            heap_bytes: self.region.hi() as usize - self.region.lo() as usize + 1,
            ..HeapStats::default()
        };
        // skip the prologue; it is a guard, not data
        for bp in self.blocks().skip(1) {
            // SAFETY: `blocks` yields only blocks with valid tags.
            unsafe {
                if bp.is_allocated() {
                    stats.allocated_blocks += 1;
                    stats.allocated_bytes += bp.size();
                } else {
                    stats.free_blocks += 1;
                    stats.free_bytes += bp.size();
                }
            }
        }
        stats
    }

    /// Log one line per block, prologue to epilogue.
    pub fn dump(&self) {
        debug!(
            "heap [{:#x}, {:#x}]",
            self.region.lo() as usize,
            self.region.hi() as usize
        );
        for bp in self.blocks() {
            // SAFETY: `blocks` yields only blocks with valid tags.
            unsafe {
                if bp.is_allocated() {
                    debug!("  {:#x}: {:5} allocated", bp.addr(), bp.size());
                } else {
                    debug!(
                        "  {:#x}: {:5} free (prev {:#x}, next {:#x})",
                        bp.addr(),
                        bp.size(),
                        bp.prev_free().addr(),
                        bp.next_free().addr()
                    );
                }
            }
        }
    }

    /// First free block that can hold `asize` bytes.
    unsafe fn find_fit(&self, asize: usize) -> Option<BlockPtr> {
        // SAFETY: list nodes carry valid tags until the sentinel stops the scan.
        self.free_list.iter().find(|bp| unsafe { bp.size() } >= asize)
    }

    /// Carve an `asize`-byte allocated block out of the free block `bp`.
    ///
    /// Splits when the remainder can stand as a block of its own. The front
    /// tags are written before the tail address is derived: `next` reads the
    /// size just stored.
    ///
    /// # Safety
    /// `bp` must be a linked free block with `size >= asize`.
    unsafe fn place(&mut self, bp: BlockPtr, asize: usize) {
        unsafe {
            let total = bp.size();
            if total - asize >= MIN_BLOCK_SIZE {
                bp.write_tags(asize, true);
                self.free_list.unlink(bp);
                let tail = bp.next();
                tail.write_tags(total - asize, false);
                self.coalesce(tail);
            } else {
                bp.write_tags(total, true);
                self.free_list.unlink(bp);
            }
        }
    }

    /// Merge `bp` with any free address-neighbors, then push the result onto
    /// the free list. Returns the payload of the merged block.
    ///
    /// The prologue guards the low end and the epilogue the high end, so
    /// both neighbor probes always read well-formed tags.
    ///
    /// # Safety
    /// `bp`'s tags must already read free, and `bp` must not be linked.
    unsafe fn coalesce(&mut self, bp: BlockPtr) -> BlockPtr {
        unsafe {
            let prev_allocated = bp.prev().is_allocated();
            let next_allocated = bp.next().is_allocated();

            let mut bp = bp;
            let mut size = bp.size();
            match (prev_allocated, next_allocated) {
                (true, true) => {}
                (true, false) => {
                    // absorb the next block; the footer write lands on its
                    // old footer once the header carries the grown size
                    let next = bp.next();
                    size += next.size();
                    self.free_list.unlink(next);
                    bp.write_tags(size, false);
                }
                (false, true) => {
                    let prev = bp.prev();
                    size += prev.size();
                    self.free_list.unlink(prev);
                    bp = prev;
                    bp.write_tags(size, false);
                }
                (false, false) => {
                    let prev = bp.prev();
                    let next = bp.next();
                    size += prev.size() + next.size();
                    self.free_list.unlink(prev);
                    self.free_list.unlink(next);
                    bp = prev;
                    bp.write_tags(size, false);
                }
            }

            self.free_list.push_front(bp);
            bp
        }
    }

    /// Grow the heap by at least `bytes` and return the resulting free block.
    ///
    /// The request is rounded to the alignment granule and clamped to a
    /// minimum block. The old epilogue header becomes the new block's
    /// header; a fresh epilogue goes one word past the new end. The new
    /// block coalesces with a free block that ended at the old epilogue.
    ///
    /// # Safety
    /// The heap must be walkable (prologue and epilogue in place).
    unsafe fn extend_heap(&mut self, bytes: usize) -> Result<BlockPtr, OutOfMemory> {
        let size = cmp::max(align_up(bytes, ALIGNMENT), MIN_BLOCK_SIZE);
        let start = self.region.extend(size)?;
        trace!("heap extended by {size} bytes");
        unsafe {
            let bp = BlockPtr::new(start);
            bp.write_tags(size, false);
            bp.next().write_header(0, true);
            Ok(self.coalesce(bp))
        }
    }

    /// Blocks in address order, prologue first, epilogue excluded.
    pub(crate) const fn blocks(&self) -> Blocks {
        Blocks {
            cursor: self.prologue,
        }
    }
}

/// Iterator over the blocks of a heap, ending at the epilogue.
pub(crate) struct Blocks {
    cursor: BlockPtr,
}

impl Iterator for Blocks {
    type Item = BlockPtr;

    fn next(&mut self) -> Option<BlockPtr> {
        // SAFETY: the cursor follows header sizes over covered blocks; the
        // zero-size epilogue terminates the sequence.
        unsafe {
            if self.cursor.size() == 0 {
                return None;
            }
            let bp = self.cursor;
            self.cursor = bp.next();
            Some(bp)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heap_region::ArenaRegion;

    #[test]
    fn request_sizes_are_adjusted() {
        // payload + 8 tag bytes, 8-aligned, at least one minimum block
        assert_eq!(adjusted_size(1), 24);
        assert_eq!(adjusted_size(16), 24);
        assert_eq!(adjusted_size(17), 32);
        assert_eq!(adjusted_size(64), 72);
        assert_eq!(adjusted_size(4088), 4096);
    }

    #[test]
    fn align_up_rounds_to_granule() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(13, 8), 16);
    }

    #[test]
    fn init_seeds_one_free_block() {
        let heap = BoundaryTagAllocator::init(ArenaRegion::with_capacity(4096)).unwrap();
        let stats = heap.stats();
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.free_bytes, MIN_BLOCK_SIZE);
        assert_eq!(stats.allocated_blocks, 0);
    }

    #[test]
    fn block_walk_covers_the_region() {
        let mut heap = BoundaryTagAllocator::init(ArenaRegion::with_capacity(4096)).unwrap();
        let p = heap.alloc(100);
        assert!(!p.is_null());

        let stats = heap.stats();
        // padding word + prologue + data blocks + epilogue header == region span
        let accounted =
            TAG_SIZE + MIN_BLOCK_SIZE + stats.allocated_bytes + stats.free_bytes + TAG_SIZE;
        assert_eq!(accounted, stats.heap_bytes);
    }
}
