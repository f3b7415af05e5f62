//! Block navigation over raw heap bytes.
//!
//! A *block pointer* ([`BlockPtr`]) addresses the payload, not the header;
//! the header sits one tag word below it. This module is the only place that
//! does raw pointer arithmetic on the heap — everything above it speaks in
//! whole blocks.
//!
//! ```text
//!          bp - 4   bp                      bp + size - 8
//!          | header | payload ............. | footer |
//! if free: | header | PREV    | NEXT  | ... | footer |
//!            bp ....bp+8......bp+16
//! ```
//!
//! The intrusive PREV/NEXT links overlay the first 16 payload bytes and are
//! meaningful only while the block is free; [`MIN_BLOCK_SIZE`] is chosen so
//! they always fit.

use crate::tag::BoundaryTag;
use core::fmt;
use core::ptr::null_mut;

/// Size of a header or footer word.
pub(crate) const TAG_SIZE: usize = 4;

/// Payload alignment and block-size granularity.
pub(crate) const ALIGNMENT: usize = 8;

/// Size of one intrusive free-list link.
pub(crate) const LINK_SIZE: usize = size_of::<*mut u8>();

/// Smallest legal block: header, two links, footer.
pub(crate) const MIN_BLOCK_SIZE: usize = 2 * TAG_SIZE + 2 * LINK_SIZE;

// The block layout stores pointer-width links in an 8-byte granule.
const _: () = assert!(LINK_SIZE == 8, "pointer size mismatch");

/// Payload address of a block.
///
/// All navigation helpers are `unsafe`: they trust that `self` points into a
/// heap whose tags uphold the crate invariants. Callers outside this module
/// never compute addresses themselves.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq)]
pub(crate) struct BlockPtr(*mut u8);

impl BlockPtr {
    #[inline]
    #[must_use]
    pub(crate) const fn new(payload: *mut u8) -> Self {
        Self(payload)
    }

    #[inline]
    #[must_use]
    pub(crate) const fn null() -> Self {
        Self(null_mut())
    }

    #[inline]
    #[must_use]
    pub(crate) const fn as_ptr(self) -> *mut u8 {
        self.0
    }

    #[inline]
    #[must_use]
    pub(crate) fn is_null(self) -> bool {
        self.0.is_null()
    }

    /// Payload address as an integer, for alignment tests and diagnostics.
    #[inline]
    #[must_use]
    pub(crate) fn addr(self) -> usize {
        self.0 as usize
    }

    /// Read the header word.
    ///
    /// # Safety
    /// `self` must address the payload of a block with an initialized header.
    #[inline]
    #[must_use]
    pub(crate) unsafe fn header(self) -> BoundaryTag {
        BoundaryTag::from_bits(unsafe { self.0.sub(TAG_SIZE).cast::<u32>().read() })
    }

    /// Read the footer word. The footer position derives from the header.
    ///
    /// # Safety
    /// As [`header`](Self::header), and the stored size must be accurate.
    #[inline]
    #[must_use]
    pub(crate) unsafe fn footer(self) -> BoundaryTag {
        BoundaryTag::from_bits(unsafe { self.footer_ptr().read() })
    }

    /// Total block size, both tags included.
    ///
    /// # Safety
    /// As [`header`](Self::header).
    #[inline]
    #[must_use]
    pub(crate) unsafe fn size(self) -> usize {
        unsafe { self.header() }.size()
    }

    /// Allocated flag from the header.
    ///
    /// # Safety
    /// As [`header`](Self::header).
    #[inline]
    #[must_use]
    pub(crate) unsafe fn is_allocated(self) -> bool {
        unsafe { self.header() }.allocated()
    }

    /// Write the header word only. The epilogue has no footer.
    ///
    /// # Safety
    /// The header word must lie inside the heap region.
    #[inline]
    pub(crate) unsafe fn write_header(self, size: usize, allocated: bool) {
        unsafe {
            self.0
                .sub(TAG_SIZE)
                .cast::<u32>()
                .write(BoundaryTag::pack(size, allocated).into_bits());
        }
    }

    /// Write header and footer. The header goes first: the footer position
    /// derives from the size it stores.
    ///
    /// # Safety
    /// The whole block `[bp - 4, bp + size - 4)` must lie inside the region.
    #[inline]
    pub(crate) unsafe fn write_tags(self, size: usize, allocated: bool) {
        unsafe {
            self.write_header(size, allocated);
            self.footer_ptr()
                .write(BoundaryTag::pack(size, allocated).into_bits());
        }
    }

    /// Next block in address order.
    ///
    /// # Safety
    /// As [`header`](Self::header); the result is valid only while the heap
    /// is covered by well-formed blocks up to the epilogue.
    #[inline]
    #[must_use]
    pub(crate) unsafe fn next(self) -> Self {
        Self(unsafe { self.0.add(self.size()) })
    }

    /// Previous block in address order, located through its footer — the one
    /// lookup the footer exists for.
    ///
    /// # Safety
    /// The word at `bp - 8` must be the previous block's footer; exact block
    /// coverage of the region guarantees it.
    #[inline]
    #[must_use]
    pub(crate) unsafe fn prev(self) -> Self {
        let prev_size =
            BoundaryTag::from_bits(unsafe { self.0.sub(2 * TAG_SIZE).cast::<u32>().read() })
                .size();
        Self(unsafe { self.0.sub(prev_size) })
    }

    /// PREV free-list link.
    ///
    /// # Safety
    /// The block must be free (or the sentinel); the links overlay the payload.
    #[inline]
    #[must_use]
    pub(crate) unsafe fn prev_free(self) -> Self {
        Self(unsafe { self.0.cast::<*mut u8>().read() })
    }

    /// NEXT free-list link.
    ///
    /// # Safety
    /// As [`prev_free`](Self::prev_free).
    #[inline]
    #[must_use]
    pub(crate) unsafe fn next_free(self) -> Self {
        Self(unsafe { self.0.add(LINK_SIZE).cast::<*mut u8>().read() })
    }

    /// Store the PREV free-list link.
    ///
    /// # Safety
    /// As [`prev_free`](Self::prev_free).
    #[inline]
    pub(crate) unsafe fn set_prev_free(self, to: Self) {
        unsafe {
            self.0.cast::<*mut u8>().write(to.0);
        }
    }

    /// Store the NEXT free-list link.
    ///
    /// # Safety
    /// As [`prev_free`](Self::prev_free).
    #[inline]
    pub(crate) unsafe fn set_next_free(self, to: Self) {
        unsafe {
            self.0.add(LINK_SIZE).cast::<*mut u8>().write(to.0);
        }
    }

    #[inline]
    unsafe fn footer_ptr(self) -> *mut u32 {
        unsafe { self.0.add(self.size() - 2 * TAG_SIZE).cast::<u32>() }
    }
}

impl fmt::Debug for BlockPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockPtr({:#x})", self.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_and_neighbor_navigation() {
        // 8-aligned scratch space standing in for a heap segment.
        let mut words = [0_u64; 16];
        let base = words.as_mut_ptr().cast::<u8>();

        unsafe {
            let a = BlockPtr::new(base.add(8));
            a.write_tags(24, true);

            let b = a.next();
            assert_eq!(b.addr(), a.addr() + 24);
            b.write_tags(32, false);

            assert_eq!(b.prev(), a);
            assert_eq!(a.size(), 24);
            assert!(a.is_allocated());
            assert!(!b.is_allocated());
            assert_eq!(a.header().into_bits(), a.footer().into_bits());
            assert_eq!(b.header().into_bits(), b.footer().into_bits());
        }
    }

    #[test]
    fn footer_lands_on_last_word_of_block() {
        let mut words = [0_u64; 8];
        let base = words.as_mut_ptr().cast::<u8>();

        unsafe {
            let bp = BlockPtr::new(base.add(8));
            bp.write_tags(40, false);
            // footer occupies the 4 bytes just before the next block's header
            let footer_addr = bp.addr() + 40 - 2 * TAG_SIZE;
            let raw = (footer_addr as *const u32).read();
            assert_eq!(BoundaryTag::from_bits(raw).size(), 40);
        }
    }

    #[test]
    fn free_links_overlay_first_payload_bytes() {
        let mut words = [0_u64; 16];
        let base = words.as_mut_ptr().cast::<u8>();

        unsafe {
            let a = BlockPtr::new(base.add(8));
            let b = BlockPtr::new(base.add(64));
            a.write_tags(24, false);

            a.set_prev_free(BlockPtr::null());
            a.set_next_free(b);
            assert!(a.prev_free().is_null());
            assert_eq!(a.next_free(), b);

            // links live in payload bytes 0..16, clear of the footer at 16..20
            a.set_next_free(BlockPtr::null());
            assert_eq!(a.size(), 24);
        }
    }
}
