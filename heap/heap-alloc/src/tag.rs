//! Boundary-tag words.
//!
//! Header and footer of a block are the same 4-byte word: the allocated flag
//! in bit 0 and the block size above it. Sizes are multiples of 8, so the
//! three low bits of the size are always zero and the raw word equals
//! `size | allocated`. Bits 1–2 stay unused.

use bitfield_struct::bitfield;

/// A header or footer word.
///
/// The stored size covers the whole block, both tags included.
#[bitfield(u32)]
pub(crate) struct BoundaryTag {
    /// Allocated flag (bit 0).
    pub allocated: bool,
    /// Unused (bits 1–2); the size granularity keeps them clear.
    #[bits(2)]
    _reserved: u8,
    /// Block size in 8-byte units (bits 3–31).
    #[bits(29)]
    size_units: u32,
}

impl BoundaryTag {
    /// Pack a block size (a multiple of 8) and the allocated flag.
    #[inline]
    #[must_use]
    pub(crate) const fn pack(size: usize, allocated: bool) -> Self {
        Self::new().with_allocated(allocated).with_size(size)
    }

    /// Stored block size, low bits masked off.
    #[inline]
    #[must_use]
    pub(crate) const fn size(self) -> usize {
        (self.size_units() as usize) << 3
    }

    /// Replace the stored size. `size` must be a multiple of 8.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) const fn with_size(self, size: usize) -> Self {
        debug_assert!(size.is_multiple_of(8));
        debug_assert!(size >> 3 < 1 << 29, "block size exceeds the tag field");
        self.with_size_units((size >> 3) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_word_is_size_or_flag() {
        let tag = BoundaryTag::pack(4096, true);
        assert_eq!(tag.into_bits(), 4096 | 1);
        assert_eq!(tag.size(), 4096);
        assert!(tag.allocated());
    }

    #[test]
    fn free_tag_round_trips() {
        let tag = BoundaryTag::pack(24, false);
        assert_eq!(tag.into_bits(), 24);

        let back = BoundaryTag::from_bits(tag.into_bits());
        assert_eq!(back.size(), 24);
        assert!(!back.allocated());
    }

    #[test]
    fn flag_does_not_disturb_size() {
        let tag = BoundaryTag::pack(72, false).with_allocated(true);
        assert_eq!(tag.size(), 72);
        assert_eq!(tag.into_bits(), 72 | 1);
    }

    #[test]
    fn zero_size_epilogue_word() {
        let tag = BoundaryTag::pack(0, true);
        assert_eq!(tag.into_bits(), 1);
        assert_eq!(tag.size(), 0);
    }
}
