//! # Boundary-Tagged Heap Allocator
//!
//! A first-fit allocator over a single growable byte region, using
//! boundary-tagged blocks and an explicit doubly-linked free list.
//!
//! ## Heap layout
//!
//! Every byte of the region belongs to exactly one block. A block carries a
//! 4-byte header, the payload, and a 4-byte footer duplicating the header;
//! the footer is what makes the *previous* neighbor reachable in O(1):
//!
//! ```text
//! | pad | PROLOGUE (24, alloc) | block | block | ... | EPILOGUE (0, alloc) |
//!         ^ free-list anchor                          ^ terminates walks
//!
//! block:  | header | payload ...................... | footer |
//!                    ^ bp (what callers receive)
//! free:   | header | PREV link | NEXT link | ...... | footer |
//! ```
//!
//! The prologue is a permanently-allocated minimum-size block whose payload
//! doubles as the free-list sentinel: list traversal stops on its allocated
//! bit rather than on a null pointer. The epilogue is a single allocated
//! header of size zero at the region's high end. Together they guarantee that
//! every real block has well-formed neighbors on both sides.
//!
//! ## Invariants
//!
//! Between any two public calls:
//!
//! - every payload address is 8-aligned;
//! - header and footer of every block agree;
//! - walking forward from the prologue by header sizes lands exactly on the
//!   epilogue;
//! - no two adjacent blocks are both free (coalescing enforces this);
//! - a block is linked in the free list iff its allocated bit is clear, the
//!   sentinel prologue being the one documented exception;
//! - every block is at least 24 bytes and a multiple of 8, so the two
//!   intrusive links always fit inside a free payload.
//!
//! [`check`](BoundaryTagAllocator::check) verifies all of the above on demand.
//!
//! ## Non-goals
//!
//! Single-threaded by design; callers needing sharing wrap the allocator in a
//! lock. One region, never shrunk, 8-byte alignment only.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod allocator;
mod block;
mod check;
mod free_list;
mod tag;

pub use allocator::{BoundaryTagAllocator, HeapStats, InitError};
pub use check::CheckError;
