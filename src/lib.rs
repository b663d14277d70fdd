#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! segalloc: a segregated-free-list allocator over one growable arena.
//!
//! Blocks carry 4-byte boundary tags (footers only while free), free blocks
//! are kept in size-class buckets of intrusive doubly-linked lists whose
//! links are 32-bit offsets into the arena, and freed blocks are coalesced
//! eagerly with their physical neighbours.
//!
//! ```text
//!  base                                                                  break
//!   | bucket heads | pad | prologue | block | block | ... | block | epilogue |
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use segalloc::{AllocConfig, OwnedRegion, SegAlloc};
//!
//! let region = OwnedRegion::new(1 << 20)?;
//! let mut heap = SegAlloc::new(region, AllocConfig::new());
//! let p = heap.allocate(64);
//! unsafe { heap.release(p) };
//! ```
//!
//! As a global allocator (serialised through a spin lock):
//!
//! ```ignore
//! static mut ARENA: [u64; 1 << 20] = [0; 1 << 20];
//!
//! #[global_allocator]
//! static GLOBAL: segalloc::LockedSegAlloc<segalloc::StaticRegion> =
//!     segalloc::LockedSegAlloc::new(segalloc::SegAlloc::new(
//!         segalloc::StaticRegion::from_words(&raw mut ARENA),
//!         segalloc::AllocConfig::new(),
//!     ));
//! ```

/// A `log` macro call that is skipped when the heap has logging switched off.
macro_rules! heap_log {
    ($heap:expr, $level:ident!($($arg:tt)+)) => {
        if $heap.logs() {
            log::$level!($($arg)+);
        }
    };
}

pub mod tag;
pub mod size_class;
pub mod config;
pub mod error;
pub mod platform;
pub mod arena;
pub mod free_list;
pub mod coalesce;
pub mod placement;
pub mod checker;
pub mod allocator;

#[cfg(feature = "ffi")]
pub mod ffi;

/// Word size: one boundary tag or one free-list link (bytes).
pub const WSIZE: usize = 4;
/// Double word: the payload alignment and block size granularity (bytes).
pub const DSIZE: usize = 8;
/// Alignment guaranteed for every payload pointer.
pub const ALIGNMENT: usize = DSIZE;
/// Smallest block: header, two links and footer.
pub const MIN_BLOCK_SIZE: usize = 2 * DSIZE;
/// Default growth increment (bytes).
pub const CHUNK_SIZE: usize = 1 << 12;

/// Round `n` up to the next multiple of [`ALIGNMENT`].
#[inline]
pub const fn align_up(n: usize) -> usize {
    (n + (ALIGNMENT - 1)) & !(ALIGNMENT - 1)
}

pub use allocator::{HeapStats, LockedSegAlloc, SegAlloc};
pub use checker::{CheckReport, Violation};
pub use config::{AllocConfig, RoundingPolicy};
pub use error::AllocError;
pub use platform::{Exhausted, MemorySource, StaticRegion};

#[cfg(any(test, feature = "std"))]
pub use platform::OwnedRegion;

#[cfg(all(unix, feature = "sbrk"))]
pub use platform::Sbrk;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0), 0);
        assert_eq!(align_up(1), 8);
        assert_eq!(align_up(8), 8);
        assert_eq!(align_up(9), 16);
        assert_eq!(align_up(68), 72);
    }

    #[test]
    fn test_min_block_holds_tags_and_links() {
        // header + prev link + next link + footer
        assert_eq!(MIN_BLOCK_SIZE, 4 * WSIZE);
    }
}
