//! Boundary tag codec.
//!
//! Every block starts with a 4-byte header tag; free blocks repeat it as a
//! footer in their last 4 bytes. Sizes are multiples of 8, which leaves the
//! three low bits free for status flags:
//!
//! ```text
//!  31                                   3   2   1   0
//! +--------------------------------------+---+---+---+
//! |               size                   | - | P | A |
//! +--------------------------------------+---+---+---+
//!   A = this block is allocated
//!   P = the physically preceding block is allocated
//! ```

use core::fmt;

/// A packed header/footer word.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Tag(u32);

impl Tag {
    /// This block is allocated.
    pub const ALLOCATED: u32 = 0x1;
    /// The block immediately before this one is allocated.
    pub const PREV_ALLOCATED: u32 = 0x2;

    const FLAG_MASK: u32 = 0x7;

    /// Pack a size and both status bits.
    #[inline]
    pub const fn pack(size: usize, prev_allocated: bool, allocated: bool) -> Self {
        debug_assert!(size % 8 == 0, "block size must be a multiple of 8");
        debug_assert!(size <= u32::MAX as usize, "block size does not fit a tag");
        let mut raw = size as u32;
        if prev_allocated {
            raw |= Self::PREV_ALLOCATED;
        }
        if allocated {
            raw |= Self::ALLOCATED;
        }
        Tag(raw)
    }

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Tag(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Block size in bytes, overhead included.
    #[inline]
    pub const fn size(self) -> usize {
        (self.0 & !Self::FLAG_MASK) as usize
    }

    #[inline]
    pub const fn is_allocated(self) -> bool {
        self.0 & Self::ALLOCATED != 0
    }

    #[inline]
    pub const fn prev_allocated(self) -> bool {
        self.0 & Self::PREV_ALLOCATED != 0
    }

    #[inline]
    pub const fn with_allocated(self, allocated: bool) -> Self {
        if allocated {
            Tag(self.0 | Self::ALLOCATED)
        } else {
            Tag(self.0 & !Self::ALLOCATED)
        }
    }

    #[inline]
    pub const fn with_prev_allocated(self, prev_allocated: bool) -> Self {
        if prev_allocated {
            Tag(self.0 | Self::PREV_ALLOCATED)
        } else {
            Tag(self.0 & !Self::PREV_ALLOCATED)
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tag")
            .field("size", &self.size())
            .field("prev_allocated", &self.prev_allocated())
            .field("allocated", &self.is_allocated())
            .finish()
    }
}
