//! Memory sources: the growth primitive underneath the arena.
//!
//! A source hands out memory the way `sbrk` does: each call extends the
//! region by `increment` bytes and returns the start of the new bytes. The
//! arena checks that successive regions are contiguous.

use core::ptr::NonNull;

/// Growth primitive for the arena.
///
/// # Safety
///
/// Every region returned by `sbrk` must be valid for reads and writes of
/// `increment` bytes, must not be handed out again, and must stay valid and
/// unmoved for as long as the source is alive.
pub unsafe trait MemorySource {
    /// Extend the region by `increment` bytes.
    ///
    /// Returns the address of the first new byte, or `None` when the source
    /// is exhausted. `sbrk(0)` reports the current break.
    fn sbrk(&mut self, increment: usize) -> Option<NonNull<u8>>;
}

/// Bump a break over `[start, start + capacity)`.
#[inline]
fn bump(start: *mut u8, capacity: usize, brk: &mut usize, increment: usize) -> Option<NonNull<u8>> {
    if increment > capacity - *brk {
        return None;
    }
    let old = unsafe { start.add(*brk) };
    *brk += increment;
    NonNull::new(old)
}

// =============================================================================
// Static array region
// =============================================================================

/// A source bumping through a caller-owned array of words.
///
/// Intended for `static` arenas behind a `#[global_allocator]`, where the
/// system allocator is not available to back the heap.
pub struct StaticRegion {
    start: *mut u8,
    capacity: usize,
    brk: usize,
}

// The region is only reachable through the owning allocator.
unsafe impl Send for StaticRegion {}

impl StaticRegion {
    /// Wrap a word array. The array must not be accessed through any other
    /// path while the region (or an allocator over it) is alive.
    pub const fn from_words<const N: usize>(words: *mut [u64; N]) -> Self {
        Self {
            start: words.cast::<u8>(),
            capacity: N * core::mem::size_of::<u64>(),
            brk: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

unsafe impl MemorySource for StaticRegion {
    fn sbrk(&mut self, increment: usize) -> Option<NonNull<u8>> {
        bump(self.start, self.capacity, &mut self.brk, increment)
    }
}

// =============================================================================
// Owned heap region
// =============================================================================

#[cfg(any(test, feature = "std"))]
pub use owned::OwnedRegion;

#[cfg(any(test, feature = "std"))]
mod owned {
    use super::{MemorySource, bump};
    use crate::error::AllocError;
    use core::ptr::NonNull;
    use std::alloc::{self, Layout};

    /// A fixed-capacity, zeroed buffer reserved once from the system
    /// allocator and handed out in `sbrk` increments.
    pub struct OwnedRegion {
        start: NonNull<u8>,
        capacity: usize,
        brk: usize,
    }

    unsafe impl Send for OwnedRegion {}

    impl OwnedRegion {
        pub fn new(capacity: usize) -> Result<Self, AllocError> {
            let layout = Layout::from_size_align(capacity.max(1), crate::ALIGNMENT)
                .map_err(|_| AllocError::OutOfMemory {
                    requested: capacity,
                })?;
            let raw = unsafe { alloc::alloc_zeroed(layout) };
            let start = NonNull::new(raw).ok_or(AllocError::OutOfMemory {
                requested: capacity,
            })?;
            log::debug!("reserved {} byte region at {:p}", capacity, start);
            Ok(Self {
                start,
                capacity,
                brk: 0,
            })
        }

        pub fn capacity(&self) -> usize {
            self.capacity
        }

        /// Bytes handed out so far.
        pub fn used(&self) -> usize {
            self.brk
        }
    }

    unsafe impl MemorySource for OwnedRegion {
        fn sbrk(&mut self, increment: usize) -> Option<NonNull<u8>> {
            bump(self.start.as_ptr(), self.capacity, &mut self.brk, increment)
        }
    }

    impl Drop for OwnedRegion {
        fn drop(&mut self) {
            // Layout was validated in `new`.
            if let Ok(layout) = Layout::from_size_align(self.capacity.max(1), crate::ALIGNMENT) {
                unsafe { alloc::dealloc(self.start.as_ptr(), layout) };
            }
        }
    }
}

// =============================================================================
// Process break
// =============================================================================

cfg_if::cfg_if! {
    if #[cfg(all(unix, feature = "sbrk"))] {
        /// The process data segment, grown with `sbrk(2)`.
        ///
        /// Anything else in the process that moves the break (including some
        /// system allocators) breaks contiguity; the arena reports that as
        /// [`AllocError::Discontiguous`](crate::AllocError::Discontiguous).
        #[derive(Default)]
        pub struct Sbrk;

        unsafe impl MemorySource for Sbrk {
            fn sbrk(&mut self, increment: usize) -> Option<NonNull<u8>> {
                let increment = libc::intptr_t::try_from(increment).ok()?;
                let addr = unsafe { libc::sbrk(increment) };
                if addr as isize == -1 {
                    return None;
                }
                NonNull::new(addr.cast::<u8>())
            }
        }
    }
}

/// A source that never yields memory.
#[derive(Clone, Copy, Debug, Default)]
pub struct Exhausted;

unsafe impl MemorySource for Exhausted {
    fn sbrk(&mut self, _increment: usize) -> Option<NonNull<u8>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_region_bumps() {
        let mut region = OwnedRegion::new(64).unwrap();
        let a = region.sbrk(16).unwrap();
        let b = region.sbrk(16).unwrap();
        assert_eq!(a.as_ptr() as usize % 8, 0);
        assert_eq!(b.as_ptr() as usize, a.as_ptr() as usize + 16);
        assert_eq!(region.used(), 32);
    }

    #[test]
    fn test_owned_region_exhaustion() {
        let mut region = OwnedRegion::new(64).unwrap();
        assert!(region.sbrk(48).is_some());
        assert!(region.sbrk(32).is_none());
        // A failed request leaves the break alone.
        assert_eq!(region.used(), 48);
        assert!(region.sbrk(16).is_some());
    }

    #[test]
    fn test_static_region() {
        static mut WORDS: [u64; 8] = [0; 8];
        let mut region = StaticRegion::from_words(&raw mut WORDS);
        assert_eq!(region.capacity(), 64);
        let a = region.sbrk(0).unwrap();
        let b = region.sbrk(64).unwrap();
        assert_eq!(a, b);
        assert!(region.sbrk(8).is_none());
    }

    #[test]
    fn test_exhausted() {
        assert!(Exhausted.sbrk(8).is_none());
    }
}
