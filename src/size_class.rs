//! Size class lookup for the segregated free lists.
//!
//! Free blocks are bucketed by size so a fit search can skip lists that only
//! hold blocks that are too small. Buckets grow geometrically: bucket 0 holds
//! blocks under 30 bytes, bucket `c` holds `[30 << (c - 1), 30 << c)`, and the
//! last bucket catches everything larger.

/// Number of size classes in the default configuration.
pub const NUM_SIZE_CLASSES: usize = 17;

/// Upper bound on configurable size classes.
pub const MAX_SIZE_CLASSES: usize = 32;

/// Sizes at or above this keep being halved into higher classes.
pub const SPLIT_THRESHOLD: usize = 30;

/// Map a block size to its bucket index in `0..classes`.
///
/// Insertion, removal and fit search must all go through this function so
/// a free block can always find the list it lives on from its size alone.
#[inline]
pub fn size_to_class(size: usize, classes: usize) -> usize {
    debug_assert!(classes >= 1);
    let last = classes - 1;
    let mut cls = 0;
    let mut rem = size;
    while rem >= SPLIT_THRESHOLD && cls < last {
        rem >>= 1;
        cls += 1;
    }
    cls
}

/// Smallest block size that maps to `cls` (for diagnostics).
#[inline]
pub const fn class_min_size(cls: usize) -> usize {
    if cls == 0 { 0 } else { SPLIT_THRESHOLD << (cls - 1) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_sizes_in_first_class() {
        assert_eq!(size_to_class(0, NUM_SIZE_CLASSES), 0);
        assert_eq!(size_to_class(16, NUM_SIZE_CLASSES), 0);
        assert_eq!(size_to_class(24, NUM_SIZE_CLASSES), 0);
        assert_eq!(size_to_class(29, NUM_SIZE_CLASSES), 0);
    }

    #[test]
    fn test_class_boundaries() {
        assert_eq!(size_to_class(30, NUM_SIZE_CLASSES), 1);
        assert_eq!(size_to_class(32, NUM_SIZE_CLASSES), 1);
        assert_eq!(size_to_class(59, NUM_SIZE_CLASSES), 1);
        assert_eq!(size_to_class(60, NUM_SIZE_CLASSES), 2);
        assert_eq!(size_to_class(72, NUM_SIZE_CLASSES), 2);
        assert_eq!(size_to_class(96, NUM_SIZE_CLASSES), 2);
        assert_eq!(size_to_class(128, NUM_SIZE_CLASSES), 3);
        assert_eq!(size_to_class(4096, NUM_SIZE_CLASSES), 8);
    }

    #[test]
    fn test_last_class_catches_all() {
        let last = NUM_SIZE_CLASSES - 1;
        assert_eq!(size_to_class(983_039, NUM_SIZE_CLASSES), last - 1);
        assert_eq!(size_to_class(983_040, NUM_SIZE_CLASSES), last);
        assert_eq!(size_to_class(usize::MAX, NUM_SIZE_CLASSES), last);
    }

    #[test]
    fn test_single_class() {
        assert_eq!(size_to_class(16, 1), 0);
        assert_eq!(size_to_class(1 << 20, 1), 0);
    }

    #[test]
    fn test_min_size_round_trip() {
        for cls in 1..NUM_SIZE_CLASSES {
            let size = class_min_size(cls);
            assert_eq!(
                size_to_class(size, NUM_SIZE_CLASSES),
                cls,
                "class {} lower bound {} maps elsewhere",
                cls,
                size
            );
            assert_eq!(size_to_class(size - 1, NUM_SIZE_CLASSES), cls - 1);
        }
    }

    #[test]
    fn test_classes_monotonic() {
        let mut prev = 0;
        for size in (16..200_000).step_by(8) {
            let cls = size_to_class(size, NUM_SIZE_CLASSES);
            assert!(cls >= prev, "size {} went from class {} to {}", size, prev, cls);
            prev = cls;
        }
    }
}
