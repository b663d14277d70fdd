//! First-fit search over the segregated lists, and block placement.

use crate::arena::{Arena, Block};
use crate::platform::MemorySource;
use crate::tag::Tag;
use crate::MIN_BLOCK_SIZE;

impl<S: MemorySource> Arena<S> {
    /// First block of at least `asize` bytes, searching from the bucket
    /// `asize` maps to upwards, each list head to tail.
    pub(crate) fn find_fit(&self, asize: usize) -> Option<Block> {
        (self.class_of(asize)..self.size_classes())
            .find_map(|cls| self.free_list(cls).find(|&block| self.header(block).size() >= asize))
    }

    /// Allocate the first `asize` bytes of free `block`, returning any
    /// remainder of at least [`MIN_BLOCK_SIZE`] to the free lists.
    pub(crate) fn place(&mut self, block: Block, asize: usize) {
        let tag = self.header(block);
        let csize = tag.size();
        debug_assert!(!tag.is_allocated() && csize >= asize);
        self.remove_free(block);

        if csize - asize >= MIN_BLOCK_SIZE {
            self.set_header(block, Tag::pack(asize, tag.prev_allocated(), true));
            let rest = self.next_block(block);
            let rest_tag = Tag::pack(csize - asize, true, false);
            self.set_header(rest, rest_tag);
            self.set_footer(rest, rest_tag);
            self.insert_free(rest);
        } else {
            self.set_header(block, tag.with_allocated(true));
            let next = self.next_block(block);
            let next_tag = self.header(next).with_prev_allocated(true);
            self.set_header(next, next_tag);
            if !next_tag.is_allocated() {
                self.set_footer(next, next_tag);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::arena::Arena;
    use crate::platform::OwnedRegion;
    use crate::size_class::NUM_SIZE_CLASSES;
    use crate::tag::Tag;
    use crate::CHUNK_SIZE;

    fn fresh() -> Arena<OwnedRegion> {
        let mut arena = Arena::new(OwnedRegion::new(1 << 16).unwrap(), CHUNK_SIZE, NUM_SIZE_CLASSES);
        arena.init().unwrap();
        arena
    }

    #[test]
    fn test_find_fit_empty_arena() {
        let mut arena = fresh();
        let first = arena.first_block();
        assert_eq!(arena.find_fit(16), Some(first));
        assert_eq!(arena.find_fit(CHUNK_SIZE), Some(first));
        assert_eq!(arena.find_fit(CHUNK_SIZE + 8), None);
        arena.place(first, CHUNK_SIZE);
        assert_eq!(arena.find_fit(16), None);
    }

    #[test]
    fn test_split_128_into_32_and_96() {
        let mut arena = fresh();
        // [a: 128][guard: 32][tail]
        let a = arena.find_fit(128).unwrap();
        arena.place(a, 128);
        let guard = arena.find_fit(32).unwrap();
        arena.place(guard, 32);
        arena.free_block(a);

        // The 128-byte block sits in a lower bucket than the tail, so it wins.
        let fit = arena.find_fit(32).unwrap();
        assert_eq!(fit, a);
        arena.place(fit, 32);

        let head = arena.header(a);
        assert_eq!(head.size(), 32);
        assert!(head.is_allocated());
        assert!(head.prev_allocated());

        let rest = arena.next_block(a);
        let rest_tag = arena.header(rest);
        assert_eq!(rest_tag, Tag::pack(96, true, false));
        assert_eq!(arena.footer(rest), rest_tag);
        assert_eq!(arena.next_block(rest), guard);
        assert!(!arena.header(guard).prev_allocated());
        assert_eq!(arena.bucket_head(arena.class_of(96)), Some(rest));
    }

    #[test]
    fn test_small_remainder_not_split() {
        let mut arena = fresh();
        let a = arena.find_fit(40).unwrap();
        arena.place(a, 40);
        let guard = arena.find_fit(32).unwrap();
        arena.place(guard, 32);
        arena.free_block(a);

        // 40 - 32 leaves 8 bytes, below the minimum block size.
        let fit = arena.find_fit(32).unwrap();
        assert_eq!(fit, a);
        arena.place(fit, 32);
        assert_eq!(arena.header(a), Tag::pack(40, true, true));
        assert!(arena.header(guard).prev_allocated());
    }

    #[test]
    fn test_first_fit_not_best_fit() {
        let mut arena = fresh();
        // Free blocks of 104 and 80 in the same bucket, 80 freed last.
        let big = arena.find_fit(104).unwrap();
        arena.place(big, 104);
        let g1 = arena.find_fit(16).unwrap();
        arena.place(g1, 16);
        let small = arena.find_fit(80).unwrap();
        arena.place(small, 80);
        let g2 = arena.find_fit(16).unwrap();
        arena.place(g2, 16);
        for block in [big, small] {
            arena.free_block(block);
        }
        assert_eq!(arena.class_of(104), arena.class_of(80));
        // LIFO head is the 80-byte block, which is big enough.
        assert_eq!(arena.find_fit(72), Some(small));
        // Too small for 96: scanning continues to the older 104-byte block.
        assert_eq!(arena.find_fit(96), Some(big));
    }
}
