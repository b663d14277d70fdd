//! Segregated free lists stored inside the arena.
//!
//! Each size class has one head word at the start of the arena. A free
//! block's first two payload words hold the offsets of its list neighbours:
//!
//! ```text
//!  header | prev | next | ...unused... | footer
//! ```
//!
//! Offsets are relative to the arena base and 0 means "none". Insertion is
//! LIFO at the head; removal splices in O(1) because a block's bucket can be
//! recomputed from its own size.

use crate::arena::{Arena, Block};
use crate::platform::MemorySource;
use crate::size_class::size_to_class;
use crate::WSIZE;

impl<S: MemorySource> Arena<S> {
    /// Bucket for a block of `size` bytes under this arena's class count.
    #[inline]
    pub fn class_of(&self, size: usize) -> usize {
        size_to_class(size, self.size_classes())
    }

    #[inline]
    pub fn bucket_head(&self, cls: usize) -> Option<Block> {
        debug_assert!(cls < self.size_classes());
        Block::decode(self.word(cls * WSIZE))
    }

    #[inline]
    fn set_bucket_head(&mut self, cls: usize, head: Option<Block>) {
        debug_assert!(cls < self.size_classes());
        self.set_word(cls * WSIZE, Block::encode(head));
    }

    #[inline]
    pub(crate) fn link_prev(&self, block: Block) -> Option<Block> {
        Block::decode(self.word(block.offset()))
    }

    #[inline]
    pub(crate) fn link_next(&self, block: Block) -> Option<Block> {
        Block::decode(self.word(block.offset() + WSIZE))
    }

    #[inline]
    fn set_link_prev(&mut self, block: Block, prev: Option<Block>) {
        self.set_word(block.offset(), Block::encode(prev));
    }

    #[inline]
    fn set_link_next(&mut self, block: Block, next: Option<Block>) {
        self.set_word(block.offset() + WSIZE, Block::encode(next));
    }

    /// Push a free block onto the head of the bucket for its current size.
    pub(crate) fn insert_free(&mut self, block: Block) {
        let cls = self.class_of(self.header(block).size());
        let head = self.bucket_head(cls);
        self.set_link_prev(block, None);
        self.set_link_next(block, head);
        if let Some(head) = head {
            self.set_link_prev(head, Some(block));
        }
        self.set_bucket_head(cls, Some(block));
    }

    /// Unlink a free block. Its header must still carry the size it was
    /// inserted with.
    pub(crate) fn remove_free(&mut self, block: Block) {
        let prev = self.link_prev(block);
        let next = self.link_next(block);
        match prev {
            Some(prev) => self.set_link_next(prev, next),
            None => {
                let cls = self.class_of(self.header(block).size());
                debug_assert_eq!(self.bucket_head(cls), Some(block));
                self.set_bucket_head(cls, next);
            }
        }
        if let Some(next) = next {
            self.set_link_prev(next, prev);
        }
    }

    /// Iterate one bucket head to tail.
    pub fn free_list(&self, cls: usize) -> FreeList<'_, S> {
        FreeList {
            arena: self,
            next: self.bucket_head(cls),
        }
    }
}

/// Iterator over the blocks of one size class.
pub struct FreeList<'a, S: MemorySource> {
    arena: &'a Arena<S>,
    next: Option<Block>,
}

impl<S: MemorySource> Iterator for FreeList<'_, S> {
    type Item = Block;

    #[inline]
    fn next(&mut self) -> Option<Block> {
        let block = self.next?;
        self.next = self.arena.link_next(block);
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use crate::arena::{Arena, Block};
    use crate::platform::OwnedRegion;
    use crate::size_class::NUM_SIZE_CLASSES;
    use crate::tag::Tag;
    use crate::CHUNK_SIZE;

    /// An initialised arena with its single chunk block unlinked and three
    /// 64-byte free blocks written at its start.
    fn three_blocks() -> (Arena<OwnedRegion>, [Block; 3]) {
        let mut arena = Arena::new(OwnedRegion::new(1 << 16).unwrap(), CHUNK_SIZE, NUM_SIZE_CLASSES);
        arena.init().unwrap();
        let first = arena.first_block();
        arena.remove_free(first);

        let blocks = [0, 64, 128].map(|delta| Block::new(first.offset() + delta).unwrap());
        for block in blocks {
            let tag = Tag::pack(64, true, false);
            arena.set_header(block, tag);
            arena.set_footer(block, tag);
        }
        (arena, blocks)
    }

    #[test]
    fn test_initial_chunk_listed() {
        let mut arena = Arena::new(OwnedRegion::new(1 << 16).unwrap(), CHUNK_SIZE, NUM_SIZE_CLASSES);
        arena.init().unwrap();
        let cls = arena.class_of(CHUNK_SIZE);
        assert_eq!(cls, 8);
        let listed: Vec<_> = arena.free_list(cls).collect();
        assert_eq!(listed, vec![arena.first_block()]);
        for other in (0..NUM_SIZE_CLASSES).filter(|&c| c != cls) {
            assert_eq!(arena.bucket_head(other), None);
        }
    }

    #[test]
    fn test_insert_is_lifo() {
        let (mut arena, [a, b, c]) = three_blocks();
        arena.insert_free(a);
        arena.insert_free(b);
        arena.insert_free(c);

        let cls = arena.class_of(64);
        let listed: Vec<_> = arena.free_list(cls).collect();
        assert_eq!(listed, vec![c, b, a]);
        assert_eq!(arena.link_prev(c), None);
        assert_eq!(arena.link_prev(b), Some(c));
        assert_eq!(arena.link_prev(a), Some(b));
        assert_eq!(arena.link_next(a), None);
    }

    #[test]
    fn test_remove_middle_head_and_tail() {
        let (mut arena, [a, b, c]) = three_blocks();
        for block in [a, b, c] {
            arena.insert_free(block);
        }
        let cls = arena.class_of(64);

        arena.remove_free(b);
        assert_eq!(arena.free_list(cls).collect::<Vec<_>>(), vec![c, a]);
        assert_eq!(arena.link_prev(a), Some(c));
        assert_eq!(arena.link_next(c), Some(a));

        arena.remove_free(c);
        assert_eq!(arena.bucket_head(cls), Some(a));
        assert_eq!(arena.link_prev(a), None);

        arena.remove_free(a);
        assert_eq!(arena.bucket_head(cls), None);
    }

    #[test]
    fn test_singleton_list() {
        let (mut arena, [a, _, _]) = three_blocks();
        arena.insert_free(a);
        assert_eq!(arena.link_prev(a), None);
        assert_eq!(arena.link_next(a), None);
        arena.remove_free(a);
        assert_eq!(arena.free_list(arena.class_of(64)).count(), 0);
    }
}
