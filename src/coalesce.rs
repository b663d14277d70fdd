//! Boundary-tag coalescing.
//!
//! A newly freed block is merged with whichever physical neighbours are free
//! so no two free blocks are ever adjacent. The predecessor's state comes
//! from the block's own `prev_allocated` bit (allocated blocks carry no
//! footer); the successor's from its header.

use crate::arena::{Arena, Block};
use crate::platform::MemorySource;
use crate::tag::Tag;

impl<S: MemorySource> Arena<S> {
    /// Retag an allocated block as free and coalesce it.
    pub(crate) fn free_block(&mut self, block: Block) -> Block {
        let tag = self.header(block).with_allocated(false);
        self.set_header(block, tag);
        self.set_footer(block, tag);
        self.coalesce(block)
    }

    /// Merge `block` with its free neighbours and put the result on its free
    /// list. `block` must already be tagged free, header and footer, and
    /// must not be on any list. Returns the merged block.
    pub(crate) fn coalesce(&mut self, block: Block) -> Block {
        let tag = self.header(block);
        let next = self.next_block(block);
        let next_tag = self.header(next);
        let mut size = tag.size();

        let merged = match (tag.prev_allocated(), next_tag.is_allocated()) {
            (true, true) => {
                self.set_header(next, next_tag.with_prev_allocated(false));
                block
            }
            (true, false) => {
                self.remove_free(next);
                size += next_tag.size();
                let merged = Tag::pack(size, true, false);
                self.set_header(block, merged);
                self.set_footer(block, merged);
                block
            }
            (false, true) => {
                let prev = self.prev_block(block);
                let prev_tag = self.header(prev);
                self.remove_free(prev);
                self.set_header(next, next_tag.with_prev_allocated(false));
                size += prev_tag.size();
                let merged = Tag::pack(size, prev_tag.prev_allocated(), false);
                self.set_header(prev, merged);
                self.set_footer(prev, merged);
                prev
            }
            (false, false) => {
                let prev = self.prev_block(block);
                let prev_tag = self.header(prev);
                self.remove_free(prev);
                self.remove_free(next);
                size += prev_tag.size() + next_tag.size();
                let merged = Tag::pack(size, prev_tag.prev_allocated(), false);
                self.set_header(prev, merged);
                self.set_footer(prev, merged);
                prev
            }
        };
        self.insert_free(merged);
        merged
    }
}
