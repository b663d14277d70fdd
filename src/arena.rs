//! The arena: one contiguous, growable byte region addressed by offsets.
//!
//! All block metadata lives inside the region itself. Blocks are named by
//! the offset of their payload from the arena base; the header tag sits one
//! word before it. Offsets are 32-bit, which caps the arena at 4 GiB and
//! keeps free-list links at one word each.
//!
//! ```text
//!  0               prefix   +4         +8         +12        +16
//!  | bucket heads | pad    | prologue | prologue | epilogue | ...
//!  |  (u32 each)  |        |  header  |  footer  |  header  |
//! ```
//!
//! Growth overwrites the epilogue header with the header of a new free block
//! and writes a fresh epilogue at the new break.

use crate::error::AllocError;
use crate::platform::MemorySource;
use crate::tag::Tag;
use crate::{ALIGNMENT, DSIZE, WSIZE, align_up};
use core::fmt;
use core::num::NonZeroU32;
use core::ptr::NonNull;

/// Largest arena the 32-bit offsets can describe.
pub const MAX_ARENA_SIZE: usize = (u32::MAX as usize) & !(ALIGNMENT - 1);

/// A block, identified by its payload offset from the arena base.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Block(NonZeroU32);

impl Block {
    /// `None` for offset 0, which never names a block.
    #[inline]
    pub fn new(offset: usize) -> Option<Block> {
        let offset = u32::try_from(offset).ok()?;
        NonZeroU32::new(offset).map(Block)
    }

    #[inline]
    pub const fn offset(self) -> usize {
        self.0.get() as usize
    }

    #[inline]
    const fn header_offset(self) -> usize {
        self.offset() - WSIZE
    }

    /// Link encoding: 0 stands for "no block".
    #[inline]
    pub(crate) fn encode(link: Option<Block>) -> u32 {
        link.map_or(0, |b| b.0.get())
    }

    #[inline]
    pub(crate) fn decode(raw: u32) -> Option<Block> {
        NonZeroU32::new(raw).map(Block)
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block(+{:#x})", self.offset())
    }
}

/// The managed region and the heap structure written into it.
pub struct Arena<S: MemorySource> {
    source: S,
    base: NonNull<u8>,
    len: usize,
    chunk_size: usize,
    classes: usize,
    /// Whether this heap emits `log` records.
    pub(crate) logging: bool,
}

// The base pointer is only ever reached through `&mut self`.
unsafe impl<S: MemorySource + Send> Send for Arena<S> {}

impl<S: MemorySource> Arena<S> {
    /// An arena that has not yet asked `source` for memory.
    pub const fn new(source: S, chunk_size: usize, classes: usize) -> Self {
        Self {
            source,
            base: NonNull::dangling(),
            len: 0,
            chunk_size,
            classes,
            logging: true,
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.len != 0
    }

    /// Current arena size in bytes (base to break).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Start of the arena; dangling until initialised.
    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    #[inline]
    pub fn size_classes(&self) -> usize {
        self.classes
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// `false` for heaps behind a lock, where a logger that allocates would
    /// re-enter the allocator.
    #[inline]
    pub fn logs(&self) -> bool {
        self.logging
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Bytes reserved for the bucket head array.
    #[inline]
    pub fn prefix(&self) -> usize {
        align_up(self.classes * WSIZE)
    }

    #[inline]
    pub fn prologue(&self) -> Block {
        self.block_at(self.prefix() + DSIZE)
    }

    /// Where the first real block starts (the epilogue, when the heap is empty).
    #[inline]
    pub fn first_block(&self) -> Block {
        self.block_at(self.prefix() + 2 * DSIZE)
    }

    /// The epilogue always sits at the break.
    #[inline]
    pub fn epilogue(&self) -> Block {
        self.block_at(self.len)
    }

    #[inline]
    fn block_at(&self, offset: usize) -> Block {
        match Block::new(offset) {
            Some(block) => block,
            None => unreachable!("block offset {offset} outside the 32-bit arena"),
        }
    }

    // =========================================================================
    // Word access
    // =========================================================================

    #[inline]
    pub(crate) fn word(&self, offset: usize) -> u32 {
        assert!(
            offset % WSIZE == 0 && offset + WSIZE <= self.len,
            "arena read at {offset:#x} outside [0, {:#x})",
            self.len
        );
        unsafe { self.base.add(offset).cast::<u32>().read() }
    }

    #[inline]
    pub(crate) fn set_word(&mut self, offset: usize, value: u32) {
        assert!(
            offset % WSIZE == 0 && offset + WSIZE <= self.len,
            "arena write at {offset:#x} outside [0, {:#x})",
            self.len
        );
        unsafe { self.base.add(offset).cast::<u32>().write(value) }
    }

    #[inline]
    pub fn header(&self, block: Block) -> Tag {
        Tag::from_raw(self.word(block.header_offset()))
    }

    #[inline]
    pub(crate) fn set_header(&mut self, block: Block, tag: Tag) {
        self.set_word(block.header_offset(), tag.raw());
    }

    /// Footer of a free block, located through its header's size.
    #[inline]
    pub fn footer(&self, block: Block) -> Tag {
        let size = self.header(block).size();
        Tag::from_raw(self.word(block.offset() + size - DSIZE))
    }

    /// Write `tag` as the footer of a block of `tag.size()` bytes.
    #[inline]
    pub(crate) fn set_footer(&mut self, block: Block, tag: Tag) {
        self.set_word(block.offset() + tag.size() - DSIZE, tag.raw());
    }

    #[inline]
    pub fn next_block(&self, block: Block) -> Block {
        self.block_at(block.offset() + self.header(block).size())
    }

    /// The physical predecessor, read from its footer. Only meaningful when
    /// `block`'s header says the predecessor is free.
    #[inline]
    pub(crate) fn prev_block(&self, block: Block) -> Block {
        let prev_size = Tag::from_raw(self.word(block.offset() - DSIZE)).size();
        self.block_at(block.offset() - prev_size)
    }

    #[inline]
    pub(crate) fn payload(&self, block: Block) -> NonNull<u8> {
        unsafe { self.base.add(block.offset()) }
    }

    /// Map a payload pointer back to its block, if it points into the heap
    /// proper at a legal block alignment.
    pub(crate) fn block_from_ptr(&self, ptr: *const u8) -> Option<Block> {
        if !self.is_initialized() {
            return None;
        }
        let offset = (ptr as usize).checked_sub(self.base.as_ptr() as usize)?;
        Block::new(offset).filter(|&block| self.contains(block))
    }

    /// Whether `block` could name a block of the heap proper.
    #[inline]
    pub(crate) fn contains(&self, block: Block) -> bool {
        let offset = block.offset();
        offset >= self.first_block().offset() && offset < self.len && offset % ALIGNMENT == 0
    }

    /// Walk every block between the prologue and the epilogue.
    pub fn blocks(&self) -> Blocks<'_, S> {
        Blocks {
            arena: self,
            next: if self.is_initialized() {
                self.first_block().offset()
            } else {
                0
            },
        }
    }

    // =========================================================================
    // Initialisation and growth
    // =========================================================================

    /// Lay out bucket heads and sentinels, then grow by one chunk.
    pub fn init(&mut self) -> Result<(), AllocError> {
        if self.is_initialized() {
            return Ok(());
        }
        let reserve = self.prefix() + 2 * DSIZE;
        let base = self
            .source
            .sbrk(reserve)
            .ok_or(AllocError::OutOfMemory { requested: reserve })?;
        let addr = base.as_ptr() as usize;
        if addr % ALIGNMENT != 0 {
            return Err(AllocError::Misaligned { addr });
        }
        self.base = base;
        self.len = reserve;

        for cls in 0..self.classes {
            self.set_word(cls * WSIZE, 0);
        }
        let prefix = self.prefix();
        let prologue = Tag::pack(DSIZE, true, true);
        self.set_word(prefix, 0);
        self.set_word(prefix + WSIZE, prologue.raw());
        self.set_word(prefix + 2 * WSIZE, prologue.raw());
        self.set_word(prefix + 3 * WSIZE, Tag::pack(0, true, true).raw());
        heap_log!(self, debug!(
            "arena initialised at {:p}: {} size classes, {} byte prefix",
            self.base,
            self.classes,
            prefix
        ));

        self.grow(self.chunk_size)?;
        Ok(())
    }

    /// Grow by at least `min_bytes` (never less than one chunk) and return
    /// the resulting free block, already coalesced and on its free list.
    pub(crate) fn grow(&mut self, min_bytes: usize) -> Result<Block, AllocError> {
        let block = self.extend(min_bytes.max(self.chunk_size))?;
        heap_log!(self, debug!(
            "arena grew to {} bytes, new block {:?} ({} bytes)",
            self.len,
            block,
            self.header(block).size()
        ));
        Ok(self.coalesce(block))
    }

    /// Take `bytes` (rounded to whole double words) from the source and
    /// format them as one free block in place of the old epilogue.
    fn extend(&mut self, bytes: usize) -> Result<Block, AllocError> {
        let size = bytes
            .checked_add(ALIGNMENT - 1)
            .map(|n| n & !(ALIGNMENT - 1))
            .ok_or(AllocError::ArenaLimit {
                requested: usize::MAX,
                limit: MAX_ARENA_SIZE,
            })?;
        let new_len = self.len.saturating_add(size);
        if new_len > MAX_ARENA_SIZE {
            return Err(AllocError::ArenaLimit {
                requested: new_len,
                limit: MAX_ARENA_SIZE,
            });
        }

        let region = self
            .source
            .sbrk(size)
            .ok_or(AllocError::OutOfMemory { requested: size })?;
        let expected = self.base.as_ptr() as usize + self.len;
        let found = region.as_ptr() as usize;
        if found != expected {
            return Err(AllocError::Discontiguous { expected, found });
        }

        let block = self.epilogue();
        self.len = new_len;
        let prev_allocated = self.header(block).prev_allocated();
        let tag = Tag::pack(size, prev_allocated, false);
        self.set_header(block, tag);
        self.set_footer(block, tag);
        let epilogue = self.epilogue();
        self.set_header(epilogue, Tag::pack(0, false, true));
        Ok(block)
    }
}

/// Iterator over `(block, header)` pairs in address order.
pub struct Blocks<'a, S: MemorySource> {
    arena: &'a Arena<S>,
    next: usize,
}

impl<S: MemorySource> Iterator for Blocks<'_, S> {
    type Item = (Block, Tag);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == 0 || self.next >= self.arena.len {
            return None;
        }
        let block = Block::new(self.next)?;
        let tag = self.arena.header(block);
        if tag.size() == 0 {
            return None;
        }
        self.next += tag.size();
        Some((block, tag))
    }
}
