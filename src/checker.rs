//! Heap consistency checker.
//!
//! A debugging aid, never run on the allocation path (unless the `debug`
//! feature asks for it). Two passes:
//!
//! - arena walk: sentinels, alignment, minimum size, free-block tags,
//!   eager coalescing, `prev_allocated` bits, epilogue at the break;
//! - bucket walk: nodes inside the arena, back links, node state, bucket
//!   choice, and free counts agreeing with the arena walk.
//!
//! Violations are reported, not fatal. Both walks are bounded so corrupted
//! sizes or links cannot make them loop.

use crate::arena::{Arena, Block};
use crate::platform::MemorySource;
use crate::tag::Tag;
use crate::{ALIGNMENT, DSIZE, MIN_BLOCK_SIZE, WSIZE};
use core::fmt;

/// One broken heap invariant. Offsets are relative to the arena base.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Violation {
    /// Prologue header/footer are not an allocated 8-byte block.
    Prologue { header: u32, footer: u32 },
    /// The walk stopped on a zero-size tag that is not a proper epilogue
    /// at the break.
    Epilogue { offset: usize, header: u32 },
    Misaligned { offset: usize },
    Undersized { offset: usize, size: usize },
    /// A block extends past the break.
    Overrun { offset: usize, size: usize, arena_len: usize },
    /// Free block whose footer differs from its header.
    TagMismatch { offset: usize, header: u32, footer: u32 },
    /// Free block directly after another free block.
    AdjacentFree { offset: usize },
    /// `prev_allocated` bit disagrees with the predecessor.
    PrevAllocMismatch { offset: usize, expected: bool },
    /// A list link points outside the heap.
    LinkOutOfArena { class: usize, offset: usize },
    /// A node's `prev` link does not name the node before it.
    BrokenLink { class: usize, offset: usize },
    /// An allocated block is on a free list.
    ListedAllocated { class: usize, offset: usize },
    WrongBucket {
        offset: usize,
        size: usize,
        class: usize,
        expected: usize,
    },
    /// A list is longer than the arena could hold.
    ListCycle { class: usize },
    CountMismatch { in_heap: usize, in_lists: usize },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Prologue { header, footer } => {
                write!(f, "prologue damaged: header {header:#x}, footer {footer:#x}")
            }
            Self::Epilogue { offset, header } => {
                write!(f, "bad epilogue at +{offset:#x}: header {header:#x}")
            }
            Self::Misaligned { offset } => write!(f, "block +{offset:#x} is misaligned"),
            Self::Undersized { offset, size } => {
                write!(f, "block +{offset:#x} has size {size}, below the minimum")
            }
            Self::Overrun {
                offset,
                size,
                arena_len,
            } => write!(
                f,
                "block +{offset:#x} of {size} bytes runs past the break at +{arena_len:#x}"
            ),
            Self::TagMismatch {
                offset,
                header,
                footer,
            } => write!(
                f,
                "free block +{offset:#x}: header {header:#x} != footer {footer:#x}"
            ),
            Self::AdjacentFree { offset } => {
                write!(f, "free block +{offset:#x} follows another free block")
            }
            Self::PrevAllocMismatch { offset, expected } => write!(
                f,
                "block +{offset:#x}: prev_allocated should be {expected}"
            ),
            Self::LinkOutOfArena { class, offset } => {
                write!(f, "list {class}: link +{offset:#x} outside the heap")
            }
            Self::BrokenLink { class, offset } => {
                write!(f, "list {class}: node +{offset:#x} has an inconsistent prev link")
            }
            Self::ListedAllocated { class, offset } => {
                write!(f, "list {class}: node +{offset:#x} is allocated")
            }
            Self::WrongBucket {
                offset,
                size,
                class,
                expected,
            } => write!(
                f,
                "node +{offset:#x} (size {size}) in list {class}, belongs in {expected}"
            ),
            Self::ListCycle { class } => write!(f, "list {class} does not terminate"),
            Self::CountMismatch { in_heap, in_lists } => write!(
                f,
                "{in_heap} free blocks in the heap but {in_lists} on the lists"
            ),
        }
    }
}

/// Summary of one checker run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub violations: usize,
    /// Blocks between the sentinels.
    pub blocks: usize,
    pub free_in_heap: usize,
    pub free_in_lists: usize,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.violations == 0
    }
}

impl<S: MemorySource> Arena<S> {
    /// Run both passes, handing every violation to `on_violation`.
    pub fn check(&self, mut on_violation: impl FnMut(Violation)) -> CheckReport {
        let mut report = CheckReport::default();
        if !self.is_initialized() {
            return report;
        }
        let mut emit = |violation: Violation| {
            report.violations += 1;
            on_violation(violation);
        };
        let (blocks, free_in_heap) = self.walk_heap(&mut emit);
        let free_in_lists = self.walk_lists(&mut emit);
        if free_in_heap != free_in_lists {
            emit(Violation::CountMismatch {
                in_heap: free_in_heap,
                in_lists: free_in_lists,
            });
        }
        report.blocks = blocks;
        report.free_in_heap = free_in_heap;
        report.free_in_lists = free_in_lists;
        report
    }

    /// Returns `(blocks, free blocks)` seen between the sentinels.
    fn walk_heap(&self, emit: &mut impl FnMut(Violation)) -> (usize, usize) {
        let prologue = self.prologue().offset();
        let header = self.word(prologue - WSIZE);
        let footer = self.word(prologue);
        let tag = Tag::from_raw(header);
        if header != footer || tag.size() != DSIZE || !tag.is_allocated() {
            emit(Violation::Prologue { header, footer });
        }

        let base = self.base() as usize;
        let mut blocks = 0;
        let mut free = 0;
        let mut prev_allocated = true;
        let mut offset = self.first_block().offset();
        while let Some(block) = Block::new(offset) {
            let tag = self.header(block);
            if tag.size() == 0 {
                if offset != self.len() || !tag.is_allocated() {
                    emit(Violation::Epilogue {
                        offset,
                        header: tag.raw(),
                    });
                }
                if tag.prev_allocated() != prev_allocated {
                    emit(Violation::PrevAllocMismatch {
                        offset,
                        expected: prev_allocated,
                    });
                }
                break;
            }

            blocks += 1;
            let size = tag.size();
            if (base + offset) % ALIGNMENT != 0 {
                emit(Violation::Misaligned { offset });
            }
            if size < MIN_BLOCK_SIZE {
                emit(Violation::Undersized { offset, size });
            }
            if tag.prev_allocated() != prev_allocated {
                emit(Violation::PrevAllocMismatch {
                    offset,
                    expected: prev_allocated,
                });
            }
            if offset + size > self.len() {
                emit(Violation::Overrun {
                    offset,
                    size,
                    arena_len: self.len(),
                });
                break;
            }
            if !tag.is_allocated() {
                free += 1;
                let footer = self.footer(block);
                if footer != tag {
                    emit(Violation::TagMismatch {
                        offset,
                        header: tag.raw(),
                        footer: footer.raw(),
                    });
                }
                if !prev_allocated {
                    emit(Violation::AdjacentFree { offset });
                }
            }
            prev_allocated = tag.is_allocated();
            offset += size;
        }
        (blocks, free)
    }

    /// Returns the number of nodes reached on all lists.
    fn walk_lists(&self, emit: &mut impl FnMut(Violation)) -> usize {
        let max_nodes = self.len() / MIN_BLOCK_SIZE;
        let mut listed = 0;
        for class in 0..self.size_classes() {
            let mut prev = None;
            let mut cursor = self.bucket_head(class);
            let mut steps = 0;
            while let Some(block) = cursor {
                if steps == max_nodes {
                    emit(Violation::ListCycle { class });
                    break;
                }
                steps += 1;
                if !self.contains(block) {
                    emit(Violation::LinkOutOfArena {
                        class,
                        offset: block.offset(),
                    });
                    break;
                }
                listed += 1;

                let offset = block.offset();
                if self.link_prev(block) != prev {
                    emit(Violation::BrokenLink { class, offset });
                }
                let tag = self.header(block);
                if tag.is_allocated() {
                    emit(Violation::ListedAllocated { class, offset });
                }
                let expected = self.class_of(tag.size());
                if expected != class {
                    emit(Violation::WrongBucket {
                        offset,
                        size: tag.size(),
                        class,
                        expected,
                    });
                }
                prev = Some(block);
                cursor = self.link_next(block);
            }
        }
        listed
    }
}
