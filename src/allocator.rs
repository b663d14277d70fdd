//! Top-level allocator: the public allocate/release/resize API over one
//! arena, and a locked wrapper implementing `GlobalAlloc`.
//!
//! `SegAlloc` is single-threaded and takes `&mut self`. `LockedSegAlloc`
//! serialises every call through a spin lock so it can sit in a `static`.

use crate::arena::{Arena, Block, MAX_ARENA_SIZE};
use crate::checker::{CheckReport, Violation};
use crate::config::AllocConfig;
use crate::error::AllocError;
use crate::platform::MemorySource;
use crate::{ALIGNMENT, DSIZE, MIN_BLOCK_SIZE, WSIZE, align_up};
use core::alloc::{GlobalAlloc, Layout};
use core::mem::size_of;
use core::num::NonZeroUsize;
use core::panic::Location;
use core::ptr::{self, NonNull};

// =============================================================================
// The allocator
// =============================================================================

/// Segregated-free-list allocator over memory from `S`.
///
/// The arena is laid out lazily on the first allocation, or eagerly with
/// [`init`](Self::init).
pub struct SegAlloc<S: MemorySource> {
    arena: Arena<S>,
    config: AllocConfig,
}

/// Snapshot of the heap taken by walking every block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes obtained from the memory source so far.
    pub arena_bytes: usize,
    pub allocated_blocks: usize,
    /// Block bytes (tags included) held by live allocations.
    pub allocated_bytes: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
    pub largest_free: usize,
}

impl<S: MemorySource> SegAlloc<S> {
    pub const fn new(source: S, config: AllocConfig) -> Self {
        Self {
            arena: Arena::new(source, config.chunk_size, config.size_classes),
            config,
        }
    }

    /// Switch off this heap's `log` output. Required whenever the heap
    /// serves the process's own allocations: a logger that formats into a
    /// `String` would otherwise call back into it mid-operation.
    pub const fn without_logging(mut self) -> Self {
        self.arena.logging = false;
        self
    }

    #[inline]
    pub fn logs(&self) -> bool {
        self.arena.logs()
    }

    pub fn config(&self) -> &AllocConfig {
        &self.config
    }

    /// Read-only view of the arena, for inspection and debugging.
    pub fn arena(&self) -> &Arena<S> {
        &self.arena
    }

    /// Validate the configuration and lay out the arena. Idempotent.
    pub fn init(&mut self) -> Result<(), AllocError> {
        self.config.validate()?;
        self.arena.init()
    }

    /// Block size for a request of `size` bytes: room for the header,
    /// rounded to double words, never below the minimum block.
    fn adjust(&self, size: NonZeroUsize) -> Result<usize, AllocError> {
        let mut size = size.get();
        if let Some(policy) = self.config.rounding {
            size = policy.apply(size);
        }
        if size > MAX_ARENA_SIZE - DSIZE {
            return Err(AllocError::ArenaLimit {
                requested: size,
                limit: MAX_ARENA_SIZE,
            });
        }
        Ok(align_up(size + WSIZE).max(MIN_BLOCK_SIZE))
    }

    /// Allocate at least `size` bytes, 8-byte aligned.
    pub fn try_allocate(&mut self, size: NonZeroUsize) -> Result<NonNull<u8>, AllocError> {
        if !self.arena.is_initialized() {
            self.init()?;
        }
        let asize = self.adjust(size)?;
        let block = match self.arena.find_fit(asize) {
            Some(block) => block,
            None => self.arena.grow(asize)?,
        };
        self.arena.place(block, asize);

        let ptr = self.arena.payload(block);
        heap_log!(self, trace!("allocate({size}) -> {ptr:p} [{asize} byte block]"));
        self.debug_check();
        Ok(ptr)
    }

    /// Allocate at least `size` bytes, 8-byte aligned. Null when `size` is
    /// zero or the request cannot be satisfied.
    pub fn allocate(&mut self, size: usize) -> *mut u8 {
        let Some(size) = NonZeroUsize::new(size) else {
            return ptr::null_mut();
        };
        match self.try_allocate(size) {
            Ok(ptr) => ptr.as_ptr(),
            Err(err) => {
                heap_log!(self, warn!("allocate({size}) failed: {err}"));
                ptr::null_mut()
            }
        }
    }

    /// Return a block to the heap. Null is a no-op; pointers that do not
    /// name a block of this arena are logged and ignored.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live result of this allocator's `allocate`,
    /// `resize` or `zero_allocate` that has not been released since.
    pub unsafe fn release(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let Some(block) = self.block_of(ptr) else {
            return;
        };
        let merged = self.arena.free_block(block);
        heap_log!(self, trace!("release({ptr:p}) -> free block {merged:?}"));
        self.debug_check();
    }

    /// Move an allocation into a block of at least `size` bytes, preserving
    /// the first `min(old payload, size)` bytes.
    ///
    /// Null `ptr` behaves as [`allocate`](Self::allocate); zero `size` as
    /// [`release`](Self::release), returning null. On failure null is
    /// returned and the old allocation is left untouched.
    ///
    /// # Safety
    ///
    /// Same contract as [`release`](Self::release) for `ptr`.
    pub unsafe fn resize(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        if size == 0 {
            unsafe { self.release(ptr) };
            return ptr::null_mut();
        }
        if ptr.is_null() {
            return self.allocate(size);
        }
        let Some(block) = self.block_of(ptr) else {
            return ptr::null_mut();
        };
        let old_payload = self.arena.header(block).size() - WSIZE;

        let new = self.allocate(size);
        if new.is_null() {
            return new;
        }
        unsafe {
            ptr::copy_nonoverlapping(ptr, new, old_payload.min(size));
            self.release(ptr);
        }
        new
    }

    /// Allocate `count * size` zeroed bytes. Null on overflow, on a zero
    /// product, or when memory runs out.
    pub fn zero_allocate(&mut self, count: usize, size: usize) -> *mut u8 {
        let Some(bytes) = count.checked_mul(size) else {
            heap_log!(self, warn!("zero_allocate({count}, {size}): size overflows"));
            return ptr::null_mut();
        };
        let ptr = self.allocate(bytes);
        if !ptr.is_null() {
            unsafe { ptr::write_bytes(ptr, 0, bytes) };
        }
        ptr
    }

    /// Payload bytes usable through `ptr`; 0 for null or foreign pointers.
    pub fn usable_size(&self, ptr: *const u8) -> usize {
        if ptr.is_null() {
            return 0;
        }
        self.block_of(ptr)
            .map_or(0, |block| self.arena.header(block).size() - WSIZE)
    }

    /// The block `ptr` is the payload of, if it names one in this arena.
    pub fn block_of(&self, ptr: *const u8) -> Option<Block> {
        let block = self.arena.block_from_ptr(ptr);
        if block.is_none() {
            heap_log!(self, warn!("{ptr:p} is not a block of this heap, ignored"));
        }
        block
    }

    // =========================================================================
    // Over-aligned requests
    // =========================================================================

    /// Allocate `size` bytes aligned to `align` (a power of two).
    ///
    /// Alignments above 8 over-allocate and stash the underlying pointer in
    /// the word just before the returned one; free such blocks with
    /// [`release_aligned`](Self::release_aligned).
    pub fn allocate_aligned(&mut self, size: usize, align: usize) -> *mut u8 {
        debug_assert!(align.is_power_of_two());
        if align <= ALIGNMENT {
            return self.allocate(size);
        }
        if size == 0 {
            return ptr::null_mut();
        }
        let Some(padded) = size.checked_add(align) else {
            return ptr::null_mut();
        };
        let raw = self.allocate(padded);
        if raw.is_null() {
            return raw;
        }
        let addr = raw as usize;
        let aligned = (addr + size_of::<*mut u8>() + align - 1) & !(align - 1);
        unsafe {
            let ptr = raw.add(aligned - addr);
            ptr.cast::<*mut u8>().sub(1).write(raw);
            ptr
        }
    }

    /// # Safety
    ///
    /// `ptr` must be null or a live result of
    /// [`allocate_aligned`](Self::allocate_aligned) with the same `align`.
    pub unsafe fn release_aligned(&mut self, ptr: *mut u8, align: usize) {
        if ptr.is_null() || align <= ALIGNMENT {
            return unsafe { self.release(ptr) };
        }
        let raw = unsafe { ptr.cast::<*mut u8>().sub(1).read() };
        unsafe { self.release(raw) }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            arena_bytes: self.arena.len(),
            ..HeapStats::default()
        };
        for (_, tag) in self.arena.blocks() {
            if tag.is_allocated() {
                stats.allocated_blocks += 1;
                stats.allocated_bytes += tag.size();
            } else {
                stats.free_blocks += 1;
                stats.free_bytes += tag.size();
                stats.largest_free = stats.largest_free.max(tag.size());
            }
        }
        stats
    }

    /// Run the consistency checker, passing each violation to `on_violation`.
    pub fn check_heap_with(&self, on_violation: impl FnMut(Violation)) -> CheckReport {
        self.arena.check(on_violation)
    }

    /// Run the consistency checker and log every violation, tagged with the
    /// caller's location. Only the report is produced when logging is off.
    #[track_caller]
    pub fn check_heap(&self) -> CheckReport {
        let caller = Location::caller();
        let report = self.check_heap_with(|violation| {
            heap_log!(self, error!("heap check at {caller}: {violation}"));
        });
        if !report.is_ok() {
            heap_log!(self, error!(
                "heap check at {caller}: {} violation(s) over {} blocks",
                report.violations,
                report.blocks
            ));
        }
        report
    }

    #[inline]
    #[track_caller]
    fn debug_check(&self) {
        #[cfg(feature = "debug")]
        let _ = self.check_heap();
    }
}

// =============================================================================
// Global allocator wrapper
// =============================================================================

/// [`SegAlloc`] behind a spin lock, usable as `#[global_allocator]`.
///
/// The wrapped heap never logs: with the lock held, a logger that allocates
/// would spin on it forever.
pub struct LockedSegAlloc<S: MemorySource>(spin::Mutex<SegAlloc<S>>);

impl<S: MemorySource> LockedSegAlloc<S> {
    pub const fn new(heap: SegAlloc<S>) -> Self {
        Self(spin::Mutex::new(heap.without_logging()))
    }

    pub fn lock(&self) -> spin::MutexGuard<'_, SegAlloc<S>> {
        self.0.lock()
    }
}

unsafe impl<S: MemorySource + Send> GlobalAlloc for LockedSegAlloc<S> {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.0.lock().allocate_aligned(layout.size(), layout.align())
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { self.0.lock().release_aligned(ptr, layout.align()) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let mut heap = self.0.lock();
        if layout.align() <= ALIGNMENT {
            return heap.zero_allocate(1, layout.size());
        }
        let ptr = heap.allocate_aligned(layout.size(), layout.align());
        if !ptr.is_null() {
            unsafe { ptr::write_bytes(ptr, 0, layout.size()) };
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let mut heap = self.0.lock();
        if layout.align() <= ALIGNMENT {
            return unsafe { heap.resize(ptr, new_size) };
        }

        // Over-aligned: the stashed pointer rules out resizing in place.
        let new_ptr = heap.allocate_aligned(new_size, layout.align());
        if !new_ptr.is_null() {
            unsafe {
                ptr::copy_nonoverlapping(ptr, new_ptr, layout.size().min(new_size));
                heap.release_aligned(ptr, layout.align());
            }
        }
        new_ptr
    }
}
